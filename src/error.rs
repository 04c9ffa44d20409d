use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by store operations and HTTP handlers.
///
/// Each variant maps to a status code and a symbolic `{"error": code}` body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field was missing, blank, or malformed.
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidPassword => StatusCode::UNAUTHORIZED,
            Self::Config(_) | Self::Db(_) | Self::Token(_) | Self::Hash(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Symbolic code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid(code) => code,
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidPassword => "invalid_password",
            Self::Config(_) | Self::Db(_) | Self::Token(_) | Self::Hash(_) | Self::Join(_) => {
                "internal"
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        log::debug!("rejected request body: {rejection}");
        Self::Invalid("bad_request")
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        log::debug!("rejected path: {rejection}");
        Self::Invalid("bad_request")
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        log::debug!("rejected query: {rejection}");
        Self::Invalid("bad_request")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        }
        (status, Json(json!({ "error": self.code() }))).into_response()
    }
}
