//! Single shared-password gate.
//!
//! The password is configured as a bcrypt hash (any of the `$2a$`, `$2b$`,
//! `$2x$` or `$2y$` variants), for instance one printed by
//! `taskwiki hash-password`. A successful login yields an HS256 token that
//! carries no identity beyond a constant marker.

use bcrypt::HashParts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the cookie carrying the session token.
pub const AUTH_COOKIE: &str = "auth";

pub use bcrypt::DEFAULT_COST;

const SUBJECT: &str = "single";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    u: String,
    iat: i64,
    exp: i64,
}

/// bcrypt hash of `password` at `cost`, the format expected in
/// `PASSWORD_HASH`.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub struct Auth {
    password_hash: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Auth {
    /// `password_hash` is a bcrypt hash; `secret` signs the session tokens,
    /// which stay valid for `ttl`.
    pub fn new(password_hash: &str, secret: &[u8], ttl: Duration) -> Result<Self> {
        let password_hash = password_hash.trim();
        password_hash
            .parse::<HashParts>()
            .map_err(|e| Error::Config(format!("password hash is not a bcrypt hash: {e}")))?;
        if secret.is_empty() {
            return Err(Error::Config("token secret must not be empty".into()));
        }
        Ok(Self {
            password_hash: password_hash.to_string(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check `password` against the configured hash. This runs the full
    /// bcrypt work factor, so call it off the async executor.
    pub fn check_password(&self, password: &str) -> bool {
        match bcrypt::verify(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                log::error!("password verification failed: {e}");
                false
            }
        }
    }

    /// Issue a fresh session token.
    pub fn issue_token(&self) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            u: SUBJECT.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Whether `token` is correctly signed, unexpired, and carries the
    /// session marker.
    pub fn verify_token(&self, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims.u == SUBJECT,
            Err(e) => {
                log::debug!("rejected session token: {e}");
                false
            }
        }
    }
}
