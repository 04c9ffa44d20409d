//! HTTP wiring: shared state, routes, middleware, static client files.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rusqlite::Connection;
use serde_json::{json, Value};
use tower_http::services::{ServeDir, ServeFile};

use crate::api;
use crate::auth::{Auth, AUTH_COOKIE};
use crate::db::Db;
use crate::error::{Error, Result};

/// State shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub auth: Arc<Auth>,
    pub secure_cookie: bool,
}

impl AppState {
    pub fn new(db: Db, auth: Auth, secure_cookie: bool) -> Self {
        Self {
            db: Arc::new(db),
            auth: Arc::new(auth),
            secure_cookie,
        }
    }

    /// Run a store operation on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock();
            f(&mut *conn)
        })
        .await?
    }

    pub fn is_authenticated(&self, jar: &CookieJar) -> bool {
        jar.get(AUTH_COOKIE)
            .is_some_and(|cookie| self.auth.verify_token(cookie.value()))
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((AUTH_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .path("/")
            .max_age(time::Duration::seconds(self.auth.ttl().num_seconds()))
            .build()
    }
}

/// Build the application router. When `web_dir` is given, non-API paths
/// serve the client build; paths with no file behind them get `index.html`
/// with a 200 so client-side routes load.
pub fn router(state: AppState, web_dir: Option<&Path>) -> Router {
    let protected = Router::new()
        .route("/api/tasks", get(api::list_tasks).post(api::create_task))
        .route("/api/tasks/outline", get(api::task_outline))
        .route(
            "/api/tasks/{id}",
            patch(api::update_task).delete(api::delete_task),
        )
        .route("/api/tasks/{id}/gantt", get(api::task_gantt))
        .route("/api/tasks/{id}/section", get(api::task_section))
        .route("/api/calendar", get(api::calendar))
        .route("/api/wiki", get(api::list_wiki).post(api::create_wiki))
        .route("/api/wiki/preview", post(api::preview_wiki))
        .route(
            "/api/wiki/{id}",
            get(api::get_wiki)
                .patch(api::update_wiki)
                .delete(api::delete_wiki),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .route("/api/login", post(api::login))
        .route("/api/logout", post(api::logout))
        .route("/api/me", get(api::me))
        .route("/health", get(health))
        .merge(protected);

    if let Some(dir) = web_dir {
        let index = ServeFile::new(dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(dir).fallback(index));
    }

    app.with_state(state)
        .layer(middleware::from_fn(log_requests))
}

async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response> {
    if !state.is_authenticated(&jar) {
        return Err(Error::Unauthorized);
    }
    Ok(next.run(req).await)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();
    let response = next.run(req).await;
    log::info!(
        "{method} {path} -> {} ({} ms)",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind `addr` and serve `app` until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}
