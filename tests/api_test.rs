use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

use taskwiki::auth::{hash_password, Auth};
use taskwiki::db::Db;
use taskwiki::server::{self, AppState};

const PASSWORD: &str = "correct horse";

fn test_auth(ttl: Duration) -> Auth {
    let hash = hash_password(PASSWORD, 4).unwrap();
    Auth::new(&hash, b"test-secret", ttl).unwrap()
}

fn app() -> Router {
    server::router(AppState::new(Db::memory().unwrap(), test_auth(Duration::days(30)), false), None)
}

struct Reply {
    status: StatusCode,
    body: Value,
    set_cookie: Option<String>,
}

async fn send(app: &Router, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Reply {
        status,
        body,
        set_cookie,
    }
}

/// Log in and return the `auth=<token>` pair for the Cookie header.
async fn login(app: &Router) -> String {
    let reply = send(app, "POST", "/api/login", None, Some(json!({ "password": PASSWORD }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "ok": true }));
    let set_cookie = reply.set_cookie.expect("login sets a cookie");
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn protected_routes_require_login() {
    let app = app();
    for (method, uri) in [
        ("GET", "/api/tasks"),
        ("DELETE", "/api/tasks/1"),
        ("GET", "/api/wiki"),
        ("GET", "/api/wiki/1"),
        ("GET", "/api/calendar"),
    ] {
        let reply = send(&app, method, uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(reply.body, json!({ "error": "unauthorized" }));
    }

    let cookie = login(&app).await;
    let reply = send(&app, "GET", "/api/tasks", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "tree": [] }));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = app();
    let reply = send(&app, "POST", "/api/login", None, Some(json!({ "password": "nope" }))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, json!({ "error": "invalid_password" }));
    assert!(reply.set_cookie.is_none());

    let reply = send(&app, "POST", "/api/login", None, Some(json!({ "password": 5 }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "error": "bad_request" }));
}

#[tokio::test]
async fn tampered_cookie_is_rejected() {
    let app = app();
    let cookie = login(&app).await;
    let forged = format!("{cookie}x");
    let reply = send(&app, "GET", "/api/tasks", Some(&forged), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_and_logout() {
    let app = app();
    let reply = send(&app, "GET", "/api/me", None, None).await;
    assert_eq!(reply.body, json!({ "authenticated": false }));

    let cookie = login(&app).await;
    let reply = send(&app, "GET", "/api/me", Some(&cookie), None).await;
    assert_eq!(reply.body, json!({ "authenticated": true }));

    let reply = send(&app, "POST", "/api/logout", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cleared = reply.set_cookie.expect("logout clears the cookie");
    assert!(cleared.starts_with("auth=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn task_lifecycle() {
    let app = app();
    let cookie = login(&app).await;
    let c = Some(cookie.as_str());

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "  " }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "error": "title_required" }));

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({}))).await;
    assert_eq!(reply.body, json!({ "error": "title_required" }));

    let reply = send(
        &app,
        "POST",
        "/api/tasks",
        c,
        Some(json!({ "title": "Release", "parent_id": null, "assignee": "ann", "deadline": "2026-10-30" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let root = reply.body["id"].as_i64().unwrap();

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Notes", "parent_id": root }))).await;
    let child = reply.body["id"].as_i64().unwrap();
    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Draft", "parent_id": child }))).await;
    let grandchild = reply.body["id"].as_i64().unwrap();
    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Other" }))).await;
    let other = reply.body["id"].as_i64().unwrap();

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "x", "parent_id": 9999 }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "error": "parent_not_found" }));

    let reply = send(&app, "GET", "/api/tasks", c, None).await;
    let tree = reply.body["tree"].as_array().unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0]["id"], root);
    assert_eq!(tree[0]["assignee"], "ann");
    assert_eq!(tree[0]["done"], false);
    assert_eq!(tree[0]["children"][0]["id"], child);
    assert_eq!(tree[0]["children"][0]["children"][0]["id"], grandchild);

    // Completing the first root moves it after the open one.
    let reply = send(&app, "PATCH", &format!("/api/tasks/{root}"), c, Some(json!({ "done": true }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, "GET", "/api/tasks", c, None).await;
    let tree = reply.body["tree"].as_array().unwrap();
    assert_eq!(tree[0]["id"], other);
    assert_eq!(tree[1]["id"], root);
    assert_eq!(tree[1]["done"], true);
    assert_eq!(tree[1]["title"], "Release");
    assert_eq!(tree[1]["assignee"], "ann");

    let reply = send(
        &app,
        "PATCH",
        &format!("/api/tasks/{root}"),
        c,
        Some(json!({ "assignee": null, "description": "ship it" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, "GET", "/api/tasks", c, None).await;
    assert_eq!(reply.body["tree"][1]["assignee"], Value::Null);
    assert_eq!(reply.body["tree"][1]["description"], "ship it");
    assert_eq!(reply.body["tree"][1]["deadline"], "2026-10-30");

    let reply = send(&app, "PATCH", &format!("/api/tasks/{root}"), c, Some(json!({ "title": "" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, "PATCH", "/api/tasks/9999", c, Some(json!({ "done": true }))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, json!({ "error": "not_found" }));

    let reply = send(&app, "DELETE", &format!("/api/tasks/{child}"), c, None).await;
    assert_eq!(reply.body, json!({ "ok": true, "deleted": 2 }));

    let reply = send(&app, "DELETE", "/api/tasks/9999", c, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "ok": true, "deleted": 0 }));

    let reply = send(&app, "GET", "/api/tasks", c, None).await;
    let tree = reply.body["tree"].as_array().unwrap();
    assert_eq!(tree.len(), 2);
    assert!(tree[1]["children"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = app();
    let cookie = login(&app).await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wiki_round_trip() {
    let app = app();
    let cookie = login(&app).await;
    let c = Some(cookie.as_str());

    let reply = send(&app, "POST", "/api/wiki", c, Some(json!({ "title": "" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "error": "title_required" }));

    let content = "# Plan\n\n- one\n- two";
    let reply = send(&app, "POST", "/api/wiki", c, Some(json!({ "title": "Plan", "content": content }))).await;
    let id = reply.body["id"].as_i64().unwrap();

    let reply = send(&app, "GET", &format!("/api/wiki/{id}"), c, None).await;
    assert_eq!(reply.body["page"]["title"], "Plan");
    assert_eq!(reply.body["page"]["content"], content);

    let reply = send(&app, "PATCH", &format!("/api/wiki/{id}"), c, Some(json!({ "content": "new" }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, "GET", &format!("/api/wiki/{id}"), c, None).await;
    assert_eq!(reply.body["page"]["title"], "Plan");
    assert_eq!(reply.body["page"]["content"], "new");

    let reply = send(&app, "PATCH", &format!("/api/wiki/{id}"), c, Some(json!({ "title": " " }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, "GET", "/api/wiki", c, None).await;
    let pages = reply.body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["title"], "Plan");
    assert!(pages[0].get("content").is_none());

    let reply = send(&app, "DELETE", &format!("/api/wiki/{id}"), c, None).await;
    assert_eq!(reply.body, json!({ "ok": true }));
    let reply = send(&app, "DELETE", &format!("/api/wiki/{id}"), c, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let reply = send(&app, "GET", &format!("/api/wiki/{id}"), c, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wiki_preview_renders_markdown() {
    let app = app();
    let cookie = login(&app).await;
    let reply = send(
        &app,
        "POST",
        "/api/wiki/preview",
        Some(&cookie),
        Some(json!({ "content": "## Hi <b>" })),
    )
    .await;
    assert_eq!(reply.body, json!({ "html": "<h2>Hi &lt;b&gt;</h2>" }));
}

#[tokio::test]
async fn calendar_outline_and_gantt() {
    let app = app();
    let cookie = login(&app).await;
    let c = Some(cookie.as_str());

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Launch", "deadline": "2026-10-21" }))).await;
    let root = reply.body["id"].as_i64().unwrap();
    send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Prep", "parent_id": root }))).await;

    let reply = send(&app, "GET", "/api/calendar?view=week&date=2026-10-19", c, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["view"], "week");
    let cells = reply.body["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 7);
    assert_eq!(cells[0]["date"], "2026-10-19");
    assert_eq!(cells[2]["events"][0]["title"], "Launch");

    let reply = send(&app, "GET", "/api/calendar?date=yesterday", c, None).await;
    assert_eq!(reply.body, json!({ "error": "invalid_date" }));
    let reply = send(&app, "GET", "/api/calendar?view=decade", c, None).await;
    assert_eq!(reply.body, json!({ "error": "invalid_view" }));
    for view in ["month", "week", "day"] {
        let uri = format!("/api/calendar?view={view}&date=%2B262142-12-31");
        let reply = send(&app, "GET", &uri, c, None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{view}");
        assert_eq!(reply.body, json!({ "error": "invalid_date" }));
    }

    let reply = send(&app, "GET", &format!("/api/tasks/outline?collapsed={root}"), c, None).await;
    let rows = reply.body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["expanded"], false);
    let reply = send(&app, "GET", "/api/tasks/outline", c, None).await;
    assert_eq!(reply.body["rows"].as_array().unwrap().len(), 2);

    let reply = send(&app, "GET", &format!("/api/tasks/{root}/gantt"), c, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["rows"].as_array().unwrap().len(), 2);
    let reply = send(&app, "GET", "/api/tasks/9999/gantt", c, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_public() {
    let reply = send(&app(), "GET", "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn serves_web_client_with_index_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
    let auth = test_auth(Duration::days(1));
    let app = server::router(AppState::new(Db::memory().unwrap(), auth, false), Some(dir.path()));

    for uri in ["/", "/wiki/3"] {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<html>app</html>");
    }
}

#[tokio::test]
async fn malformed_ids_are_bad_request() {
    let app = app();
    let cookie = login(&app).await;
    let c = Some(cookie.as_str());
    for (method, uri, body) in [
        ("PATCH", "/api/tasks/abc", Some(json!({ "done": true }))),
        ("DELETE", "/api/tasks/abc", None),
        ("GET", "/api/tasks/abc/gantt", None),
        ("GET", "/api/wiki/1.5", None),
    ] {
        let reply = send(&app, method, uri, c, body).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(reply.body, json!({ "error": "bad_request" }), "{method} {uri}");
    }
}

#[tokio::test]
async fn operational_section() {
    let app = app();
    let cookie = login(&app).await;
    let c = Some(cookie.as_str());

    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "Release" }))).await;
    let release = reply.body["id"].as_i64().unwrap();
    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "ОПЕРАТИВНЫЕ дела" }))).await;
    let ops_root = reply.body["id"].as_i64().unwrap();
    let reply = send(&app, "POST", "/api/tasks", c, Some(json!({ "title": "call", "parent_id": ops_root }))).await;
    let call = reply.body["id"].as_i64().unwrap();

    let reply = send(&app, "GET", "/api/tasks?section=operational", c, None).await;
    let tree = reply.body["tree"].as_array().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["id"], ops_root);
    assert_eq!(tree[0]["children"][0]["id"], call);

    let reply = send(&app, "GET", "/api/tasks?section=tasks", c, None).await;
    let tree = reply.body["tree"].as_array().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0]["id"], release);

    let reply = send(&app, "GET", "/api/tasks", c, None).await;
    assert_eq!(reply.body["tree"].as_array().unwrap().len(), 2);

    let reply = send(&app, "GET", "/api/tasks/outline?section=operational", c, None).await;
    let ids: Vec<i64> = reply.body["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![ops_root, call]);

    let reply = send(&app, "GET", "/api/tasks?section=wiki", c, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "error": "invalid_section" }));

    let reply = send(&app, "GET", &format!("/api/tasks/{call}/section"), c, None).await;
    assert_eq!(reply.body, json!({ "root_id": ops_root, "section": "operational" }));
    let reply = send(&app, "GET", &format!("/api/tasks/{release}/section"), c, None).await;
    assert_eq!(reply.body, json!({ "root_id": release, "section": "tasks" }));
    let reply = send(&app, "GET", "/api/tasks/9999/section", c, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}
