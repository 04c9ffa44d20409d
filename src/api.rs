//! JSON handlers for `/api/*`.

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, State};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::auth::AUTH_COOKIE;
use crate::calendar::{self, CalendarPage, CalendarView};
use crate::error::{Error, Result};
use crate::gantt::{gantt, GanttChart};
use crate::markdown::render_markdown;
use crate::model::{TaskNode, WikiPage, WikiSummary};
use crate::ops::{self, NewTask, TaskField, TaskUpdate, WikiField, WikiUpdate};
use crate::outline::{self, OutlineRow, ViewState};
use crate::server::AppState;
use crate::tree::{self, Section};

/// JSON request body whose parse failures become `400 bad_request`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

/// Path parameters; a malformed segment becomes `400 bad_request`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct Path<T>(pub T);

/// Query string; parse failures become `400 bad_request`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct Query<T>(pub T);

/// Distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`). Use together with `#[serde(default)]`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[derive(Serialize)]
pub struct Created {
    ok: bool,
    id: i64,
}

// ── Session ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    let auth = Arc::clone(&state.auth);
    let matches =
        tokio::task::spawn_blocking(move || auth.check_password(&req.password)).await?;
    if !matches {
        log::warn!("rejected login attempt");
        return Err(Error::InvalidPassword);
    }
    let token = state.auth.issue_token()?;
    Ok((jar.add(state.session_cookie(token)), ok()))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (jar.remove(Cookie::build(AUTH_COOKIE).path("/")), ok())
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Json<Value> {
    Json(json!({ "authenticated": state.is_authenticated(&jar) }))
}

// ── Tasks ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TreeResponse {
    tree: Vec<TaskNode>,
}

/// `?section=tasks|operational` narrows a tree view to the matching roots.
#[derive(Deserialize)]
pub struct SectionQuery {
    section: Option<String>,
}

impl SectionQuery {
    fn section(&self) -> Result<Option<Section>> {
        self.section.as_deref().map(Section::parse).transpose()
    }
}

async fn section_tree(state: &AppState, section: Option<Section>) -> Result<Vec<TaskNode>> {
    let tree = state.with_db(|conn| ops::task_tree(conn)).await?;
    Ok(match section {
        Some(section) => tree::filter_section(tree, section),
        None => tree,
    })
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<SectionQuery>,
) -> Result<Json<TreeResponse>> {
    let tree = section_tree(&state, query.section()?).await?;
    Ok(Json(TreeResponse { tree }))
}

#[derive(Deserialize)]
pub struct CreateTask {
    title: Option<String>,
    parent_id: Option<i64>,
    assignee: Option<String>,
    deadline: Option<String>,
    description: Option<String>,
}

pub async fn create_task(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateTask>,
) -> Result<Json<Created>> {
    let id = state
        .with_db(move |conn| {
            ops::add_task(
                conn,
                &NewTask {
                    title: body.title.as_deref().unwrap_or_default(),
                    parent_id: body.parent_id,
                    assignee: body.assignee.as_deref(),
                    deadline: body.deadline.as_deref(),
                    description: body.description.as_deref(),
                },
            )
        })
        .await?;
    Ok(Json(Created { ok: true, id }))
}

/// `PATCH /api/tasks/{id}` body. Nullable fields use `Some(None)` for an
/// explicit `null`, which clears the stored value.
#[derive(Debug, Default, Deserialize)]
pub struct PatchTask {
    title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    deadline: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    description: Option<Option<String>>,
    done: Option<bool>,
}

impl PatchTask {
    pub fn into_update(self) -> TaskUpdate {
        let mut update = TaskUpdate::new();
        if let Some(title) = self.title {
            update = update.set(TaskField::Title(title));
        }
        if let Some(assignee) = self.assignee {
            update = update.set(TaskField::Assignee(assignee));
        }
        if let Some(deadline) = self.deadline {
            update = update.set(TaskField::Deadline(deadline));
        }
        if let Some(description) = self.description {
            update = update.set(TaskField::Description(description));
        }
        if let Some(done) = self.done {
            update = update.set(TaskField::Done(done));
        }
        update
    }
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<PatchTask>,
) -> Result<Json<Value>> {
    let update = body.into_update();
    state
        .with_db(move |conn| ops::update_task(conn, id, update))
        .await?;
    Ok(ok())
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let deleted = state.with_db(move |conn| ops::delete_task(conn, id)).await?;
    log::info!("deleted task {id} with {deleted} row(s)");
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

#[derive(Deserialize)]
pub struct OutlineQuery {
    collapsed: Option<String>,
    open: Option<String>,
    #[serde(flatten)]
    section: SectionQuery,
}

#[derive(Serialize)]
pub struct OutlineResponse {
    rows: Vec<OutlineRow>,
    text: String,
}

pub async fn task_outline(
    State(state): State<AppState>,
    Query(query): Query<OutlineQuery>,
) -> Result<Json<OutlineResponse>> {
    let collapsed = outline::parse_id_list(query.collapsed.as_deref().unwrap_or_default())?;
    let open = outline::parse_id_list(query.open.as_deref().unwrap_or_default())?;
    let mut view = ViewState::from_ids(collapsed, open);

    let tree = section_tree(&state, query.section.section()?).await?;
    view.retain_present(&tree);
    let rows = outline::outline(&tree, &view);
    let text = outline::render_text(&rows);
    Ok(Json(OutlineResponse { rows, text }))
}

pub async fn task_gantt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GanttChart>> {
    let root = state.with_db(move |conn| ops::task_subtree(conn, id)).await?;
    Ok(Json(gantt(&root)))
}

#[derive(Serialize)]
pub struct SectionResponse {
    root_id: i64,
    section: Section,
}

/// Which root tree, and so which section, holds task `id`.
pub async fn task_section(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SectionResponse>> {
    let tree = state.with_db(|conn| ops::task_tree(conn)).await?;
    let root = tree::root_of(&tree, id).ok_or(Error::NotFound)?;
    Ok(Json(SectionResponse {
        root_id: root.task.id,
        section: Section::of(&root.task),
    }))
}

// ── Calendar ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CalendarQuery {
    view: Option<String>,
    date: Option<String>,
}

pub async fn calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarPage>> {
    let view = match query.view.as_deref() {
        Some(v) => CalendarView::parse(v)?,
        None => CalendarView::Month,
    };
    let anchor = match query.date.as_deref() {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| Error::Invalid("invalid_date"))?,
        None => Utc::now().date_naive(),
    };
    let tree = state.with_db(|conn| ops::task_tree(conn)).await?;
    Ok(Json(calendar::build_page(&tree, view, anchor)?))
}

// ── Wiki ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct WikiListResponse {
    pages: Vec<WikiSummary>,
}

pub async fn list_wiki(State(state): State<AppState>) -> Result<Json<WikiListResponse>> {
    let pages = state.with_db(|conn| ops::list_wiki_pages(conn)).await?;
    Ok(Json(WikiListResponse { pages }))
}

#[derive(Serialize)]
pub struct WikiPageResponse {
    page: WikiPage,
}

pub async fn get_wiki(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WikiPageResponse>> {
    let page = state.with_db(move |conn| ops::get_wiki_page(conn, id)).await?;
    Ok(Json(WikiPageResponse { page }))
}

#[derive(Deserialize)]
pub struct CreateWiki {
    title: Option<String>,
    #[serde(default)]
    content: String,
}

pub async fn create_wiki(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateWiki>,
) -> Result<Json<Created>> {
    let id = state
        .with_db(move |conn| {
            ops::add_wiki_page(conn, body.title.as_deref().unwrap_or_default(), &body.content)
        })
        .await?;
    Ok(Json(Created { ok: true, id }))
}

#[derive(Deserialize)]
pub struct PatchWiki {
    title: Option<String>,
    content: Option<String>,
}

impl PatchWiki {
    pub fn into_update(self) -> WikiUpdate {
        let mut update = WikiUpdate::new();
        if let Some(title) = self.title {
            update = update.set(WikiField::Title(title));
        }
        if let Some(content) = self.content {
            update = update.set(WikiField::Content(content));
        }
        update
    }
}

pub async fn update_wiki(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<PatchWiki>,
) -> Result<Json<Value>> {
    let update = body.into_update();
    state
        .with_db(move |conn| ops::update_wiki_page(conn, id, update))
        .await?;
    Ok(ok())
}

pub async fn delete_wiki(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .with_db(move |conn| ops::delete_wiki_page(conn, id))
        .await?;
    Ok(ok())
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    content: String,
}

pub async fn preview_wiki(JsonBody(req): JsonBody<PreviewRequest>) -> Json<Value> {
    Json(json!({ "html": render_markdown(&req.content) }))
}
