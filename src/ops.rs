use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::{Error, Result};
use crate::model::{Task, TaskNode, WikiPage, WikiSummary};
use crate::tree::{build_tree, collect_subtree};
use crate::validate::{optional_text, require_title};

const TASK_COLUMNS: &str =
    "id, parent_id, title, assignee, deadline, description, done, created_at, updated_at";

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn read_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        title: row.get(2)?,
        assignee: row.get(3)?,
        deadline: row.get(4)?,
        description: row.get(5)?,
        done: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn task_exists(conn: &Connection, id: i64) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks WHERE id = ?1", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn require_task(conn: &Connection, id: i64) -> Result<()> {
    if !task_exists(conn, id)? {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// Run `UPDATE {table} SET ... WHERE id = ?` for the given assignments,
/// always bumping `updated_at`.
fn apply_assignments(
    conn: &Connection,
    table: &str,
    id: i64,
    assignments: Vec<(&'static str, Value)>,
) -> Result<()> {
    let mut sets: Vec<String> = Vec::with_capacity(assignments.len() + 1);
    let mut values: Vec<Value> = Vec::with_capacity(assignments.len() + 2);
    for (column, value) in assignments {
        values.push(value);
        sets.push(format!("{column} = ?{}", values.len()));
    }
    values.push(Value::Integer(now_ms()));
    sets.push(format!("updated_at = ?{}", values.len()));
    values.push(Value::Integer(id));
    let sql = format!(
        "UPDATE {table} SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn text_value(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

// ── Tasks ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NewTask<'a> {
    pub title: &'a str,
    pub parent_id: Option<i64>,
    pub assignee: Option<&'a str>,
    pub deadline: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Insert a task and return its id.
///
/// Optional text fields are trimmed and stored as NULL when blank. The
/// parent, when given, must exist.
pub fn add_task(conn: &Connection, new: &NewTask) -> Result<i64> {
    let title = require_title(new.title)?;
    if let Some(parent) = new.parent_id {
        if !task_exists(conn, parent)? {
            return Err(Error::Invalid("parent_not_found"));
        }
    }
    let now = now_ms();
    conn.execute(
        "INSERT INTO tasks (parent_id, title, assignee, deadline, description, done, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
        params![
            new.parent_id,
            title,
            optional_text(new.assignee),
            optional_text(new.deadline),
            optional_text(new.description),
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Task> {
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    conn.query_row(&query, [id], read_task_row)
        .optional()?
        .ok_or(Error::NotFound)
}

/// All task rows in id order.
pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id");
    let mut stmt = conn.prepare(&query)?;
    let tasks = stmt
        .query_map([], read_task_row)?
        .collect::<rusqlite::Result<_>>()?;
    Ok(tasks)
}

/// The full task forest, assembled fresh from the table.
pub fn task_tree(conn: &Connection) -> Result<Vec<TaskNode>> {
    Ok(build_tree(list_tasks(conn)?))
}

/// The subtree rooted at `id`.
pub fn task_subtree(conn: &Connection, id: i64) -> Result<TaskNode> {
    require_task(conn, id)?;
    task_tree(conn)?
        .iter()
        .find_map(|root| root.find(id))
        .cloned()
        .ok_or(Error::NotFound)
}

pub fn count_tasks(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?)
}

/// One assignment in a task update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskField {
    Title(String),
    /// `None` clears the field.
    Assignee(Option<String>),
    Deadline(Option<String>),
    Description(Option<String>),
    Done(bool),
}

impl TaskField {
    fn column(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Assignee(_) => "assignee",
            Self::Deadline(_) => "deadline",
            Self::Description(_) => "description",
            Self::Done(_) => "done",
        }
    }

    /// Validate and convert into a column value.
    fn into_value(self) -> Result<Value> {
        Ok(match self {
            Self::Title(t) => Value::Text(require_title(&t)?),
            Self::Assignee(v) | Self::Deadline(v) | Self::Description(v) => {
                text_value(optional_text(v.as_deref()))
            }
            Self::Done(d) => Value::Integer(i64::from(d)),
        })
    }
}

/// The set of fields a partial task update touches. Fields not in the set
/// keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    fields: Vec<TaskField>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field`, replacing an earlier assignment to the same column.
    pub fn set(mut self, field: TaskField) -> Self {
        self.fields.retain(|f| f.column() != field.column());
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[TaskField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Apply a partial update. Missing tasks yield `NotFound`; `updated_at`
/// moves even when the set is empty.
pub fn update_task(conn: &Connection, id: i64, update: TaskUpdate) -> Result<()> {
    require_task(conn, id)?;
    let assignments = update
        .fields
        .into_iter()
        .map(|field| {
            let column = field.column();
            field.into_value().map(|value| (column, value))
        })
        .collect::<Result<Vec<_>>>()?;
    apply_assignments(conn, "tasks", id, assignments)
}

/// Delete `id` and every descendant in one transaction.
///
/// Returns the number of rows removed; a missing `id` removes nothing and
/// returns 0.
pub fn delete_task(conn: &mut Connection, id: i64) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let links: Vec<(i64, Option<i64>)> = {
        let mut stmt = tx.prepare("SELECT id, parent_id FROM tasks")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let doomed = collect_subtree(&links, id);

    let before = count_tasks(&tx)?;
    {
        let mut stmt = tx.prepare("DELETE FROM tasks WHERE id = ?1")?;
        // Leaves first. Inside a parent cycle the cascade may still take
        // rows early, so the result is counted from the table instead.
        for task_id in doomed.iter().rev() {
            stmt.execute([task_id])?;
        }
    }
    let deleted = before - count_tasks(&tx)?;
    tx.commit()?;
    Ok(usize::try_from(deleted).unwrap_or_default())
}

// ── Wiki ───────────────────────────────────────────────────────────────

fn read_wiki_row(row: &Row) -> rusqlite::Result<WikiPage> {
    Ok(WikiPage {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn add_wiki_page(conn: &Connection, title: &str, content: &str) -> Result<i64> {
    let title = require_title(title)?;
    let now = now_ms();
    conn.execute(
        "INSERT INTO wiki_pages (title, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![title, content, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Page summaries, most recently edited first.
pub fn list_wiki_pages(conn: &Connection) -> Result<Vec<WikiSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, created_at, updated_at FROM wiki_pages
         ORDER BY updated_at DESC, id DESC",
    )?;
    let pages = stmt
        .query_map([], |row| {
            Ok(WikiSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(pages)
}

pub fn get_wiki_page(conn: &Connection, id: i64) -> Result<WikiPage> {
    conn.query_row(
        "SELECT id, title, content, created_at, updated_at FROM wiki_pages WHERE id = ?1",
        [id],
        read_wiki_row,
    )
    .optional()?
    .ok_or(Error::NotFound)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WikiField {
    Title(String),
    Content(String),
}

impl WikiField {
    fn column(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Content(_) => "content",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WikiUpdate {
    fields: Vec<WikiField>,
}

impl WikiUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: WikiField) -> Self {
        self.fields.retain(|f| f.column() != field.column());
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[WikiField] {
        &self.fields
    }
}

pub fn update_wiki_page(conn: &Connection, id: i64, update: WikiUpdate) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM wiki_pages WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(Error::NotFound);
    }
    let mut assignments = Vec::with_capacity(update.fields.len());
    for field in update.fields {
        let column = field.column();
        let value = match field {
            WikiField::Title(t) => require_title(&t)?,
            WikiField::Content(c) => c,
        };
        assignments.push((column, Value::Text(value)));
    }
    apply_assignments(conn, "wiki_pages", id, assignments)
}

pub fn delete_wiki_page(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM wiki_pages WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}
