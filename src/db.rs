use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id   INTEGER NULL REFERENCES tasks(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    assignee    TEXT NULL,
    deadline    TEXT NULL,
    description TEXT NULL,
    done        INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

CREATE TABLE IF NOT EXISTS wiki_pages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wiki_pages_updated ON wiki_pages(updated_at);
";

/// Columns added to `tasks` after the first release. Databases created
/// before they existed get them on startup.
const TASK_COLUMNS_ADDED: &[(&str, &str)] = &[
    ("assignee", "TEXT NULL"),
    ("deadline", "TEXT NULL"),
    ("description", "TEXT NULL"),
];

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    for (name, decl) in TASK_COLUMNS_ADDED {
        ensure_column(conn, "tasks", name, decl)?;
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(names)
}

/// Add `column` to `table` unless it is already there.
fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if table_columns(conn, table)?.iter().any(|c| c == column) {
        return Ok(());
    }
    log::info!("adding column {table}.{column}");
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    Ok(())
}

#[cfg(test)]
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn)?;
    Ok(conn)
}

/// Shared handle to the single application connection.
///
/// Handlers receive it through the router state and lock it for the
/// duration of one store operation.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open the database at `path`, creating parent directories and the
    /// schema as needed.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::Error::Config(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = open(&path.to_string_lossy())?;
        init(&conn)?;
        Ok(Self::new(conn))
    }

    /// In-memory database with the schema applied.
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        set_pragmas(&conn)?;
        init(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
