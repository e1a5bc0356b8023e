// ABOUTME: SQLite backend storing todos in one table, with WAL, foreign keys, and a bounded busy wait.
// ABOUTME: Bootstraps its schema idempotently and runs every statement off the async runtime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use todos_core::{ListOptions, NewTodo, Todo, TodoPatch};

use crate::codec::{TODO_COLUMNS, TodoRow, format_timestamp};
use crate::error::StoreError;
use crate::store::TodoStore;

/// Schema applied when no external bootstrap script is configured or found.
pub const EMBEDDED_SCHEMA: &str = include_str!("../schema.sql");

/// Default time to wait on a locked database before reporting busy.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SqliteStoreOptions {
    pub busy_timeout: Duration,
    /// External bootstrap script. Used when the file exists, otherwise the
    /// embedded schema is applied.
    pub schema_path: Option<PathBuf>,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            schema_path: None,
        }
    }
}

/// A todo store backed by a single SQLite database file.
pub struct SqliteStore {
    path: PathBuf,
    options: SqliteStoreOptions,
    conn: Option<Arc<Mutex<Connection>>>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>, options: SqliteStoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
            conn: None,
        }
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone().ok_or(StoreError::NotInitialized)?;
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

/// Open the database, apply pragmas, and run the bootstrap script.
fn open_connection(path: &Path, options: &SqliteStoreOptions) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

    let script = match &options.schema_path {
        Some(schema_path) if schema_path.is_file() => {
            tracing::debug!(schema = %schema_path.display(), "applying external bootstrap script");
            std::fs::read_to_string(schema_path)?
        }
        Some(schema_path) => {
            tracing::debug!(
                schema = %schema_path.display(),
                "bootstrap script not found, using embedded schema"
            );
            EMBEDDED_SCHEMA.to_string()
        }
        None => EMBEDDED_SCHEMA.to_string(),
    };
    conn.execute_batch(&script)?;

    Ok(conn)
}

fn select_by_id(conn: &Connection, id: &str) -> Result<Option<Todo>, StoreError> {
    let sql = format!("SELECT {} FROM todos WHERE id = ?1", TODO_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], TodoRow::from_row)
        .optional()?;
    match row {
        Some(row) => Ok(Some(row.into_todo()?)),
        None => Ok(None),
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl TodoStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn init(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let path = self.path.clone();
        let options = self.options.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&path, &options)).await??;

        self.conn = Some(Arc::new(Mutex::new(conn)));
        tracing::info!(path = %self.path.display(), "sqlite store opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| StoreError::Poisoned)?;
                conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            }
            Err(_) => {
                tracing::warn!("sqlite connection still shared at close; dropping handle");
            }
        }

        tracing::info!(path = %self.path.display(), "sqlite store closed");
        Ok(())
    }

    async fn add_todo(&mut self, data: NewTodo) -> Result<Todo, StoreError> {
        let todo = Todo::create(data)?;
        let row = todo.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO todos (id, title, description, done, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    row.title,
                    row.description,
                    row.done,
                    format_timestamp(row.created_at),
                    format_timestamp(row.updated_at),
                ],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(id = %todo.id, "added todo");
        Ok(todo)
    }

    async fn get_all_todos(&self, opts: ListOptions) -> Result<Vec<Todo>, StoreError> {
        self.with_conn(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM todos ORDER BY created_at ASC, rowid ASC",
                TODO_COLUMNS
            );

            let rows: Vec<TodoRow> = match opts.limit {
                Some(limit) => {
                    sql.push_str(" LIMIT ?1 OFFSET ?2");
                    let offset = opts.offset.unwrap_or(0);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(
                            params![to_sql_int(limit), to_sql_int(offset)],
                            TodoRow::from_row,
                        )?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map([], TodoRow::from_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
            };

            let mut todos = Vec::with_capacity(rows.len());
            for row in rows {
                todos.push(row.into_todo()?);
            }
            Ok(todos)
        })
        .await
    }

    async fn get_todo_by_id(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| select_by_id(conn, &id)).await
    }

    async fn update_todo(
        &mut self,
        id: &str,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        let id = id.to_string();
        let updated = self
            .with_conn(move |conn| {
                let tx = conn.unchecked_transaction()?;

                let Some(existing) = select_by_id(&tx, &id)? else {
                    return Ok(None);
                };
                let updated = existing.patched(patch)?;

                tx.execute(
                    "UPDATE todos SET title = ?1, description = ?2, done = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        updated.title,
                        updated.description,
                        updated.done,
                        format_timestamp(updated.updated_at),
                        updated.id,
                    ],
                )?;
                tx.commit()?;
                Ok(Some(updated))
            })
            .await?;

        if let Some(todo) = &updated {
            tracing::debug!(id = %todo.id, "updated todo");
        }
        Ok(updated)
    }

    async fn delete_todo(&mut self, id: &str) -> Result<bool, StoreError> {
        let owned_id = id.to_string();
        let removed = self
            .with_conn(move |conn| {
                let affected =
                    conn.execute("DELETE FROM todos WHERE id = ?1", params![owned_id])?;
                Ok(affected > 0)
            })
            .await?;

        if removed {
            tracing::debug!(%id, "deleted todo");
        }
        Ok(removed)
    }
}
