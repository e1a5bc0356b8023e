// ABOUTME: JSON file backend holding every todo in memory and persisting the whole set to one file.
// ABOUTME: Writes go through a sibling temp file and an atomic rename, deferred to close or immediate.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use todos_core::{ListOptions, NewTodo, Todo, TodoPatch};
use ulid::Ulid;

use crate::codec;
use crate::error::StoreError;
use crate::store::TodoStore;

/// Process-wide sequence number for temp file names.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An unrecognized durability mode name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized durability mode {0:?}, expected \"deferred\" or \"immediate\"")]
pub struct InvalidDurabilityMode(pub String);

/// When in-memory changes reach the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Only on `close()` or an explicit `flush()`.
    #[default]
    Deferred,
    /// After every successful add, update, or delete.
    Immediate,
}

impl FromStr for DurabilityMode {
    type Err = InvalidDurabilityMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" => Ok(Self::Deferred),
            "immediate" => Ok(Self::Immediate),
            _ => Err(InvalidDurabilityMode(s.to_string())),
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("deferred"),
            Self::Immediate => f.write_str("immediate"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JsonStoreOptions {
    pub durability: DurabilityMode,
    /// Pretty-print the file instead of writing compact JSON.
    pub pretty: bool,
}

impl Default for JsonStoreOptions {
    fn default() -> Self {
        Self {
            durability: DurabilityMode::Deferred,
            pretty: true,
        }
    }
}

/// A todo store backed by a single JSON array file.
///
/// The file is read once at `init()` into an id-keyed map. Mutations update the
/// map and set a dirty flag; the file is rewritten at `close()` (deferred mode)
/// or after each mutation (immediate mode). After `close()` every operation
/// fails with `NotInitialized` until `init()` reloads the file.
pub struct JsonStore {
    path: PathBuf,
    options: JsonStoreOptions,
    todos: BTreeMap<String, Todo>,
    dirty: bool,
    initialized: bool,
    closed: bool,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>, options: JsonStoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
            todos: BTreeMap::new(),
            dirty: false,
            initialized: false,
            closed: false,
        }
    }

    /// Returns the path to the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn durability(&self) -> DurabilityMode {
        self.options.durability
    }

    /// True when memory holds changes the file does not.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// Write the current set to disk regardless of durability mode or dirty state.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        self.write_file().await
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    /// Lenient guard for mutations that arrive before the first `init()`: start
    /// from an empty set instead of failing. Nothing is read from disk, so a
    /// later write replaces whatever the file held. A closed store is not
    /// eligible, since its file holds records the empty set would overwrite.
    fn ensure_initialized(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.initialized {
            tracing::warn!(
                path = %self.path.display(),
                "json store mutated before init(); starting from an empty set"
            );
            self.initialized = true;
        }
        Ok(())
    }

    /// Record a change and, in immediate mode, persist it right away.
    async fn mark_changed(&mut self) -> Result<(), StoreError> {
        self.dirty = true;
        if self.options.durability == DurabilityMode::Immediate {
            self.write_file().await?;
        }
        Ok(())
    }

    fn sorted(&self) -> Vec<Todo> {
        let mut todos: Vec<Todo> = self.todos.values().cloned().collect();
        codec::sort_for_listing(&mut todos);
        todos
    }

    /// Load the file into memory. A missing, empty, or malformed file yields an
    /// empty set that is marked dirty so the next write produces a valid file.
    async fn load(&mut self) -> Result<(), StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "todo file not found, starting empty");
                self.todos.clear();
                self.dirty = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(path = %self.path.display(), "todo file is empty, starting empty");
            self.todos.clear();
            self.dirty = true;
            return Ok(());
        }

        let decoded = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(codec::decode_file);

        match decoded {
            Some(records) => {
                self.todos = records
                    .into_iter()
                    .map(|todo| (todo.id.clone(), todo))
                    .collect();
                self.dirty = false;
                tracing::info!(
                    path = %self.path.display(),
                    count = self.todos.len(),
                    "loaded todo file"
                );
            }
            None => {
                tracing::warn!(
                    path = %self.path.display(),
                    "todo file is not a JSON array of records, starting empty"
                );
                self.todos.clear();
                self.dirty = true;
            }
        }

        Ok(())
    }

    /// Serialize the full set in listing order to a temp sibling, then rename it
    /// over the target. The dirty flag is only cleared once the rename succeeds.
    async fn write_file(&mut self) -> Result<(), StoreError> {
        let bytes = codec::encode_file(&self.sorted(), self.options.pretty)?;

        if let Some(parent) = parent_dir(&self.path) {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = temp_path_for(&self.path);
        if let Err(e) = write_and_rename(&tmp_path, &self.path, &bytes).await {
            match fs::remove_file(&tmp_path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => tracing::warn!(
                    tmp = %tmp_path.display(),
                    "failed to remove temp file after write error: {}",
                    cleanup
                ),
            }
            return Err(e.into());
        }

        // Fsync the directory so the rename itself is durable. Best-effort: the
        // rename already succeeded and the file content is consistent.
        if let Some(parent) = parent_dir(&self.path)
            && let Ok(dir) = fs::File::open(parent).await
        {
            let _ = dir.sync_all().await;
        }

        self.dirty = false;
        tracing::debug!(
            path = %self.path.display(),
            count = self.todos.len(),
            "wrote todo file"
        );
        Ok(())
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// A hidden sibling of `target` unique across processes (pid), within a process
/// (counter), and across restarts (ULID).
fn temp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "todos.json".to_string());
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        ".{}.{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        seq,
        Ulid::new()
    );
    target.with_file_name(tmp_name)
}

async fn write_and_rename(tmp_path: &Path, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp_path, final_path).await
}

#[async_trait]
impl TodoStore for JsonStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    async fn init(&mut self) -> Result<(), StoreError> {
        if self.initialized {
            return Ok(());
        }

        if let Some(parent) = parent_dir(&self.path) {
            fs::create_dir_all(parent).await?;
        }
        self.load().await?;
        self.initialized = true;
        self.closed = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.write_file().await?;
        }
        if self.initialized {
            tracing::info!(path = %self.path.display(), "json store closed");
            self.closed = true;
        }
        self.todos.clear();
        self.initialized = false;
        Ok(())
    }

    async fn add_todo(&mut self, data: NewTodo) -> Result<Todo, StoreError> {
        self.ensure_initialized()?;
        let todo = Todo::create(data)?;
        self.todos.insert(todo.id.clone(), todo.clone());
        tracing::debug!(id = %todo.id, "added todo");
        self.mark_changed().await?;
        Ok(todo)
    }

    async fn get_all_todos(&self, opts: ListOptions) -> Result<Vec<Todo>, StoreError> {
        self.ensure_open()?;
        Ok(opts.paginate(self.sorted()))
    }

    async fn get_todo_by_id(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        self.ensure_open()?;
        Ok(self.todos.get(id).cloned())
    }

    async fn update_todo(
        &mut self,
        id: &str,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        self.ensure_initialized()?;
        let Some(existing) = self.todos.get(id) else {
            return Ok(None);
        };
        let updated = existing.patched(patch)?;
        self.todos.insert(updated.id.clone(), updated.clone());
        tracing::debug!(%id, "updated todo");
        self.mark_changed().await?;
        Ok(Some(updated))
    }

    async fn delete_todo(&mut self, id: &str) -> Result<bool, StoreError> {
        self.ensure_initialized()?;
        if self.todos.remove(id).is_none() {
            return Ok(false);
        }
        tracing::debug!(%id, "deleted todo");
        self.mark_changed().await?;
        Ok(true)
    }
}
