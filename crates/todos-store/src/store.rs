// ABOUTME: The storage contract every todo backend implements.
// ABOUTME: Callers hold a `Box<dyn TodoStore>` and cannot observe which backend is behind it.

use async_trait::async_trait;
use todos_core::{ListOptions, NewTodo, Todo, TodoPatch};

use crate::error::StoreError;

/// Capability contract shared by the JSON file and SQLite backends.
///
/// "Not found" is never an error: lookups return `None` and deletes return `false`.
/// Every returned `Todo` is an owned copy independent of the backend's state.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Short name used in logs.
    fn backend(&self) -> &'static str;

    /// Prepare the medium. Calling it again after success is a no-op.
    async fn init(&mut self) -> Result<(), StoreError>;

    /// Flush anything pending and release the medium. Safe to call repeatedly
    /// and on a store that was never initialised.
    async fn close(&mut self) -> Result<(), StoreError>;

    async fn add_todo(&mut self, data: NewTodo) -> Result<Todo, StoreError>;

    /// All records ordered by `created_at` ascending, windowed by `opts`.
    async fn get_all_todos(&self, opts: ListOptions) -> Result<Vec<Todo>, StoreError>;

    async fn get_todo_by_id(&self, id: &str) -> Result<Option<Todo>, StoreError>;

    async fn update_todo(&mut self, id: &str, patch: TodoPatch)
    -> Result<Option<Todo>, StoreError>;

    async fn delete_todo(&mut self, id: &str) -> Result<bool, StoreError>;
}
