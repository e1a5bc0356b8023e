// ABOUTME: Async worker that owns the configured backend and processes storage requests one at a time.
// ABOUTME: Provides the cloneable TodoService handle that request handlers call into.

use thiserror::Error;
use todos_core::{ListOptions, NewTodo, Todo, TodoPatch};
use todos_store::{StoreError, TodoStore};
use tokio::sync::{mpsc, oneshot};

/// Errors surfaced by the service handle.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("todo service worker has stopped")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// One storage call paired with the channel its result goes back on.
enum Request {
    Init(Reply<()>),
    Close(Reply<()>),
    Add(NewTodo, Reply<Todo>),
    List(ListOptions, Reply<Vec<Todo>>),
    Get(String, Reply<Option<Todo>>),
    Update(String, TodoPatch, Reply<Option<Todo>>),
    Delete(String, Reply<bool>),
}

/// Handle to the worker task. Cloning it shares the same worker, so calls from
/// every clone are still applied in the order they arrive.
#[derive(Clone)]
pub struct TodoService {
    tx: mpsc::Sender<Request>,
    backend: &'static str,
}

impl TodoService {
    /// Name of the backend the worker owns.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        let result = rx.await.map_err(|_| ServiceError::ChannelClosed)?;
        Ok(result?)
    }

    pub async fn init(&self) -> Result<(), ServiceError> {
        self.call(Request::Init).await
    }

    pub async fn close(&self) -> Result<(), ServiceError> {
        self.call(Request::Close).await
    }

    pub async fn add_todo(&self, data: NewTodo) -> Result<Todo, ServiceError> {
        self.call(|reply| Request::Add(data, reply)).await
    }

    pub async fn get_all_todos(&self, opts: ListOptions) -> Result<Vec<Todo>, ServiceError> {
        self.call(|reply| Request::List(opts, reply)).await
    }

    pub async fn get_todo_by_id(&self, id: &str) -> Result<Option<Todo>, ServiceError> {
        let id = id.to_string();
        self.call(|reply| Request::Get(id, reply)).await
    }

    pub async fn update_todo(
        &self,
        id: &str,
        patch: TodoPatch,
    ) -> Result<Option<Todo>, ServiceError> {
        let id = id.to_string();
        self.call(|reply| Request::Update(id, patch, reply)).await
    }

    pub async fn delete_todo(&self, id: &str) -> Result<bool, ServiceError> {
        let id = id.to_string();
        self.call(|reply| Request::Delete(id, reply)).await
    }
}

/// Spawn the worker task over `store` and return a handle to it.
/// The worker runs until every handle is dropped.
pub fn spawn(store: Box<dyn TodoStore>) -> TodoService {
    let (tx, rx) = mpsc::channel::<Request>(64);
    let backend = store.backend();

    tokio::spawn(Worker { store, rx }.run());

    TodoService { tx, backend }
}

struct Worker {
    store: Box<dyn TodoStore>,
    rx: mpsc::Receiver<Request>,
}

impl Worker {
    async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            self.handle(request).await;
        }
        tracing::debug!(backend = self.store.backend(), "todo service worker stopped");
    }

    // Send errors are ignored: the caller may have dropped their receiver.
    async fn handle(&mut self, request: Request) {
        match request {
            Request::Init(reply) => {
                let _ = reply.send(self.store.init().await);
            }
            Request::Close(reply) => {
                let _ = reply.send(self.store.close().await);
            }
            Request::Add(data, reply) => {
                let _ = reply.send(self.store.add_todo(data).await);
            }
            Request::List(opts, reply) => {
                let _ = reply.send(self.store.get_all_todos(opts).await);
            }
            Request::Get(id, reply) => {
                let _ = reply.send(self.store.get_todo_by_id(&id).await);
            }
            Request::Update(id, patch, reply) => {
                let _ = reply.send(self.store.update_todo(&id, patch).await);
            }
            Request::Delete(id, reply) => {
                let _ = reply.send(self.store.delete_todo(&id).await);
            }
        }
    }
}
