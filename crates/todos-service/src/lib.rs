// ABOUTME: Domain service layer for todos, sitting between request handlers and the storage backends.
// ABOUTME: Loads configuration, picks the backend, and serializes every call through one worker task.

pub mod config;
pub mod service;

pub use config::{Backend, ConfigError, TodosConfig, open_store};
pub use service::{ServiceError, TodoService, spawn};
