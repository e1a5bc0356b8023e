// ABOUTME: Core library for todos, containing the record model and its validation rules.
// ABOUTME: This crate defines the shared data model used by every storage backend.

pub mod model;

pub use model::{ListOptions, NewTodo, Todo, TodoPatch, ValidationError, now};
