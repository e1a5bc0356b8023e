// ABOUTME: Persistence layer for todos, exposing one storage trait with two interchangeable backends.
// ABOUTME: Provides an atomic-write JSON file store, a SQLite store, and the record codec they share.

pub mod codec;
pub mod error;
pub mod json;
pub mod sqlite;
pub mod store;

pub use codec::CodecError;
pub use error::StoreError;
pub use json::{DurabilityMode, InvalidDurabilityMode, JsonStore, JsonStoreOptions};
pub use sqlite::{SqliteStore, SqliteStoreOptions};
pub use store::TodoStore;
