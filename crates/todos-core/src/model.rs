// ABOUTME: Defines the Todo record, its creation input, partial patches, and list pagination.
// ABOUTME: Owns the invariants every backend relies on: non-blank titles, immutable ids, monotonic updatedAt.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Invalid input to a write operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is required and must not be blank")]
    EmptyTitle,
}

/// Current time truncated to microseconds, the finest precision both storage media keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Last timestamp handed out by `issue_stamp`, in microseconds since the epoch.
static LAST_STAMP: AtomicI64 = AtomicI64::new(i64::MIN);

/// A microsecond timestamp strictly after every other one issued by this process,
/// so records created back to back never share a `created_at`.
fn issue_stamp() -> DateTime<Utc> {
    let now = now();
    let micros = now.timestamp_micros();
    let prev = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(micros.max(last.saturating_add(1)))
        })
        .unwrap_or_else(|last| last);
    DateTime::from_timestamp_micros(micros.max(prev.saturating_add(1))).unwrap_or(now)
}

/// A single todo item in its canonical wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied data for a new todo. Id and timestamps are always assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

impl NewTodo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A partial update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub done: Option<bool>,
}

/// Pagination over the full list ordered by `createdAt` ascending.
/// `offset` only takes effect together with `limit`; without a limit everything is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListOptions {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Apply this window to an already ordered list.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.limit {
            None => items,
            Some(limit) => items
                .into_iter()
                .skip(self.offset.unwrap_or(0))
                .take(limit)
                .collect(),
        }
    }
}

fn normalize_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

impl Todo {
    /// Build a new record from caller data. Generates a fresh ULID and sets both
    /// timestamps to the same instant.
    pub fn create(data: NewTodo) -> Result<Self, ValidationError> {
        let title = normalize_title(&data.title)?;
        let ts = issue_stamp();
        Ok(Self {
            id: Ulid::new().to_string(),
            title,
            description: data.description.unwrap_or_default(),
            done: data.done.unwrap_or(false),
            created_at: ts,
            updated_at: ts,
        })
    }

    /// Return a copy with the patch merged over this record. `id` and `created_at`
    /// are carried over unchanged and `updated_at` always moves forward.
    pub fn patched(&self, patch: TodoPatch) -> Result<Self, ValidationError> {
        let title = match patch.title {
            Some(t) => normalize_title(&t)?,
            None => self.title.clone(),
        };

        Ok(Self {
            id: self.id.clone(),
            title,
            description: patch
                .description
                .unwrap_or_else(|| self.description.clone()),
            done: patch.done.unwrap_or(self.done),
            created_at: self.created_at,
            updated_at: next_stamp(self.updated_at),
        })
    }
}

/// A timestamp strictly after `prev`, normally the current time.
fn next_stamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let ts = issue_stamp();
    if ts > prev {
        ts
    } else {
        prev + TimeDelta::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_id_and_matching_timestamps() {
        let todo = Todo::create(NewTodo::titled("Buy milk")).unwrap();

        assert!(!todo.id.is_empty());
        assert!(todo.id.parse::<Ulid>().is_ok());
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.description, "");
        assert!(!todo.done);
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[test]
    fn create_rejects_blank_title() {
        assert_eq!(
            Todo::create(NewTodo::titled("")).unwrap_err(),
            ValidationError::EmptyTitle
        );
        assert_eq!(
            Todo::create(NewTodo::titled("   \t\n")).unwrap_err(),
            ValidationError::EmptyTitle
        );
    }

    #[test]
    fn create_trims_title_and_keeps_optional_fields() {
        let todo = Todo::create(NewTodo {
            title: "  Write report ".to_string(),
            description: Some("quarterly".to_string()),
            done: Some(true),
        })
        .unwrap();

        assert_eq!(todo.title, "Write report");
        assert_eq!(todo.description, "quarterly");
        assert!(todo.done);
    }

    #[test]
    fn create_generates_distinct_ids() {
        let a = Todo::create(NewTodo::titled("A")).unwrap();
        let b = Todo::create(NewTodo::titled("B")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn back_to_back_creations_never_share_created_at() {
        let stamps: Vec<_> = (0..200)
            .map(|i| Todo::create(NewTodo::titled(format!("t{}", i))).unwrap().created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn timestamps_have_microsecond_precision() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn patched_preserves_unspecified_fields() {
        let todo = Todo::create(NewTodo {
            title: "Original".to_string(),
            description: Some("keep me".to_string()),
            done: None,
        })
        .unwrap();

        let updated = todo
            .patched(TodoPatch {
                done: Some(true),
                ..TodoPatch::default()
            })
            .unwrap();

        assert_eq!(updated.id, todo.id);
        assert_eq!(updated.title, "Original");
        assert_eq!(updated.description, "keep me");
        assert!(updated.done);
        assert_eq!(updated.created_at, todo.created_at);
        assert!(updated.updated_at > todo.updated_at);
    }

    #[test]
    fn patched_advances_updated_at_even_without_clock_movement() {
        let mut todo = Todo::create(NewTodo::titled("Clock")).unwrap();
        // Pretend the record was last touched in the future.
        todo.updated_at = now() + TimeDelta::seconds(60);

        let updated = todo.patched(TodoPatch::default()).unwrap();
        assert_eq!(
            updated.updated_at,
            todo.updated_at + TimeDelta::microseconds(1)
        );
    }

    #[test]
    fn patched_rejects_blank_title() {
        let todo = Todo::create(NewTodo::titled("Valid")).unwrap();
        let result = todo.patched(TodoPatch {
            title: Some("  ".to_string()),
            ..TodoPatch::default()
        });
        assert_eq!(result.unwrap_err(), ValidationError::EmptyTitle);
    }

    #[test]
    fn todo_serializes_with_camel_case_keys() {
        let todo = Todo::create(NewTodo::titled("Wire")).unwrap();
        let json = serde_json::to_value(&todo).unwrap();

        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("created_at").is_none());

        let back: Todo = serde_json::from_value(json).unwrap();
        assert_eq!(back, todo);
    }

    #[test]
    fn patch_ignores_immutable_fields_in_input() {
        let patch: TodoPatch =
            serde_json::from_str(r#"{"id":"other","createdAt":"2020-01-01T00:00:00Z","done":true}"#)
                .unwrap();
        assert_eq!(patch.done, Some(true));
        assert!(patch.title.is_none());
    }

    #[test]
    fn paginate_without_limit_returns_everything() {
        let items: Vec<u32> = (0..5).collect();
        let opts = ListOptions {
            limit: None,
            offset: Some(3),
        };
        assert_eq!(opts.paginate(items), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn paginate_slices_window() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(ListOptions::page(3, 2).paginate(items.clone()), vec![2, 3, 4]);
        assert_eq!(ListOptions::page(5, 8).paginate(items.clone()), vec![8, 9]);
        assert!(ListOptions::page(5, 20).paginate(items).is_empty());
    }
}
