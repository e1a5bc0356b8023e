// ABOUTME: Converts between the canonical Todo shape and each backend's native representation.
// ABOUTME: Handles lenient JSON file records, SQLite rows, timestamp text, and boolean coercion.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde_json::Value;
use thiserror::Error;
use todos_core::Todo;

/// Errors decoding a stored record back into a Todo.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid timestamp {value:?} in {field}: {source}")]
    Timestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Render a timestamp as fixed-width RFC 3339 text so lexical order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| CodecError::Timestamp {
            field,
            value: value.to_string(),
            source,
        })
}

/// Sort records into listing order: `created_at` ascending, ties broken by id.
pub fn sort_for_listing(todos: &mut [Todo]) {
    todos.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// JSON file representation

/// Serialize records for the JSON file. The caller passes them already in listing order.
pub fn encode_file(todos: &[Todo], pretty: bool) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(todos)?
    } else {
        serde_json::to_vec(todos)?
    };
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode the whole file. Returns None when the top level is not an array of records.
/// Individual entries that cannot be turned into a valid Todo are dropped.
pub fn decode_file(value: Value) -> Option<Vec<Todo>> {
    let Value::Array(entries) = value else {
        return None;
    };
    Some(entries.into_iter().filter_map(decode_file_record).collect())
}

/// Decode one record leniently: `done` may be a boolean or 0/1, a missing
/// description becomes empty, and a missing `updatedAt` falls back to `createdAt`.
pub fn decode_file_record(value: Value) -> Option<Todo> {
    let Value::Object(mut obj) = value else {
        tracing::debug!("dropping non-object entry from todo file");
        return None;
    };

    let id = match obj.remove("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        _ => {
            tracing::debug!("dropping todo record without a valid id");
            return None;
        }
    };

    let title = match obj.remove("title") {
        Some(Value::String(t)) if !t.trim().is_empty() => t,
        _ => {
            tracing::warn!(%id, "dropping todo record with missing or blank title");
            return None;
        }
    };

    let description = match obj.remove("description") {
        Some(Value::String(d)) => d,
        _ => String::new(),
    };

    let done = obj.remove("done").map(coerce_done).unwrap_or(false);

    let created_at = match obj.get("createdAt").and_then(Value::as_str) {
        Some(s) => match parse_timestamp("createdAt", s) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(%id, "dropping todo record: {}", e);
                return None;
            }
        },
        None => {
            tracing::warn!(%id, "dropping todo record without createdAt");
            return None;
        }
    };

    let updated_at = obj
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(|s| parse_timestamp("updatedAt", s).ok())
        .unwrap_or(created_at);

    Some(Todo {
        id,
        title,
        description,
        done,
        created_at,
        updated_at,
    })
}

fn coerce_done(value: Value) -> bool {
    match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.as_str(), "true" | "1"),
        _ => false,
    }
}

// SQLite representation

/// Column list matching the field order `TodoRow::from_row` expects.
pub const TODO_COLUMNS: &str = "id, title, description, done, created_at, updated_at";

/// A raw row from the `todos` table.
#[derive(Debug, Clone)]
pub struct TodoRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub done: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TodoRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            done: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn into_todo(self) -> Result<Todo, CodecError> {
        Ok(Todo {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            id: self.id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            done: self.done != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use todos_core::NewTodo;

    #[test]
    fn timestamp_text_is_fixed_width_and_round_trips() {
        let ts = todos_core::now();
        let text = format_timestamp(ts);

        assert!(text.ends_with('Z'));
        assert_eq!(text.len(), "2024-01-01T00:00:00.000000Z".len());
        assert_eq!(parse_timestamp("t", &text).unwrap(), ts);
    }

    #[test]
    fn parse_accepts_sqlite_default_format() {
        let ts = parse_timestamp("created_at", "2024-03-01T12:30:45.123Z").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = parse_timestamp("created_at", "yesterday").unwrap_err();
        assert!(err.to_string().contains("created_at"));
    }

    #[test]
    fn decode_file_rejects_non_array() {
        assert!(decode_file(json!({"todos": []})).is_none());
        assert!(decode_file(json!("text")).is_none());
        assert_eq!(decode_file(json!([])).unwrap().len(), 0);
    }

    #[test]
    fn decode_file_drops_records_without_id() {
        let value = json!([
            {"title": "no id", "createdAt": "2024-01-01T00:00:00Z"},
            {"id": "", "title": "empty id", "createdAt": "2024-01-01T00:00:00Z"},
            {"id": 7, "title": "numeric id", "createdAt": "2024-01-01T00:00:00Z"},
            {"id": "a1", "title": "kept", "createdAt": "2024-01-01T00:00:00Z"},
            "not an object"
        ]);

        let todos = decode_file(value).unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, "a1");
    }

    #[test]
    fn decode_file_record_applies_defaults() {
        let todo = decode_file_record(json!({
            "id": "x",
            "title": "Defaults",
            "done": 1,
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(todo.description, "");
        assert!(todo.done);
        assert_eq!(todo.updated_at, todo.created_at);
    }

    #[test]
    fn decode_file_record_drops_blank_title() {
        let todo = decode_file_record(json!({
            "id": "x",
            "title": "   ",
            "createdAt": "2024-01-01T00:00:00Z"
        }));
        assert!(todo.is_none());
    }

    #[test]
    fn coerce_done_handles_backend_shapes() {
        assert!(coerce_done(json!(true)));
        assert!(coerce_done(json!(1)));
        assert!(!coerce_done(json!(0)));
        assert!(!coerce_done(json!(null)));
        assert!(coerce_done(json!("true")));
    }

    #[test]
    fn encode_file_then_decode_preserves_records() {
        let mut todos = vec![
            Todo::create(NewTodo::titled("first")).unwrap(),
            Todo::create(NewTodo {
                title: "second".to_string(),
                description: Some("details".to_string()),
                done: Some(true),
            })
            .unwrap(),
        ];
        sort_for_listing(&mut todos);

        for pretty in [true, false] {
            let bytes = encode_file(&todos, pretty).unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(decode_file(value).unwrap(), todos);
        }
    }

    #[test]
    fn row_into_todo_coerces_done_and_description() {
        let row = TodoRow {
            id: "r1".to_string(),
            title: "Row".to_string(),
            description: None,
            done: 1,
            created_at: "2024-01-01T00:00:00.000001Z".to_string(),
            updated_at: "2024-01-02T00:00:00.000000Z".to_string(),
        };

        let todo = row.into_todo().unwrap();
        assert!(todo.done);
        assert_eq!(todo.description, "");
        assert!(todo.updated_at > todo.created_at);
    }

    #[test]
    fn sort_breaks_timestamp_ties_by_id() {
        let base = Todo::create(NewTodo::titled("tie")).unwrap();
        let mut b = base.clone();
        b.id = "b".to_string();
        let mut a = base.clone();
        a.id = "a".to_string();

        let mut todos = vec![b, a];
        sort_for_listing(&mut todos);
        assert_eq!(todos[0].id, "a");
        assert_eq!(todos[1].id, "b");
    }
}
