//! Per-request query context and result types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Immutable per-request record carried from the protocol decoder to the
/// query engine.
///
/// A context is never mutated; derived contexts are produced by copy. An
/// empty `database_name` means the engine substitutes the literal name
/// `default` when resolving identifiers.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub sql_text: String,
    pub database_name: String,
    pub user_id: String,
    pub client_address: String,
    pub deadline: Option<DateTime<Utc>>,
}

impl QueryContext {
    pub fn new(sql_text: impl Into<String>) -> Self {
        Self {
            sql_text: sql_text.into(),
            database_name: String::new(),
            user_id: String::new(),
            client_address: String::new(),
            deadline: None,
        }
    }

    /// Derive a context with a different database, leaving `self` untouched.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database_name: database.into(),
            ..self.clone()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_client_address(mut self, addr: impl Into<String>) -> Self {
        self.client_address = addr.into();
        self
    }
}

/// Result of a successfully executed query.
///
/// `row_count == rows.len()` holds at the moment the result is returned;
/// the constructor enforces it.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub message: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl QueryResult {
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            message: message.into(),
            duration,
        }
    }

    /// A result with no columns or rows, only a message.
    pub fn empty(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(Vec::new(), Vec::new(), message, duration)
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_matches_rows() {
        let result = QueryResult::new(
            vec!["Database".into()],
            vec![
                vec![serde_json::json!("default")],
                vec![serde_json::json!("analytics")],
            ],
            "",
            Duration::from_millis(3),
        );
        assert_eq!(result.row_count, result.rows.len());
        assert_eq!(result.columns.len(), result.rows[0].len());
    }

    #[test]
    fn test_with_database_copies() {
        let base = QueryContext::new("SELECT 1;").with_user("system");
        let derived = base.with_database("analytics");
        assert_eq!(base.database_name, "");
        assert_eq!(derived.database_name, "analytics");
        assert_eq!(derived.user_id, "system");
        assert_eq!(derived.sql_text, base.sql_text);
    }
}
