//! System catalog: `system.databases`, `system.tables`, `system.columns`.
//!
//! Served straight from the registry, bypassing the analytic backend.
//! Filtering supports `column = 'literal'` on recognized columns only.

use std::sync::Arc;

use ranger_core::{codes, RangerError, Result};
use ranger_meta::MetadataRegistry;
use ranger_storage::Row;

use crate::statement::SystemTable;

const DATABASES_COLUMNS: &[&str] = &["id", "name", "owner_user_id", "created_at"];
const TABLES_COLUMNS: &[&str] = &["id", "database", "name", "table_type", "created_at"];
const COLUMNS_COLUMNS: &[&str] = &[
    "database",
    "table_name",
    "column_name",
    "data_type",
    "ordinal_position",
    "is_nullable",
    "is_primary",
];

/// Execute a system-catalog select.
pub fn execute(
    registry: &Arc<MetadataRegistry>,
    table: SystemTable,
    filter: Option<(String, String)>,
) -> Result<(Vec<String>, Vec<Row>)> {
    let (columns, rows) = match table {
        SystemTable::Databases => (DATABASES_COLUMNS, databases(registry)?),
        SystemTable::Tables => (TABLES_COLUMNS, tables(registry)?),
        SystemTable::Columns => (COLUMNS_COLUMNS, columns_rows(registry)?),
    };

    let rows = match filter {
        None => rows,
        Some((column, value)) => {
            let idx = columns.iter().position(|c| *c == column).ok_or_else(|| {
                RangerError::new(
                    codes::QUERY_VALIDATION_FAILED,
                    format!("unknown filter column {column:?} for system table"),
                )
                .with_context("column", column.as_str())
            })?;
            rows.into_iter()
                .filter(|row| match &row[idx] {
                    serde_json::Value::String(s) => *s == value,
                    other => other.to_string() == value,
                })
                .collect()
        }
    };

    Ok((columns.iter().map(|c| c.to_string()).collect(), rows))
}

fn databases(registry: &Arc<MetadataRegistry>) -> Result<Vec<Row>> {
    Ok(registry
        .list_databases()?
        .into_iter()
        .map(|db| {
            vec![
                serde_json::json!(db.id),
                serde_json::json!(db.name),
                serde_json::json!(db.owner_user_id),
                serde_json::json!(db.created_at),
            ]
        })
        .collect())
}

fn tables(registry: &Arc<MetadataRegistry>) -> Result<Vec<Row>> {
    Ok(registry
        .all_tables()?
        .into_iter()
        .map(|(database, t)| {
            vec![
                serde_json::json!(t.id),
                serde_json::json!(database),
                serde_json::json!(t.name),
                serde_json::json!(t.table_type),
                serde_json::json!(t.created_at),
            ]
        })
        .collect())
}

fn columns_rows(registry: &Arc<MetadataRegistry>) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for (database, table) in registry.all_tables()? {
        for column in registry.get_columns(&database, &table.name)? {
            rows.push(vec![
                serde_json::json!(database),
                serde_json::json!(table.name),
                serde_json::json!(column.column_name),
                serde_json::json!(column.data_type),
                serde_json::json!(column.ordinal_position),
                serde_json::json!(column.is_nullable),
                serde_json::json!(column.is_primary),
            ]);
        }
    }
    Ok(rows)
}
