//! On-disk table files.
//!
//! Each table directory holds newline-delimited JSON batch files under
//! `data/` (`part-<uuid>.json`, one JSON row-batch array per line) and an
//! Iceberg-style `metadata/metadata.json` describing the table.

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use ranger_core::{codes, RangerError, Result};

/// A row as stored on disk and on the wire.
pub type Row = Vec<serde_json::Value>;

/// Contents of a table's `metadata/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadataFile {
    pub format_version: u32,
    pub table_uuid: String,
    pub database: String,
    pub table: String,
    pub engine: String,
    #[serde(default)]
    pub engine_config: String,
    pub schema: serde_json::Value,
    pub created_at: String,
}

impl TableMetadataFile {
    pub fn new(
        database: &str,
        table: &str,
        engine: &str,
        engine_config: &str,
        schema_blob: &str,
    ) -> Result<Self> {
        let schema = serde_json::from_str(schema_blob).map_err(|e| {
            RangerError::new(codes::COMMON_INVALID_INPUT, "malformed schema blob").with_cause(e)
        })?;
        Ok(Self {
            format_version: 1,
            table_uuid: Uuid::new_v4().to_string(),
            database: database.to_string(),
            table: table.to_string(),
            engine: engine.to_string(),
            engine_config: engine_config.to_string(),
            schema,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            RangerError::new(codes::COMMON_INTERNAL, "failed to encode table metadata")
                .with_cause(e)
        })?;
        std::fs::write(path, json).map_err(|e| io_error(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            RangerError::new(
                codes::COMMON_INVALID_INPUT,
                format!("malformed table metadata at {}", path.display()),
            )
            .with_cause(e)
        })
    }
}

/// Write one row batch as a new `part-<uuid>.json` file.
///
/// Returns the file name and the encoded size in bytes.
pub fn write_batch(data_dir: &Path, rows: &[Row]) -> Result<(String, u64)> {
    std::fs::create_dir_all(data_dir).map_err(|e| io_error(data_dir, e))?;
    let file_name = format!("part-{}.json", Uuid::new_v4());
    let path = data_dir.join(&file_name);
    let mut encoded = serde_json::to_string(rows).map_err(|e| {
        RangerError::new(codes::COMMON_INTERNAL, "failed to encode row batch").with_cause(e)
    })?;
    encoded.push('\n');
    let size = encoded.len() as u64;
    std::fs::write(&path, encoded).map_err(|e| io_error(&path, e))?;
    Ok((file_name, size))
}

/// Read every batch line of one data file.
pub fn read_batches(path: &Path) -> Result<Vec<Vec<Row>>> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let mut batches = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let batch: Vec<Row> = serde_json::from_str(line).map_err(|e| {
            RangerError::new(
                codes::COMMON_INVALID_INPUT,
                format!("malformed row batch in {}", path.display()),
            )
            .with_context("batch_index", i)
            .with_cause(e)
        })?;
        batches.push(batch);
    }
    Ok(batches)
}

fn io_error(path: &Path, e: std::io::Error) -> RangerError {
    RangerError::new(
        codes::STORAGE_OPERATION_ERROR,
        format!("storage io failed for {}", path.display()),
    )
    .with_cause(e)
}
