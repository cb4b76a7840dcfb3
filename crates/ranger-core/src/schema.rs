//! Table schema representation and its JSON blob form.
//!
//! The registry stores one `schema_blob` per table: a JSON object mapping
//! each column name to `{data_type, nullable, length?}`. Serialization and
//! deserialization round-trip; deserialization genuinely parses the blob
//! (column order is owned by the registry's `ordinal_position`, not the
//! blob).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codes;
use crate::error::RangerError;
use crate::types::DataType;
use crate::Result;

/// A column of a table schema, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Declared length for character/binary columns, when present.
    pub length: Option<u32>,
    pub primary: bool,
}

/// An ordered table schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

#[derive(Serialize, Deserialize)]
struct ColumnBlob {
    data_type: String,
    nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u32>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Serialize to the registry's JSON blob form.
    pub fn to_blob(&self) -> Result<String> {
        let map: BTreeMap<&str, ColumnBlob> = self
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.as_str(),
                    ColumnBlob {
                        data_type: c.data_type.to_string(),
                        nullable: c.nullable,
                        length: c.length,
                    },
                )
            })
            .collect();
        serde_json::to_string(&map).map_err(|e| {
            RangerError::new(codes::COMMON_INTERNAL, "failed to serialize table schema")
                .with_cause(e)
        })
    }

    /// Parse a JSON schema blob back into a schema.
    ///
    /// Columns come back sorted by name; callers needing declaration order
    /// join against the registry's `table_columns.ordinal_position`.
    pub fn from_blob(blob: &str) -> Result<Self> {
        let map: BTreeMap<String, ColumnBlob> = serde_json::from_str(blob).map_err(|e| {
            RangerError::new(codes::COMMON_INVALID_INPUT, "malformed table schema blob")
                .with_cause(e)
        })?;
        let mut columns = Vec::with_capacity(map.len());
        for (name, col) in map {
            columns.push(ColumnSpec {
                name,
                data_type: DataType::parse(&col.data_type)?,
                nullable: col.nullable,
                length: col.length,
                primary: false,
            });
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableSchema {
        TableSchema {
            columns: vec![
                ColumnSpec {
                    name: "id".into(),
                    data_type: DataType::Int64,
                    nullable: false,
                    length: None,
                    primary: true,
                },
                ColumnSpec {
                    name: "name".into(),
                    data_type: DataType::String,
                    nullable: true,
                    length: Some(255),
                    primary: false,
                },
                ColumnSpec {
                    name: "score".into(),
                    data_type: DataType::Decimal {
                        precision: 10,
                        scale: 2,
                    },
                    nullable: true,
                    length: None,
                    primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_blob_round_trip() {
        let schema = sample();
        let blob = schema.to_blob().unwrap();
        let parsed = TableSchema::from_blob(&blob).unwrap();

        assert_eq!(parsed.columns.len(), schema.columns.len());
        for original in &schema.columns {
            let restored = parsed.column(&original.name).expect("column survives");
            assert_eq!(restored.data_type, original.data_type);
            assert_eq!(restored.nullable, original.nullable);
            assert_eq!(restored.length, original.length);
        }
    }

    #[test]
    fn test_from_blob_rejects_garbage() {
        assert!(TableSchema::from_blob("not json").is_err());
        assert!(TableSchema::from_blob(r#"{"id": {"data_type": "wat", "nullable": true}}"#).is_err());
    }
}
