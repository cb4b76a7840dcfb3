//! Embedded analytic backend.
//!
//! Read-only statements are executed by DataFusion: a per-query session is
//! built, the effective database's tables are registered as in-memory
//! batches, and the original SQL text runs unchanged. Rows cross the seam
//! as JSON values; ints, floats, and booleans map to native Arrow types and
//! everything else is carried as strings.

use async_trait::async_trait;
use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    RecordBatch, StringArray,
};
use datafusion::arrow::datatypes::{DataType as ArrowType, Field, Schema};
use datafusion::arrow::util::display::array_value_to_string;
use datafusion::error::DataFusionError;
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use tracing::debug;

use ranger_core::{codes, DataType, RangerError, Result, TableSchema};
use ranger_storage::{Row, StorageManager};

/// Output of the analytic backend: ordered column names plus row tuples.
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// The data-plane seam. Implementations execute read-only SQL against one
/// database and return rows; they never mutate storage.
#[async_trait]
pub trait AnalyticBackend: Send + Sync {
    async fn execute(&self, database: &str, sql: &str) -> Result<QueryOutput>;
}

/// DataFusion-backed implementation.
pub struct DataFusionBackend {
    storage: Arc<StorageManager>,
}

impl DataFusionBackend {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AnalyticBackend for DataFusionBackend {
    async fn execute(&self, database: &str, sql: &str) -> Result<QueryOutput> {
        let ctx = SessionContext::new();
        for table in self.storage.list_tables(database)? {
            let schema = self.storage.get_ordered_schema(database, &table)?;
            let rows = self.storage.get_table_data(database, &table)?;
            let batch = rows_to_batch(&schema, &rows)?;
            ctx.register_batch(&table, batch).map_err(internal_error)?;
        }
        debug!(database, sql, "executing analytic query");

        let df = ctx.sql(sql).await.map_err(query_error)?;
        let columns: Vec<String> = df
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let batches = df.collect().await.map_err(query_error)?;

        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(batch_to_rows(batch)?);
        }
        Ok(QueryOutput { columns, rows })
    }
}

/// Derive a logical table schema from an Arrow schema (parquet imports).
pub fn table_schema_from_arrow(
    schema: &datafusion::arrow::datatypes::Schema,
) -> Result<TableSchema> {
    use ranger_core::ColumnSpec;

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let data_type = match field.data_type() {
            ArrowType::Boolean => DataType::Boolean,
            ArrowType::Int8 | ArrowType::Int16 | ArrowType::Int32 => DataType::Int32,
            ArrowType::Int64 => DataType::Int64,
            ArrowType::UInt8 | ArrowType::UInt16 | ArrowType::UInt32 => DataType::Int64,
            ArrowType::Float16 | ArrowType::Float32 => DataType::Float32,
            ArrowType::Float64 => DataType::Float64,
            ArrowType::Date32 | ArrowType::Date64 => DataType::Date,
            ArrowType::Timestamp(_, Some(_)) => DataType::TimestampTz,
            ArrowType::Timestamp(_, None) => DataType::Timestamp,
            ArrowType::Binary | ArrowType::LargeBinary => DataType::Binary,
            _ => DataType::String,
        };
        columns.push(ColumnSpec {
            name: field.name().clone(),
            data_type,
            nullable: field.is_nullable(),
            length: None,
            primary: false,
        });
    }
    Ok(TableSchema { columns })
}

fn query_error(e: DataFusionError) -> RangerError {
    match &e {
        DataFusionError::Plan(..) | DataFusionError::SchemaError(..) => {
            RangerError::new(codes::QUERY_VALIDATION_FAILED, e.to_string())
        }
        _ => internal_error(e),
    }
}

fn internal_error(e: DataFusionError) -> RangerError {
    RangerError::new(codes::COMMON_INTERNAL, "analytic backend failure").with_cause(e)
}

fn arrow_type(data_type: &DataType) -> ArrowType {
    match data_type {
        DataType::Boolean => ArrowType::Boolean,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float32 => ArrowType::Float32,
        DataType::Float64 => ArrowType::Float64,
        // Decimals, temporal values, uuids, binaries, and composites are
        // carried as strings across the JSON seam.
        _ => ArrowType::Utf8,
    }
}

/// Build one Arrow record batch from JSON rows in schema column order.
pub fn rows_to_batch(schema: &TableSchema, rows: &[Row]) -> Result<RecordBatch> {
    let fields: Vec<Field> = schema
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(&c.data_type), true))
        .collect();
    let arrow_schema = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.columns.len());
    for (i, column) in schema.columns.iter().enumerate() {
        let cells = rows.iter().map(|row| row.get(i));
        let array: ArrayRef = match arrow_type(&column.data_type) {
            ArrowType::Boolean => Arc::new(BooleanArray::from(
                cells.map(|v| v.and_then(json_bool)).collect::<Vec<_>>(),
            )),
            ArrowType::Int32 => Arc::new(Int32Array::from(
                cells
                    .map(|v| v.and_then(json_i64).map(|i| i as i32))
                    .collect::<Vec<_>>(),
            )),
            ArrowType::Int64 => Arc::new(Int64Array::from(
                cells.map(|v| v.and_then(json_i64)).collect::<Vec<_>>(),
            )),
            ArrowType::Float32 => Arc::new(Float32Array::from(
                cells
                    .map(|v| v.and_then(json_f64).map(|f| f as f32))
                    .collect::<Vec<_>>(),
            )),
            ArrowType::Float64 => Arc::new(Float64Array::from(
                cells.map(|v| v.and_then(json_f64)).collect::<Vec<_>>(),
            )),
            _ => Arc::new(StringArray::from(
                cells.map(|v| v.and_then(json_string)).collect::<Vec<_>>(),
            )),
        };
        arrays.push(array);
    }

    RecordBatch::try_new(arrow_schema, arrays).map_err(|e| {
        RangerError::new(codes::COMMON_INTERNAL, "failed to build record batch").with_cause(e)
    })
}

fn json_bool(v: &serde_json::Value) -> Option<bool> {
    v.as_bool()
}

fn json_i64(v: &serde_json::Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn json_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
}

fn json_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Convert one record batch back into JSON rows.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(batch.num_rows());
    for row_idx in 0..batch.num_rows() {
        let mut row = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            if column.is_null(row_idx) {
                row.push(serde_json::Value::Null);
                continue;
            }
            let value = match column.data_type() {
                ArrowType::Boolean => {
                    let array = column
                        .as_any()
                        .downcast_ref::<BooleanArray>()
                        .expect("boolean array");
                    serde_json::Value::Bool(array.value(row_idx))
                }
                ArrowType::Int32 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<Int32Array>()
                        .expect("int32 array");
                    serde_json::Value::from(array.value(row_idx))
                }
                ArrowType::Int64 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<Int64Array>()
                        .expect("int64 array");
                    serde_json::Value::from(array.value(row_idx))
                }
                ArrowType::Float32 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .expect("float32 array");
                    serde_json::Value::from(array.value(row_idx) as f64)
                }
                ArrowType::Float64 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<Float64Array>()
                        .expect("float64 array");
                    serde_json::Value::from(array.value(row_idx))
                }
                ArrowType::Utf8 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .expect("utf8 array");
                    serde_json::Value::String(array.value(row_idx).to_string())
                }
                _ => {
                    let rendered = array_value_to_string(column, row_idx).map_err(|e| {
                        RangerError::new(codes::COMMON_INTERNAL, "failed to render cell")
                            .with_cause(e)
                    })?;
                    serde_json::Value::String(rendered)
                }
            };
            row.push(value);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_core::ColumnSpec;

    fn schema() -> TableSchema {
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
                    name: "label".into(),
                    data_type: DataType::String,
                    nullable: true,
                    length: None,
                    primary: false,
                },
                ColumnSpec {
                    name: "score".into(),
                    data_type: DataType::Float64,
                    nullable: true,
                    length: None,
                    primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_rows_round_trip_through_arrow() {
        let rows: Vec<Row> = vec![
            vec![
                serde_json::json!(1),
                serde_json::json!("open"),
                serde_json::json!(0.5),
            ],
            vec![
                serde_json::json!(2),
                serde_json::Value::Null,
                serde_json::json!(1.25),
            ],
        ];
        let batch = rows_to_batch(&schema(), &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let restored = batch_to_rows(&batch).unwrap();
        assert_eq!(restored, rows);
    }

    #[test]
    fn test_empty_rows_build_empty_batch() {
        let batch = rows_to_batch(&schema(), &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 3);
    }
}
