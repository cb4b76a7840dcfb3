//! # Ranger Storage - Table Data Materialization
//!
//! The storage manager materializes table data and schemas on top of the
//! path manager, catalog, and metadata registry. Table rows live in
//! newline-delimited JSON batch files tracked by the registry; each table
//! carries an Iceberg-style `metadata.json`.

pub mod files;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ranger_core::{codes, Component, RangerError, Result, TableSchema};
use ranger_meta::{Catalog, MetadataRegistry, PathManager};

pub use files::{Row, TableMetadataFile};

pub const COMPONENT_TAG: &str = "storage";

/// Materializes databases and tables on disk and in the registry.
pub struct StorageManager {
    paths: Arc<PathManager>,
    catalog: Arc<Catalog>,
    registry: Arc<MetadataRegistry>,
}

impl StorageManager {
    pub fn new(
        paths: Arc<PathManager>,
        catalog: Arc<Catalog>,
        registry: Arc<MetadataRegistry>,
    ) -> Self {
        Self {
            paths,
            catalog,
            registry,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn metadata_manager(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    // ---- databases ------------------------------------------------------

    pub fn create_database(&self, name: &str) -> Result<()> {
        self.catalog.create_namespace(name)?;
        std::fs::create_dir_all(self.paths.database_dir(name)).map_err(|e| {
            RangerError::new(
                codes::STORAGE_OPERATION_ERROR,
                format!("failed to create database directory for {name:?}"),
            )
            .with_cause(e)
        })?;
        info!(database = name, "created database");
        Ok(())
    }

    pub fn drop_database(&self, name: &str) -> Result<()> {
        self.catalog.drop_namespace(name)?;
        let dir = self.paths.database_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| {
                RangerError::new(
                    codes::STORAGE_OPERATION_ERROR,
                    format!("failed to remove database directory {}", dir.display()),
                )
                .with_cause(e)
            })?;
        }
        info!(database = name, "dropped database");
        Ok(())
    }

    pub fn database_exists(&self, name: &str) -> Result<bool> {
        self.catalog.namespace_exists(name)
    }

    pub fn list_databases(&self) -> Result<Vec<String>> {
        self.catalog.list_namespaces()
    }

    // ---- tables ---------------------------------------------------------

    /// Create a table from a serialized schema blob.
    ///
    /// Registers the table, its columns, metadata, and metadata file inside
    /// one registry transaction, then materializes the on-disk layout.
    pub fn create_table(
        &self,
        database: &str,
        name: &str,
        schema_blob: &str,
        engine: &str,
        engine_config: &str,
    ) -> Result<()> {
        let database_id = self
            .registry
            .database_id(database)?
            .ok_or_else(|| database_not_found(database))?;
        let schema = TableSchema::from_blob(schema_blob).map_err(|e| {
            RangerError::new(
                codes::CREATE_TABLE_PARSE_TYPE_VALIDATION,
                format!("invalid schema for table {name:?}: {}", e.message()),
            )
        })?;
        if schema.columns.is_empty() {
            return Err(RangerError::new(
                codes::CREATE_TABLE_PARSE_TYPE_VALIDATION,
                format!("table {name:?} must declare at least one column"),
            ));
        }

        self.registry.with_tx(|tx| {
            let table_id = self.registry.create_table(tx, database_id, name, "TABLE")?;
            self.registry.insert_columns(tx, table_id, &schema)?;
            self.registry
                .insert_table_metadata(tx, table_id, schema_blob, engine)?;
            self.registry.add_table_file(
                tx,
                table_id,
                "metadata/metadata.json",
                "metadata",
                "current",
            )?;
            // unpartitioned until a partition spec is declared
            self.registry.add_partition(tx, table_id, "[]")?;
            self.registry.record_statistics(tx, table_id, 0, 0)?;
            Ok(())
        })?;

        let metadata = TableMetadataFile::new(database, name, engine, engine_config, schema_blob)?;
        metadata.write(&self.paths.table_metadata_file(database, name))?;
        std::fs::create_dir_all(self.paths.table_data_dir(database, name)).map_err(|e| {
            RangerError::new(
                codes::CREATE_TABLE_STORAGE_OPERATION_ERROR,
                format!("failed to create data directory for {database}.{name}"),
            )
            .with_cause(e)
        })?;
        info!(database, table = name, engine, "created table");
        Ok(())
    }

    /// Drop a table. Returns whether it existed; a missing table is an
    /// error unless `if_exists` is set.
    pub fn drop_table(&self, database: &str, name: &str, if_exists: bool) -> Result<bool> {
        let table_id = match self.registry.table_id(database, name)? {
            Some(id) => id,
            None => {
                if if_exists {
                    return Ok(false);
                }
                return Err(RangerError::new(
                    codes::COMMON_NOT_FOUND,
                    format!("table {database}.{name} does not exist"),
                )
                .with_context("database", database)
                .with_context("table", name));
            }
        };
        self.registry
            .with_tx(|tx| self.registry.delete_table(tx, table_id))?;
        let dir = self.paths.table_dir(database, name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| {
                RangerError::new(
                    codes::STORAGE_OPERATION_ERROR,
                    format!("failed to remove table directory {}", dir.display()),
                )
                .with_cause(e)
            })?;
        }
        info!(database, table = name, "dropped table");
        Ok(true)
    }

    pub fn table_exists(&self, database: &str, name: &str) -> Result<bool> {
        self.registry.table_exists(database, name)
    }

    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.catalog.list_tables(database)
    }

    // ---- data -----------------------------------------------------------

    /// Append one batch of rows to a table. Returns the row count written.
    pub fn insert_data(&self, database: &str, table: &str, rows: &[Row]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table_id = self
            .registry
            .table_id(database, table)?
            .ok_or_else(|| table_not_found(database, table))?;
        let schema = self.get_ordered_schema(database, table)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.columns.len() {
                return Err(RangerError::new(
                    codes::COMMON_INVALID_INPUT,
                    format!(
                        "row has {} values, table {database}.{table} has {} columns",
                        row.len(),
                        schema.columns.len()
                    ),
                )
                .with_context("row_index", i));
            }
        }

        let data_dir = self.paths.table_data_dir(database, table);
        let (file_name, size) = files::write_batch(&data_dir, rows)?;
        self.registry.with_tx(|tx| {
            self.registry.add_table_file(
                tx,
                table_id,
                &format!("data/{file_name}"),
                "data",
                "current",
            )?;
            self.registry
                .record_statistics(tx, table_id, rows.len() as i64, size as i64)
        })?;
        Ok(rows.len())
    }

    /// Read every row of a table, in insertion order.
    pub fn get_table_data(&self, database: &str, table: &str) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for batch in self.get_table_batches(database, table)? {
            rows.extend(batch);
        }
        Ok(rows)
    }

    /// Read a table's row batches, in insertion order.
    pub fn get_table_batches(&self, database: &str, table: &str) -> Result<Vec<Vec<Row>>> {
        if !self.table_exists(database, table)? {
            return Err(table_not_found(database, table));
        }
        let table_dir = self.paths.table_dir(database, table);
        let mut batches = Vec::new();
        for file in self.registry.list_table_files(database, table)? {
            if file.file_type != "data" {
                continue;
            }
            batches.extend(files::read_batches(&table_dir.join(&file.path))?);
        }
        Ok(batches)
    }

    /// Absolute paths of a table's data files, in insertion order.
    pub fn data_file_paths(&self, database: &str, table: &str) -> Result<Vec<std::path::PathBuf>> {
        if !self.table_exists(database, table)? {
            return Err(table_not_found(database, table));
        }
        let table_dir = self.paths.table_dir(database, table);
        Ok(self
            .registry
            .list_table_files(database, table)?
            .into_iter()
            .filter(|f| f.file_type == "data")
            .map(|f| table_dir.join(f.path))
            .collect())
    }

    /// The serialized schema blob for a table.
    ///
    /// A registered table without a schema is a hard error; insert paths
    /// never fabricate synthetic column names.
    pub fn get_table_schema(&self, database: &str, table: &str) -> Result<String> {
        let metadata = self
            .registry
            .get_table_metadata(database, table)?
            .ok_or_else(|| {
                RangerError::new(
                    codes::COMMON_NOT_FOUND,
                    format!("no schema registered for {database}.{table}"),
                )
                .with_context("database", database)
                .with_context("table", table)
            })?;
        Ok(metadata.schema_blob)
    }

    /// The table schema with columns in declared order, joined from the
    /// registry's column rows.
    pub fn get_ordered_schema(&self, database: &str, table: &str) -> Result<TableSchema> {
        let blob = self.get_table_schema(database, table)?;
        let by_name = TableSchema::from_blob(&blob)?;
        let mut columns = Vec::new();
        for row in self.registry.get_columns(database, table)? {
            let mut spec = by_name
                .column(&row.column_name)
                .cloned()
                .ok_or_else(|| {
                    RangerError::new(
                        codes::COMMON_INTERNAL,
                        format!(
                            "column {:?} registered but missing from schema blob",
                            row.column_name
                        ),
                    )
                })?;
            spec.primary = row.is_primary;
            columns.push(spec);
        }
        Ok(TableSchema { columns })
    }
}

#[async_trait]
impl Component for StorageManager {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

fn database_not_found(database: &str) -> RangerError {
    RangerError::new(
        codes::STORAGE_DATABASE_NOT_FOUND,
        format!("database {database:?} does not exist"),
    )
    .with_context("database", database)
}

fn table_not_found(database: &str, table: &str) -> RangerError {
    RangerError::new(
        codes::STORAGE_TABLE_NOT_FOUND,
        format!("table {database}.{table} does not exist"),
    )
    .with_context("database", database)
    .with_context("table", table)
}
