//! Typed CRUD over the normalized metadata tables.
//!
//! Mutating calls take an explicit transaction handle; the registry owns no
//! ambient transaction. Reads run as plain statements against the shared
//! connection and observe committed state only.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ranger_core::{codes, Component, RangerError, Result, TableSchema};

use crate::db::MetadataDb;
use crate::migrations::MigrationManager;
use crate::models::{ColumnRow, DatabaseRow, TableFileRow, TableMetadataRow, TableRow};

pub const COMPONENT_TAG: &str = "registry";

/// The metadata registry component.
#[derive(Clone)]
pub struct MetadataRegistry {
    db: MetadataDb,
}

impl MetadataRegistry {
    /// Open the registry, run pending migrations, and verify the schema.
    ///
    /// Migration or verification failure is fatal; the caller exits the
    /// process with a non-zero code.
    pub fn open(db: MetadataDb) -> Result<Self> {
        let manager = MigrationManager::new(db.clone());
        manager.migrate()?;
        manager.verify_schema()?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &MetadataDb {
        &self.db
    }

    /// Run `f` inside a registry transaction.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.db.with_tx(f)
    }

    // ---- users ----------------------------------------------------------

    pub fn user_id(&self, username: &str) -> Result<Option<i64>> {
        self.db
            .lock()
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()
            .map_err(read_error)
    }

    // ---- databases ------------------------------------------------------

    pub fn create_database(
        &self,
        tx: &Transaction<'_>,
        name: &str,
        owner_user_id: i64,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO databases (name, owner_user_id, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, owner_user_id, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| {
            constraint_or(
                e,
                codes::COMMON_ALREADY_EXISTS,
                format!("database {name:?} already exists"),
            )
        })?;
        Ok(tx.last_insert_rowid())
    }

    /// Delete a database row; descendant rows cascade. Returns whether a
    /// row was removed.
    pub fn delete_database(&self, tx: &Transaction<'_>, name: &str) -> Result<bool> {
        let n = tx
            .execute("DELETE FROM databases WHERE name = ?1", [name])
            .map_err(write_error)?;
        Ok(n > 0)
    }

    pub fn database_id(&self, name: &str) -> Result<Option<i64>> {
        self.db
            .lock()
            .query_row("SELECT id FROM databases WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()
            .map_err(read_error)
    }

    pub fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.database_id(name)?.is_some())
    }

    pub fn list_databases(&self) -> Result<Vec<DatabaseRow>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, owner_user_id, created_at FROM databases ORDER BY name",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DatabaseRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_user_id: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(read_error)?;
        rows.collect::<std::result::Result<_, _>>().map_err(read_error)
    }

    // ---- tables ---------------------------------------------------------

    pub fn create_table(
        &self,
        tx: &Transaction<'_>,
        database_id: i64,
        name: &str,
        table_type: &str,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO tables (database_id, name, table_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![database_id, name, table_type, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| {
            constraint_or(
                e,
                codes::CREATE_TABLE_REGISTRY_DUPLICATE_TABLE,
                format!("table {name:?} already exists"),
            )
        })?;
        Ok(tx.last_insert_rowid())
    }

    pub fn delete_table(&self, tx: &Transaction<'_>, table_id: i64) -> Result<bool> {
        let n = tx
            .execute("DELETE FROM tables WHERE id = ?1", [table_id])
            .map_err(write_error)?;
        Ok(n > 0)
    }

    pub fn table_id(&self, database: &str, table: &str) -> Result<Option<i64>> {
        self.db
            .lock()
            .query_row(
                "SELECT t.id FROM tables t
                 JOIN databases d ON d.id = t.database_id
                 WHERE d.name = ?1 AND t.name = ?2",
                [database, table],
                |row| row.get(0),
            )
            .optional()
            .map_err(read_error)
    }

    pub fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        Ok(self.table_id(database, table)?.is_some())
    }

    pub fn list_tables(&self, database: &str) -> Result<Vec<TableRow>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.database_id, t.name, t.table_type, t.created_at
                 FROM tables t
                 JOIN databases d ON d.id = t.database_id
                 WHERE d.name = ?1
                 ORDER BY t.name",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([database], |row| {
                Ok(TableRow {
                    id: row.get(0)?,
                    database_id: row.get(1)?,
                    name: row.get(2)?,
                    table_type: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(read_error)?;
        rows.collect::<std::result::Result<_, _>>().map_err(read_error)
    }

    /// Every table joined with its database name, for the system catalog.
    pub fn all_tables(&self) -> Result<Vec<(String, TableRow)>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT d.name, t.id, t.database_id, t.name, t.table_type, t.created_at
                 FROM tables t
                 JOIN databases d ON d.id = t.database_id
                 ORDER BY d.name, t.name",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    TableRow {
                        id: row.get(1)?,
                        database_id: row.get(2)?,
                        name: row.get(3)?,
                        table_type: row.get(4)?,
                        created_at: row.get(5)?,
                    },
                ))
            })
            .map_err(read_error)?;
        rows.collect::<std::result::Result<_, _>>().map_err(read_error)
    }

    // ---- columns --------------------------------------------------------

    /// Insert one row per schema column, preserving declaration order in
    /// `ordinal_position`.
    pub fn insert_columns(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        schema: &TableSchema,
    ) -> Result<()> {
        for (i, column) in schema.columns.iter().enumerate() {
            tx.execute(
                "INSERT INTO table_columns
                 (table_id, column_name, data_type, ordinal_position, is_nullable, is_primary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    table_id,
                    column.name,
                    column.data_type.to_string(),
                    (i + 1) as i64,
                    column.nullable,
                    column.primary,
                ],
            )
            .map_err(write_error)?;
        }
        Ok(())
    }

    pub fn get_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnRow>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.table_id, c.column_name, c.data_type,
                        c.ordinal_position, c.is_nullable, c.is_primary
                 FROM table_columns c
                 JOIN tables t ON t.id = c.table_id
                 JOIN databases d ON d.id = t.database_id
                 WHERE d.name = ?1 AND t.name = ?2
                 ORDER BY c.ordinal_position",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([database, table], |row| {
                Ok(ColumnRow {
                    id: row.get(0)?,
                    table_id: row.get(1)?,
                    column_name: row.get(2)?,
                    data_type: row.get(3)?,
                    ordinal_position: row.get(4)?,
                    is_nullable: row.get(5)?,
                    is_primary: row.get(6)?,
                })
            })
            .map_err(read_error)?;
        rows.collect::<std::result::Result<_, _>>().map_err(read_error)
    }

    // ---- table metadata and files ---------------------------------------

    pub fn insert_table_metadata(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        schema_blob: &str,
        engine_name: &str,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO table_metadata (table_id, schema_blob, engine_name) VALUES (?1, ?2, ?3)",
            rusqlite::params![table_id, schema_blob, engine_name],
        )
        .map_err(write_error)?;
        Ok(tx.last_insert_rowid())
    }

    pub fn get_table_metadata(&self, database: &str, table: &str) -> Result<Option<TableMetadataRow>> {
        self.db
            .lock()
            .query_row(
                "SELECT m.id, m.table_id, m.schema_blob, m.engine_name
                 FROM table_metadata m
                 JOIN tables t ON t.id = m.table_id
                 JOIN databases d ON d.id = t.database_id
                 WHERE d.name = ?1 AND t.name = ?2",
                [database, table],
                |row| {
                    Ok(TableMetadataRow {
                        id: row.get(0)?,
                        table_id: row.get(1)?,
                        schema_blob: row.get(2)?,
                        engine_name: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(read_error)
    }

    pub fn add_table_file(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        path: &str,
        file_type: &str,
        iceberg_metadata_state: &str,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO table_files (table_id, path, file_type, iceberg_metadata_state)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![table_id, path, file_type, iceberg_metadata_state],
        )
        .map_err(write_error)?;
        Ok(tx.last_insert_rowid())
    }

    pub fn list_table_files(&self, database: &str, table: &str) -> Result<Vec<TableFileRow>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare(
                "SELECT f.id, f.table_id, f.path, f.file_type, f.iceberg_metadata_state
                 FROM table_files f
                 JOIN tables t ON t.id = f.table_id
                 JOIN databases d ON d.id = t.database_id
                 WHERE d.name = ?1 AND t.name = ?2
                 ORDER BY f.id",
            )
            .map_err(read_error)?;
        let rows = stmt
            .query_map([database, table], |row| {
                Ok(TableFileRow {
                    id: row.get(0)?,
                    table_id: row.get(1)?,
                    path: row.get(2)?,
                    file_type: row.get(3)?,
                    iceberg_metadata_state: row.get(4)?,
                })
            })
            .map_err(read_error)?;
        rows.collect::<std::result::Result<_, _>>().map_err(read_error)
    }

    pub fn add_partition(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        spec_blob: &str,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO table_partitions (table_id, spec_blob) VALUES (?1, ?2)",
            rusqlite::params![table_id, spec_blob],
        )
        .map_err(write_error)?;
        Ok(tx.last_insert_rowid())
    }

    pub fn record_statistics(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        row_count: i64,
        total_size_bytes: i64,
    ) -> Result<()> {
        tx.execute(
            "INSERT INTO table_statistics (table_id, row_count, total_size_bytes, collected_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                table_id,
                row_count,
                total_size_bytes,
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .map_err(write_error)?;
        Ok(())
    }

    // ---- audit ----------------------------------------------------------

    pub fn log_access(&self, tx: &Transaction<'_>, user_id: Option<i64>, sql: &str) -> Result<()> {
        tx.execute(
            "INSERT INTO access_log (user_id, sql_text, timestamp) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, sql, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(write_error)?;
        Ok(())
    }

    /// Best-effort audit append outside any caller transaction.
    pub fn log_access_best_effort(&self, username: &str, sql: &str) {
        let result = self.user_id(username).and_then(|user_id| {
            self.with_tx(|tx| self.log_access(tx, user_id, sql))
        });
        if let Err(e) = result {
            warn!(error = %e, "failed to append access log entry");
        }
    }
}

#[async_trait]
impl Component for MetadataRegistry {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        // The connection closes when the last handle drops.
        Ok(())
    }
}

fn read_error(e: rusqlite::Error) -> RangerError {
    RangerError::new(codes::COMMON_INTERNAL, "metadata read failed").with_cause(e)
}

fn write_error(e: rusqlite::Error) -> RangerError {
    RangerError::new(codes::COMMON_INTERNAL, "metadata write failed").with_cause(e)
}

fn constraint_or(e: rusqlite::Error, code: &str, message: impl Into<String>) -> RangerError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RangerError::new(code, message).with_cause(e)
        }
        _ => write_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_core::{ColumnSpec, DataType};

    fn registry() -> MetadataRegistry {
        MetadataRegistry::open(MetadataDb::open_in_memory().unwrap()).unwrap()
    }

    fn sample_schema() -> TableSchema {
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
                    length: None,
                    primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_database_round_trip() {
        let registry = registry();
        let owner = registry.user_id("system").unwrap().unwrap();
        registry
            .with_tx(|tx| registry.create_database(tx, "analytics", owner))
            .unwrap();
        assert!(registry.database_exists("analytics").unwrap());
        assert_eq!(registry.list_databases().unwrap().len(), 1);

        let dup = registry.with_tx(|tx| registry.create_database(tx, "analytics", owner));
        assert_eq!(
            dup.unwrap_err().code().as_str(),
            codes::COMMON_ALREADY_EXISTS
        );
    }

    #[test]
    fn test_duplicate_table_uses_create_table_code() {
        let registry = registry();
        let owner = registry.user_id("system").unwrap().unwrap();
        let db_id = registry
            .with_tx(|tx| registry.create_database(tx, "analytics", owner))
            .unwrap();
        registry
            .with_tx(|tx| registry.create_table(tx, db_id, "events", "TABLE"))
            .unwrap();
        let dup = registry.with_tx(|tx| registry.create_table(tx, db_id, "events", "TABLE"));
        assert_eq!(
            dup.unwrap_err().code().as_str(),
            codes::CREATE_TABLE_REGISTRY_DUPLICATE_TABLE
        );
    }

    #[test]
    fn test_database_delete_cascades() {
        let registry = registry();
        let owner = registry.user_id("system").unwrap().unwrap();
        registry
            .with_tx(|tx| {
                let db_id = registry.create_database(tx, "analytics", owner)?;
                let table_id = registry.create_table(tx, db_id, "events", "TABLE")?;
                registry.insert_columns(tx, table_id, &sample_schema())?;
                registry.insert_table_metadata(tx, table_id, "{}", "ICEBERG")?;
                registry.add_table_file(tx, table_id, "data/part-1.json", "data", "current")?;
                registry.add_partition(tx, table_id, "[]")?;
                Ok(())
            })
            .unwrap();

        registry
            .with_tx(|tx| registry.delete_database(tx, "analytics"))
            .unwrap();

        assert!(!registry.table_exists("analytics", "events").unwrap());
        for table in ["table_columns", "table_files", "table_partitions"] {
            let orphans: i64 = registry
                .db()
                .lock()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(orphans, 0, "{table} rows survived the cascade");
        }
    }

    #[test]
    fn test_columns_preserve_order() {
        let registry = registry();
        let owner = registry.user_id("system").unwrap().unwrap();
        registry
            .with_tx(|tx| {
                let db_id = registry.create_database(tx, "d", owner)?;
                let table_id = registry.create_table(tx, db_id, "t", "TABLE")?;
                registry.insert_columns(tx, table_id, &sample_schema())
            })
            .unwrap();
        let columns = registry.get_columns("d", "t").unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column_name, "id");
        assert!(columns[0].is_primary);
        assert_eq!(columns[1].column_name, "name");
        assert_eq!(columns[1].ordinal_position, 2);
    }

    #[test]
    fn test_access_log_survives_unknown_user() {
        let registry = registry();
        registry.log_access_best_effort("ghost-user", "SELECT 1;");
        let count: i64 = registry
            .db()
            .lock()
            .query_row("SELECT COUNT(*) FROM access_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
