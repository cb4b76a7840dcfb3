//! Transactional schema migrations.
//!
//! Migrations are a hard-coded, totally ordered list. All pending
//! migrations run inside a single transaction, ascending, with one
//! bookkeeping row per applied migration inserted in the same transaction.
//! Any failure rolls the whole batch back; the caller treats that as fatal
//! (partial application would leave the server inconsistent). After
//! migration the expected table set is verified against `sqlite_master`.

use rusqlite::Transaction;
use tracing::{error, info};

use ranger_core::{codes, RangerError, Result};

use crate::db::MetadataDb;

/// Table names migration 001 must leave behind, in creation order.
pub const EXPECTED_TABLES: &[&str] = &[
    "users",
    "databases",
    "tables",
    "table_metadata",
    "table_files",
    "table_partitions",
    "table_columns",
    "table_indexes",
    "table_constraints",
    "table_statistics",
    "access_log",
    "schema_versions",
];

/// One versioned, exactly-once DDL change.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub up: fn(&Transaction<'_>) -> Result<()>,
}

/// The known migration list, ascending by version.
pub fn known_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "production_schema_v1",
        description: "initial production schema",
        up: migration_001,
    }]
}

/// Applies pending migrations and verifies the resulting schema.
pub struct MigrationManager {
    db: MetadataDb,
    migrations: Vec<Migration>,
}

impl MigrationManager {
    pub fn new(db: MetadataDb) -> Self {
        Self {
            db,
            migrations: known_migrations(),
        }
    }

    /// Manager with an explicit migration list (tests inject failing ones).
    pub fn with_migrations(db: MetadataDb, migrations: Vec<Migration>) -> Self {
        Self { db, migrations }
    }

    /// Highest applied migration version, 0 when none have been applied.
    pub fn current_version(&self) -> Result<i64> {
        self.ensure_bookkeeping()?;
        let conn = self.db.lock();
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM bun_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(migration_error)
    }

    /// Apply every pending migration inside one transaction.
    ///
    /// A failure here is fatal to the server; the caller exits non-zero.
    pub fn migrate(&self) -> Result<()> {
        self.ensure_bookkeeping()?;
        let current = self.current_version()?;
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > current)
            .collect();
        if pending.is_empty() {
            info!(version = current, "metadata schema up to date");
            return Ok(());
        }

        let result = self.db.with_tx(|tx| {
            for migration in &pending {
                info!(
                    version = migration.version,
                    name = migration.name,
                    "applying migration"
                );
                (migration.up)(tx).map_err(|e| {
                    RangerError::new(
                        codes::REGISTRY_BUN_MIGRATION_FAILED,
                        format!(
                            "migration {} ({}) failed: {}",
                            migration.version,
                            migration.name,
                            e.message()
                        ),
                    )
                    .with_context("version", migration.version)
                })?;
                tx.execute(
                    "INSERT INTO bun_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        migration.version,
                        migration.name,
                        chrono::Utc::now().to_rfc3339()
                    ],
                )
                .map_err(migration_error)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                info!(
                    applied = pending.len(),
                    version = pending.last().map(|m| m.version).unwrap_or(current),
                    "migrations committed"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "migration batch rolled back");
                Err(e)
            }
        }
    }

    /// Confirm every expected table exists. Absence is fatal.
    pub fn verify_schema(&self) -> Result<()> {
        let conn = self.db.lock();
        for table in EXPECTED_TABLES {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .map_err(migration_error)?;
            if !exists {
                return Err(RangerError::new(
                    codes::REGISTRY_BUN_SCHEMA_VERIFICATION_FAILED,
                    format!("expected table {table:?} is missing after migration"),
                )
                .with_context("table", *table));
            }
        }
        Ok(())
    }

    fn ensure_bookkeeping(&self) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bun_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(migration_error)?;
        Ok(())
    }
}

fn migration_error(e: rusqlite::Error) -> RangerError {
    RangerError::new(codes::REGISTRY_BUN_MIGRATION_FAILED, "migration bookkeeping failed")
        .with_cause(e)
}

/// Initial production schema: normalized tables, inline foreign keys,
/// secondary indexes after all tables, seed rows via INSERT OR IGNORE.
/// Idempotent under IF NOT EXISTS semantics.
fn migration_001(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            display_name TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS databases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            owner_user_id INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            database_id INTEGER NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            table_type TEXT NOT NULL DEFAULT 'TABLE',
            created_at TEXT NOT NULL,
            UNIQUE (database_id, name)
        );

        CREATE TABLE IF NOT EXISTS table_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            schema_blob TEXT NOT NULL,
            engine_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS table_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            file_type TEXT NOT NULL,
            iceberg_metadata_state TEXT NOT NULL DEFAULT 'current'
        );

        CREATE TABLE IF NOT EXISTS table_partitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            spec_blob TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS table_columns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            column_name TEXT NOT NULL,
            data_type TEXT NOT NULL,
            ordinal_position INTEGER NOT NULL,
            is_nullable INTEGER NOT NULL DEFAULT 1,
            is_primary INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS table_indexes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            index_name TEXT NOT NULL,
            column_names TEXT NOT NULL,
            is_unique INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS table_constraints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            constraint_name TEXT NOT NULL,
            constraint_type TEXT NOT NULL,
            definition TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS table_statistics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
            row_count INTEGER NOT NULL DEFAULT 0,
            total_size_bytes INTEGER NOT NULL DEFAULT 0,
            collected_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS access_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            sql_text TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            applied_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tables_database_id ON tables(database_id);
        CREATE INDEX IF NOT EXISTS idx_table_columns_table_id ON table_columns(table_id);
        CREATE INDEX IF NOT EXISTS idx_table_files_table_id ON table_files(table_id);
        CREATE INDEX IF NOT EXISTS idx_access_log_user_id ON access_log(user_id);
        CREATE INDEX IF NOT EXISTS idx_access_log_timestamp ON access_log(timestamp);",
    )
    .map_err(|e| {
        RangerError::new(codes::REGISTRY_BUN_MIGRATION_FAILED, "schema DDL failed").with_cause(e)
    })?;

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT OR IGNORE INTO users (username, email, display_name, is_active, created_at, updated_at)
         VALUES ('system', 'system@localhost', 'System', 1, ?1, ?1)",
        [&now],
    )
    .map_err(migration_error)?;
    tx.execute(
        "INSERT OR IGNORE INTO schema_versions (version, name, description, applied_at)
         VALUES (1, 'production_schema_v1', 'initial production schema', ?1)",
        [&now],
    )
    .map_err(migration_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_migration(tx: &Transaction<'_>) -> Result<()> {
        tx.execute("CREATE TABLE half_done (id INTEGER PRIMARY KEY)", [])
            .map_err(migration_error)?;
        Err(RangerError::new(
            codes::REGISTRY_BUN_MIGRATION_FAILED,
            "corrupted migration",
        ))
    }

    #[test]
    fn test_migrate_from_empty() {
        let db = MetadataDb::open_in_memory().unwrap();
        let manager = MigrationManager::new(db.clone());
        assert_eq!(manager.current_version().unwrap(), 0);
        manager.migrate().unwrap();
        assert_eq!(manager.current_version().unwrap(), 1);
        manager.verify_schema().unwrap();

        // system user seeded
        let user: String = db
            .lock()
            .query_row("SELECT username FROM users WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(user, "system");
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = MetadataDb::open_in_memory().unwrap();
        let manager = MigrationManager::new(db);
        manager.migrate().unwrap();
        manager.migrate().unwrap();
        assert_eq!(manager.current_version().unwrap(), 1);
    }

    #[test]
    fn test_failed_batch_rolls_back_entirely() {
        let db = MetadataDb::open_in_memory().unwrap();
        MigrationManager::new(db.clone()).migrate().unwrap();

        let mut migrations = known_migrations();
        migrations.push(Migration {
            version: 2,
            name: "corrupted",
            description: "fails mid-way",
            up: failing_migration,
        });
        let manager = MigrationManager::with_migrations(db.clone(), migrations);
        assert!(manager.migrate().is_err());

        // version unchanged, no partial DDL survives
        assert_eq!(manager.current_version().unwrap(), 1);
        let exists: bool = db
            .lock()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'half_done')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_verify_schema_detects_missing_table() {
        let db = MetadataDb::open_in_memory().unwrap();
        let manager = MigrationManager::new(db.clone());
        manager.migrate().unwrap();
        db.lock().execute("DROP TABLE table_statistics", []).unwrap();
        let err = manager.verify_schema().unwrap_err();
        assert_eq!(
            err.code().as_str(),
            codes::REGISTRY_BUN_SCHEMA_VERIFICATION_FAILED
        );
    }
}
