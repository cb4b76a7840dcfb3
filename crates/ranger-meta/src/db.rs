//! Embedded SQLite handle.
//!
//! The registry database is serialized through one connection behind a
//! mutex; concurrent writers coordinate through transactions with foreign
//! key checks enabled. Transactions commit on success and roll back when
//! the closure returns an error.

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use ranger_core::{codes, RangerError, Result};

/// Shared handle to the metadata database.
#[derive(Clone)]
pub struct MetadataDb {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataDb {
    /// Open (or create) the on-disk registry database with foreign-key
    /// enforcement and WAL journaling.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RangerError::new(
                    codes::COMMON_INTERNAL,
                    format!("failed to create {}", parent.display()),
                )
                .with_cause(e)
            })?;
        }
        let conn = Connection::open(path).map_err(open_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_error)?;
        Self::configure(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(open_error)?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(open_error)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(open_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the connection for direct (read) statements.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        // SQLite rolls back a statement interrupted by a panic; the
        // connection behind a poisoned lock is still consistent.
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `f` inside a transaction; commit on `Ok`, roll back on `Err`.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(tx_error)?;
        let out = f(&tx)?;
        tx.commit().map_err(tx_error)?;
        Ok(out)
    }
}

fn open_error(e: rusqlite::Error) -> RangerError {
    RangerError::new(codes::COMMON_INTERNAL, "failed to open metadata database").with_cause(e)
}

fn tx_error(e: rusqlite::Error) -> RangerError {
    RangerError::new(
        codes::CREATE_TABLE_REGISTRY_TRANSACTION_ERROR,
        "metadata transaction failed",
    )
    .with_cause(e)
}
