//! Canonical filesystem layout.
//!
//! Every on-disk location is derived from one base directory:
//!
//! ```text
//! <base>/metadata/ranger.db          internal metadata registry
//! <base>/data/<db>/                  per-database directory
//! <base>/data/<db>/<table>/data/     row-batch data files
//! <base>/data/<db>/<table>/metadata/ table metadata (metadata.json)
//! ```
//!
//! Callers resolve paths only through this component; nothing else joins
//! path segments.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use ranger_core::{codes, Component, RangerError, Result};

pub const COMPONENT_TAG: &str = "paths";

/// Derives canonical paths from the configured base directory.
#[derive(Debug, Clone)]
pub struct PathManager {
    base: PathBuf,
}

impl PathManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn data_root(&self) -> PathBuf {
        self.base.join("data")
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.base.join("metadata").join("ranger.db")
    }

    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.data_root().join(database)
    }

    pub fn table_dir(&self, database: &str, table: &str) -> PathBuf {
        self.database_dir(database).join(table)
    }

    pub fn table_data_dir(&self, database: &str, table: &str) -> PathBuf {
        self.table_dir(database, table).join("data")
    }

    pub fn table_metadata_dir(&self, database: &str, table: &str) -> PathBuf {
        self.table_dir(database, table).join("metadata")
    }

    pub fn table_metadata_file(&self, database: &str, table: &str) -> PathBuf {
        self.table_metadata_dir(database, table).join("metadata.json")
    }

    /// Create the base layout (data root and metadata directory).
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.data_root(), self.base.join("metadata")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                RangerError::new(
                    codes::COMMON_INTERNAL,
                    format!("failed to create directory {}", dir.display()),
                )
                .with_cause(e)
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Component for PathManager {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_derived_from_base() {
        let paths = PathManager::new("/srv/ranger");
        assert_eq!(
            paths.metadata_db_path(),
            PathBuf::from("/srv/ranger/metadata/ranger.db")
        );
        assert_eq!(
            paths.table_data_dir("analytics", "events"),
            PathBuf::from("/srv/ranger/data/analytics/events/data")
        );
        assert_eq!(
            paths.table_metadata_file("analytics", "events"),
            PathBuf::from("/srv/ranger/data/analytics/events/metadata/metadata.json")
        );
    }

    #[test]
    fn test_ensure_layout_creates_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathManager::new(tmp.path());
        paths.ensure_layout().unwrap();
        assert!(paths.data_root().is_dir());
        assert!(paths.metadata_db_path().parent().unwrap().is_dir());
    }
}
