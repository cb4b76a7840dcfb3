//! Namespace and table identity.
//!
//! The catalog answers "which namespaces and tables exist" independently of
//! how table data is materialized. Identity is persisted in the registry;
//! the `default` namespace is implicitly present and is created on first
//! startup.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ranger_core::{codes, Component, RangerError, Result, DEFAULT_DATABASE};

use crate::registry::MetadataRegistry;

pub const COMPONENT_TAG: &str = "catalog";

/// Tracks namespace/table identity on top of the registry.
pub struct Catalog {
    registry: Arc<MetadataRegistry>,
}

impl Catalog {
    /// Create the catalog, seeding the `default` namespace when absent.
    pub fn new(registry: Arc<MetadataRegistry>) -> Result<Self> {
        let catalog = Self { registry };
        if !catalog.namespace_exists(DEFAULT_DATABASE)? {
            catalog.create_namespace(DEFAULT_DATABASE)?;
            info!("seeded default namespace");
        }
        Ok(catalog)
    }

    pub fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(self
            .registry
            .list_databases()?
            .into_iter()
            .map(|db| db.name)
            .collect())
    }

    pub fn namespace_exists(&self, name: &str) -> Result<bool> {
        self.registry.database_exists(name)
    }

    pub fn create_namespace(&self, name: &str) -> Result<i64> {
        if name.is_empty() {
            return Err(RangerError::new(
                codes::COMMON_INVALID_INPUT,
                "namespace name must not be empty",
            ));
        }
        let owner = self
            .registry
            .user_id("system")?
            .ok_or_else(|| RangerError::new(codes::COMMON_INTERNAL, "system user missing"))?;
        self.registry
            .with_tx(|tx| self.registry.create_database(tx, name, owner))
    }

    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        if name == DEFAULT_DATABASE {
            return Err(RangerError::new(
                codes::COMMON_FORBIDDEN,
                "the default namespace cannot be dropped",
            ));
        }
        let removed = self
            .registry
            .with_tx(|tx| self.registry.delete_database(tx, name))?;
        if !removed {
            return Err(RangerError::new(
                codes::COMMON_NOT_FOUND,
                format!("namespace {name:?} does not exist"),
            )
            .with_context("namespace", name));
        }
        Ok(())
    }

    pub fn table_exists(&self, namespace: &str, table: &str) -> Result<bool> {
        self.registry.table_exists(namespace, table)
    }

    pub fn list_tables(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .registry
            .list_tables(namespace)?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }
}

#[async_trait]
impl Component for Catalog {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
