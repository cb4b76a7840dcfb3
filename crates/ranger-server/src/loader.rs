//! Component loader.
//!
//! The loader owns the dependency order of the whole server: path manager,
//! metadata registry, catalog, storage manager, query engine, gateway.
//! Initialization runs in registration order; each init function may only
//! reach components that are already initialized. Shutdown walks the
//! recorded order in reverse, best-effort, and is idempotent at the loader
//! level.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ranger_core::{codes, Component, RangerError, Result};
use ranger_engine::QueryEngine;
use ranger_gateway::Gateway;
use ranger_meta::{Catalog, MetadataDb, MetadataRegistry, PathManager};
use ranger_storage::StorageManager;

use crate::config::ServerConfig;

/// Init function for an externally registered component.
pub type InitFn = Box<dyn Fn(&Loader) -> Result<Arc<dyn Component>> + Send + Sync>;

/// Brings the server's components up in dependency order and down in
/// reverse.
pub struct Loader {
    config: ServerConfig,
    components: HashMap<String, Arc<dyn Component>>,
    /// Tags in the order components initialized successfully.
    init_order: Vec<String>,
    extra_inits: Vec<(String, InitFn)>,
    cancel: CancellationToken,
    initialized: bool,
    shutdown_done: bool,

    paths: Option<Arc<PathManager>>,
    registry: Option<Arc<MetadataRegistry>>,
    catalog: Option<Arc<Catalog>>,
    storage: Option<Arc<StorageManager>>,
    engine: Option<Arc<QueryEngine>>,
    gateway: Option<Arc<Gateway>>,
}

impl Loader {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            components: HashMap::new(),
            init_order: Vec::new(),
            extra_inits: Vec::new(),
            cancel: CancellationToken::new(),
            initialized: false,
            shutdown_done: false,
            paths: None,
            registry: None,
            catalog: None,
            storage: None,
            engine: None,
            gateway: None,
        }
    }

    /// Append a component init function at the tail of the init order.
    /// Must be called before `initialize`.
    pub fn register_component(&mut self, tag: impl Into<String>, init: InitFn) -> Result<()> {
        if self.initialized {
            return Err(RangerError::new(
                codes::COMMON_CONFLICT,
                "components cannot be registered after initialization",
            ));
        }
        self.extra_inits.push((tag.into(), init));
        Ok(())
    }

    /// Initialize every component in registration order.
    ///
    /// On failure the error context carries the failing component's index
    /// and tag; already-initialized components are left standing — the
    /// caller decides whether to invoke `shutdown`.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(RangerError::new(
                codes::COMMON_CONFLICT,
                "loader is already initialized",
            ));
        }
        type Step = (&'static str, fn(&mut Loader) -> Result<Arc<dyn Component>>);
        let steps: Vec<Step> = vec![
            (ranger_meta::paths::COMPONENT_TAG, Self::init_paths),
            (ranger_meta::registry::COMPONENT_TAG, Self::init_registry),
            (ranger_meta::catalog::COMPONENT_TAG, Self::init_catalog),
            (ranger_storage::COMPONENT_TAG, Self::init_storage),
            (ranger_engine::COMPONENT_TAG, Self::init_engine),
            (ranger_gateway::COMPONENT_TAG, Self::init_gateway),
        ];

        for (index, (tag, init)) in steps.into_iter().enumerate() {
            self.run_init(index, tag.to_string(), |loader| init(loader))?;
        }

        let extras = std::mem::take(&mut self.extra_inits);
        let offset = self.init_order.len();
        for (index, (tag, init)) in extras.into_iter().enumerate() {
            self.run_init(offset + index, tag, |loader| init(loader))?;
        }
        self.initialized = true;
        info!(components = self.init_order.len(), "loader initialized");
        Ok(())
    }

    fn run_init(
        &mut self,
        index: usize,
        tag: String,
        init: impl FnOnce(&mut Loader) -> Result<Arc<dyn Component>>,
    ) -> Result<()> {
        match init(self) {
            Ok(component) => {
                self.components.insert(tag.clone(), component);
                self.init_order.push(tag);
                Ok(())
            }
            Err(e) => Err(RangerError::new(
                codes::LOADER_COMPONENT_INIT_FAILED,
                format!("component {tag:?} failed to initialize: {}", e.message()),
            )
            .with_context("component_index", index)
            .with_context("component", tag)
            .with_cause(e)),
        }
    }

    /// Start serving: brings the gateway up under the loader's context.
    pub async fn start(&self) -> Result<()> {
        let gateway = self.get_gateway()?;
        gateway.start(&self.cancel).await.map_err(|e| {
            RangerError::new(
                codes::LOADER_GATEWAY_START_FAILED,
                format!("gateway failed to start: {}", e.message()),
            )
            .with_cause(e)
        })
    }

    /// Shut every component down in reverse init order.
    ///
    /// Failures are logged and shutdown continues so downstream resources
    /// are still freed. A second call is a no-op.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.shutdown_done {
            return Ok(());
        }
        self.shutdown_done = true;
        self.cancel.cancel();

        for tag in self.init_order.iter().rev() {
            let Some(component) = self.components.get(tag) else {
                continue;
            };
            info!(component = tag.as_str(), "shutting down");
            if let Err(e) = component.shutdown(&self.cancel).await {
                error!(component = tag.as_str(), error = %e, "component shutdown failed");
            }
        }
        info!("loader shutdown complete");
        Ok(())
    }

    /// The loader's root cancellation token; every server context descends
    /// from it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn init_order(&self) -> &[String] {
        &self.init_order
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ---- typed accessors ------------------------------------------------

    pub fn get_path_manager(&self) -> Result<Arc<PathManager>> {
        self.paths.clone().ok_or_else(|| not_available("paths"))
    }

    pub fn get_registry(&self) -> Result<Arc<MetadataRegistry>> {
        self.registry.clone().ok_or_else(|| not_available("registry"))
    }

    pub fn get_catalog(&self) -> Result<Arc<Catalog>> {
        self.catalog.clone().ok_or_else(|| not_available("catalog"))
    }

    pub fn get_storage(&self) -> Result<Arc<StorageManager>> {
        self.storage.clone().ok_or_else(|| not_available("storage"))
    }

    pub fn get_engine(&self) -> Result<Arc<QueryEngine>> {
        self.engine.clone().ok_or_else(|| not_available("engine"))
    }

    pub fn get_gateway(&self) -> Result<Arc<Gateway>> {
        self.gateway.clone().ok_or_else(|| not_available("gateway"))
    }

    /// A component by tag, for externally registered components.
    pub fn get_component(&self, tag: &str) -> Result<Arc<dyn Component>> {
        self.components
            .get(tag)
            .cloned()
            .ok_or_else(|| not_available(tag))
    }

    // ---- built-in init steps --------------------------------------------

    fn init_paths(&mut self) -> Result<Arc<dyn Component>> {
        let paths = Arc::new(PathManager::new(self.config.data_dir.clone()));
        paths.ensure_layout()?;
        self.paths = Some(paths.clone());
        Ok(paths)
    }

    fn init_registry(&mut self) -> Result<Arc<dyn Component>> {
        let paths = self.get_path_manager()?;
        let db = MetadataDb::open(&paths.metadata_db_path())?;
        let registry = Arc::new(MetadataRegistry::open(db)?);
        self.registry = Some(registry.clone());
        Ok(registry)
    }

    fn init_catalog(&mut self) -> Result<Arc<dyn Component>> {
        let registry = self.get_registry()?;
        let catalog = Arc::new(Catalog::new(registry)?);
        self.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    fn init_storage(&mut self) -> Result<Arc<dyn Component>> {
        let storage = Arc::new(StorageManager::new(
            self.get_path_manager()?,
            self.get_catalog()?,
            self.get_registry()?,
        ));
        self.storage = Some(storage.clone());
        Ok(storage)
    }

    fn init_engine(&mut self) -> Result<Arc<dyn Component>> {
        let engine = Arc::new(QueryEngine::new(self.get_storage()?, self.get_registry()?));
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    fn init_gateway(&mut self) -> Result<Arc<dyn Component>> {
        let gateway = Arc::new(Gateway::new(
            self.get_engine()?,
            self.config.gateway_config(),
        ));
        self.gateway = Some(gateway.clone());
        Ok(gateway)
    }
}

fn not_available(tag: &str) -> RangerError {
    warn!(component = tag, "component requested before initialization");
    RangerError::new(
        codes::COMMON_NOT_FOUND,
        format!("component {tag:?} is not available"),
    )
    .with_context("component", tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_config(tmp: &tempfile::TempDir) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.data_dir = tmp.path().to_path_buf();
        // Port 0 keeps parallel test runs from colliding.
        config.http.address = "127.0.0.1:0".into();
        config.jdbc.address = "127.0.0.1:0".into();
        config.native.address = "127.0.0.1:0".into();
        config
    }

    struct TraceComponent {
        tag: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Component for TraceComponent {
        fn type_tag(&self) -> &'static str {
            self.tag
        }

        async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
            self.order.lock().unwrap().push(self.tag);
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_records_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut loader = Loader::new(test_config(&tmp));
        loader.initialize().unwrap();
        assert_eq!(
            loader.init_order(),
            &["paths", "registry", "catalog", "storage", "engine", "gateway"]
        );
        assert!(loader.get_engine().is_ok());
        assert!(loader.get_gateway().is_ok());
    }

    #[tokio::test]
    async fn test_accessors_before_init() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loader = Loader::new(test_config(&tmp));
        let err = loader.get_engine().unwrap_err();
        assert_eq!(err.code().as_str(), codes::COMMON_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registered_component_joins_shutdown_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let mut loader = Loader::new(test_config(&tmp));
        let order_clone = order.clone();
        let shutdowns_clone = shutdowns.clone();
        loader
            .register_component(
                "tracer",
                Box::new(move |_loader| {
                    Ok(Arc::new(TraceComponent {
                        tag: "tracer",
                        order: order_clone.clone(),
                        shutdowns: shutdowns_clone.clone(),
                    }) as Arc<dyn Component>)
                }),
            )
            .unwrap();
        loader.initialize().unwrap();
        assert_eq!(loader.init_order().last().map(String::as_str), Some("tracer"));

        loader.shutdown().await.unwrap();
        // Registered last, shut down first.
        assert_eq!(order.lock().unwrap().first(), Some(&"tracer"));

        // Idempotent: the second call does not shut anything down again.
        loader.shutdown().await.unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_init_failure_carries_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut loader = Loader::new(test_config(&tmp));
        loader
            .register_component(
                "boom",
                Box::new(|_loader| {
                    Err(RangerError::new(codes::COMMON_INTERNAL, "init exploded"))
                }),
            )
            .unwrap();
        let err = loader.initialize().unwrap_err();
        assert_eq!(err.code().as_str(), codes::LOADER_COMPONENT_INIT_FAILED);
        assert_eq!(
            err.context().get("component_index"),
            Some(&ranger_core::ContextValue::Int(6))
        );
        // Components before the failure stay standing.
        assert!(loader.get_engine().is_ok());
    }

    #[tokio::test]
    async fn test_register_after_initialize_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut loader = Loader::new(test_config(&tmp));
        loader.initialize().unwrap();
        let err = loader
            .register_component("late", Box::new(|_| unreachable!()))
            .unwrap_err();
        assert_eq!(err.code().as_str(), codes::COMMON_CONFLICT);
    }
}
