//! # Ranger Gateway - Multi-Protocol Fan-Out
//!
//! One gateway hosts the HTTP, JDBC-dialect, and native protocol servers,
//! all sharing a single query engine and one global connection budget.
//! Startup degrades rather than aborts: a port conflict on one protocol
//! must not kill the others. Only when every enabled protocol fails to
//! start does the gateway give up.

pub mod budget;
pub mod http;
pub mod jdbc;
pub mod native;
pub mod protocol;
pub mod wire;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ranger_core::{codes, Component, RangerError, Result};
use ranger_engine::QueryEngine;

pub use budget::{ConnectionBudget, ConnectionGuard, ConnectionStats};
pub use protocol::{ProtocolServer, ProtocolStatus};

pub const COMPONENT_TAG: &str = "gateway";

/// Compile-time listener defaults.
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:2849";
pub const DEFAULT_JDBC_ADDR: &str = "127.0.0.1:2850";
pub const DEFAULT_NATIVE_ADDR: &str = "127.0.0.1:2851";
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Which protocols run and where they listen.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_enabled: bool,
    pub jdbc_enabled: bool,
    pub native_enabled: bool,
    pub http_addr: String,
    pub jdbc_addr: String,
    pub native_addr: String,
    pub max_connections: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_enabled: true,
            jdbc_enabled: true,
            native_enabled: true,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            jdbc_addr: DEFAULT_JDBC_ADDR.to_string(),
            native_addr: DEFAULT_NATIVE_ADDR.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Point-in-time gateway status.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub started: bool,
    pub servers: BTreeMap<String, ProtocolStatus>,
}

/// The multi-protocol gateway component.
pub struct Gateway {
    servers: Vec<Arc<dyn ProtocolServer>>,
    budget: ConnectionBudget,
    started: RwLock<bool>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Gateway {
    /// Build the gateway with the three standard protocol servers.
    pub fn new(engine: Arc<QueryEngine>, config: GatewayConfig) -> Self {
        let budget = ConnectionBudget::new(config.max_connections);
        let mut servers: Vec<Arc<dyn ProtocolServer>> = Vec::new();
        if config.http_enabled {
            servers.push(Arc::new(http::HttpServer::new(
                engine.clone(),
                budget.clone(),
                config.http_addr.clone(),
            )));
        }
        if config.jdbc_enabled {
            servers.push(Arc::new(jdbc::JdbcServer::new(
                engine.clone(),
                budget.clone(),
                config.jdbc_addr.clone(),
            )));
        }
        if config.native_enabled {
            servers.push(Arc::new(native::NativeServer::new(
                engine,
                budget.clone(),
                config.native_addr.clone(),
            )));
        }
        Self::with_servers(servers, budget)
    }

    /// Build from explicit protocol servers (tests inject stubs here).
    pub fn with_servers(
        servers: Vec<Arc<dyn ProtocolServer>>,
        budget: ConnectionBudget,
    ) -> Self {
        Self {
            servers,
            budget,
            started: RwLock::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Start every enabled protocol, recording successes and failures
    /// independently.
    ///
    /// Zero enabled protocols start the gateway vacuously. If every enabled
    /// protocol fails, the gateway context is cancelled and a fatal error
    /// returned; partial failure starts the gateway with a warning.
    pub async fn start(&self, parent: &CancellationToken) -> Result<()> {
        {
            let started = self.started.read().unwrap_or_else(|p| p.into_inner());
            if *started {
                return Err(RangerError::new(
                    codes::GATEWAY_ALREADY_STARTED,
                    "gateway is already started",
                ));
            }
        }
        let cancel = parent.child_token();
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());

        let mut started_count = 0usize;
        let total = self.servers.len();
        for server in &self.servers {
            match server.start(cancel.clone()).await {
                Ok(()) => {
                    info!(protocol = server.name(), address = %server.address(), "protocol server started");
                    started_count += 1;
                }
                Err(e) => {
                    error!(protocol = server.name(), error = %e, "protocol server failed to start");
                }
            }
        }

        if total > 0 && started_count == 0 {
            cancel.cancel();
            return Err(RangerError::new(
                codes::GATEWAY_ALL_SERVERS_FAILED_TO_START,
                "all enabled protocol servers failed to start",
            )
            .with_context("enabled", total));
        }
        if started_count < total {
            warn!(
                started = started_count,
                enabled = total,
                "gateway started degraded"
            );
        }
        *self.started.write().unwrap_or_else(|p| p.into_inner()) = true;
        Ok(())
    }

    /// Cancel the gateway context and stop all protocol servers
    /// concurrently, waiting for each to return.
    pub async fn stop(&self) {
        if let Some(cancel) = self
            .cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            cancel.cancel();
        }
        join_all(self.servers.iter().map(|s| s.stop())).await;
        *self.started.write().unwrap_or_else(|p| p.into_inner()) = false;
        info!("gateway stopped");
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            started: *self.started.read().unwrap_or_else(|p| p.into_inner()),
            servers: self
                .servers
                .iter()
                .map(|s| (s.name().to_string(), s.status()))
                .collect(),
        }
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.budget.stats()
    }
}

#[async_trait]
impl Component for Gateway {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        self.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ProtocolStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubServer {
        name: &'static str,
        fail_start: bool,
        running: AtomicBool,
    }

    impl StubServer {
        fn new(name: &'static str, fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_start,
                running: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ProtocolServer for StubServer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn address(&self) -> String {
            "stub".into()
        }

        async fn start(&self, _cancel: CancellationToken) -> Result<()> {
            if self.fail_start {
                return Err(RangerError::new(
                    codes::GATEWAY_HTTP_SERVER_CREATION_FAILED,
                    "stub bind failure",
                ));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn status(&self) -> ProtocolStatus {
            ProtocolStatus {
                address: "stub".into(),
                running: self.running.load(Ordering::SeqCst),
                last_error: if self.fail_start {
                    Some("stub bind failure".into())
                } else {
                    None
                },
            }
        }
    }

    fn gateway(servers: Vec<Arc<dyn ProtocolServer>>) -> Gateway {
        Gateway::with_servers(servers, ConnectionBudget::new(4))
    }

    #[tokio::test]
    async fn test_zero_protocols_start_vacuously() {
        let gw = gateway(vec![]);
        gw.start(&CancellationToken::new()).await.unwrap();
        assert!(gw.status().started);
    }

    #[tokio::test]
    async fn test_degraded_startup() {
        let gw = gateway(vec![
            StubServer::new("http", true),
            StubServer::new("jdbc", false),
        ]);
        gw.start(&CancellationToken::new()).await.unwrap();

        let status = gw.status();
        assert!(status.started);
        assert!(!status.servers["http"].running);
        assert!(status.servers["http"].last_error.is_some());
        assert!(status.servers["jdbc"].running);
    }

    #[tokio::test]
    async fn test_all_failed_is_fatal() {
        let gw = gateway(vec![
            StubServer::new("http", true),
            StubServer::new("jdbc", true),
        ]);
        let err = gw.start(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err.code().as_str(),
            codes::GATEWAY_ALL_SERVERS_FAILED_TO_START
        );
        assert!(!gw.status().started);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let gw = gateway(vec![StubServer::new("jdbc", false)]);
        gw.start(&CancellationToken::new()).await.unwrap();
        let err = gw.start(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code().as_str(), codes::GATEWAY_ALREADY_STARTED);
    }

    #[tokio::test]
    async fn test_stop_halts_all_servers() {
        let gw = gateway(vec![
            StubServer::new("jdbc", false),
            StubServer::new("native", false),
        ]);
        gw.start(&CancellationToken::new()).await.unwrap();
        gw.stop().await;
        let status = gw.status();
        assert!(!status.started);
        assert!(status.servers.values().all(|s| !s.running));
    }
}
