//! JDBC-dialect protocol server.
//!
//! Length-prefixed JSON frames over TCP, no handshake. Consumes the shared
//! query engine and obeys the gateway connection budget.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ranger_core::{codes, RangerError, Result};
use ranger_engine::QueryEngine;

use crate::budget::ConnectionBudget;
use crate::protocol::{ProtocolServer, ProtocolStatus, ServerState};
use crate::wire;

pub struct JdbcServer {
    engine: Arc<QueryEngine>,
    budget: ConnectionBudget,
    addr: String,
    state: Arc<ServerState>,
    task: Mutex<Option<JoinHandle<()>>>,
    token: Mutex<Option<CancellationToken>>,
    bound_addr: Mutex<Option<String>>,
}

impl JdbcServer {
    pub fn new(engine: Arc<QueryEngine>, budget: ConnectionBudget, addr: String) -> Self {
        Self {
            engine,
            budget,
            addr,
            state: Arc::new(ServerState::default()),
            task: Mutex::new(None),
            token: Mutex::new(None),
            bound_addr: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProtocolServer for JdbcServer {
    fn name(&self) -> &'static str {
        "jdbc"
    }

    fn address(&self) -> String {
        self.bound_addr
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| self.addr.clone())
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            let err = RangerError::new(
                codes::GATEWAY_JDBC_SERVER_CREATION_FAILED,
                format!("failed to bind jdbc listener on {}", self.addr),
            )
            .with_cause(e);
            self.state.set_failed(err.to_string());
            err
        })?;
        if let Ok(local) = listener.local_addr() {
            *self.bound_addr.lock().unwrap_or_else(|p| p.into_inner()) = Some(local.to_string());
        }
        self.state.set_running();
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());
        let handle = tokio::spawn(wire::run_listener(
            "jdbc",
            listener,
            cancel,
            self.state.clone(),
            self.engine.clone(),
            self.budget.clone(),
            false,
        ));
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = self.token.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
        self.state.set_stopped();
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn status(&self) -> ProtocolStatus {
        self.state.status(&self.address())
    }
}
