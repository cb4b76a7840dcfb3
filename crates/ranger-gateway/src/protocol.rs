//! Protocol server seam.
//!
//! Protocol servers are interchangeable from the gateway's viewpoint; they
//! differ only in on-wire encoding. The started/stopped flag sits behind a
//! reader-writer lock: status reads take the read lock, start/stop take the
//! write lock.

use async_trait::async_trait;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

use ranger_core::Result;

/// Point-in-time status of one protocol server.
#[derive(Debug, Clone)]
pub struct ProtocolStatus {
    pub address: String,
    pub running: bool,
    pub last_error: Option<String>,
}

/// One wire protocol hosted by the gateway.
#[async_trait]
pub trait ProtocolServer: Send + Sync {
    fn name(&self) -> &'static str;

    fn address(&self) -> String;

    /// Bind and begin serving. The accept loop observes `cancel`.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Stop serving and wait for the accept loop to return.
    async fn stop(&self);

    fn status(&self) -> ProtocolStatus;
}

/// Shared started/stopped flag used by the concrete servers.
#[derive(Debug, Default)]
pub struct ServerState {
    inner: RwLock<ServerStateInner>,
}

#[derive(Debug, Default)]
struct ServerStateInner {
    running: bool,
    last_error: Option<String>,
}

impl ServerState {
    pub fn set_running(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.running = true;
        inner.last_error = None;
    }

    pub fn set_stopped(&self) {
        self.inner.write().unwrap_or_else(|p| p.into_inner()).running = false;
    }

    pub fn set_failed(&self, error: String) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.running = false;
        inner.last_error = Some(error);
    }

    pub fn is_running(&self) -> bool {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).running
    }

    pub fn status(&self, address: &str) -> ProtocolStatus {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        ProtocolStatus {
            address: address.to_string(),
            running: inner.running,
            last_error: inner.last_error.clone(),
        }
    }
}
