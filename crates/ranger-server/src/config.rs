//! Server configuration.
//!
//! A plain struct with defaults, optionally loaded from YAML and injected
//! through the loader. There are no mutable globals; tests construct their
//! own config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ranger_core::{codes, RangerError, Result};
use ranger_gateway::{
    GatewayConfig, DEFAULT_HTTP_ADDR, DEFAULT_JDBC_ADDR, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_NATIVE_ADDR,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub enabled: bool,
    pub address: String,
}

impl ProtocolConfig {
    fn new(address: &str) -> Self {
        Self {
            enabled: true,
            address: address.to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_ADDR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub http: ProtocolConfig,
    pub jdbc: ProtocolConfig,
    pub native: ProtocolConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ranger-data"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            http: ProtocolConfig::new(DEFAULT_HTTP_ADDR),
            jdbc: ProtocolConfig::new(DEFAULT_JDBC_ADDR),
            native: ProtocolConfig::new(DEFAULT_NATIVE_ADDR),
        }
    }
}

impl ServerConfig {
    /// Load from a YAML file; a malformed file fails fast.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RangerError::new(
                codes::COMMON_NOT_FOUND,
                format!("cannot read config file {}", path.display()),
            )
            .with_cause(e)
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            RangerError::new(
                codes::COMMON_INVALID_INPUT,
                format!("malformed config file {}", path.display()),
            )
            .with_cause(e)
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            http_enabled: self.http.enabled,
            jdbc_enabled: self.jdbc.enabled,
            native_enabled: self.native.enabled,
            http_addr: self.http.address.clone(),
            jdbc_addr: self.jdbc.address.clone(),
            native_addr: self.native.address.clone(),
            max_connections: self.max_connections,
        }
    }
}
