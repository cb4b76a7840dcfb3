//! Client configuration discovery.
//!
//! Looked up in order: `./ranger-client.yml`,
//! `$HOME/.ranger/ranger-client.yml`, `/etc/ranger/ranger-client.yml`.
//! A missing file yields defaults; a malformed file fails fast.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ranger_core::{codes, RangerError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
    pub timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 2849,
            timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub name: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            name: "default".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SslSection {
    pub mode: String,
    pub cert_file: String,
    pub key_file: String,
}

impl Default for SslSection {
    fn default() -> Self {
        Self {
            mode: "disable".into(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "plain".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub database: DatabaseSection,
    pub ssl: SslSection,
    pub logging: LoggingSection,
}

impl ClientConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server.address, self.server.port)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./ranger-client.yml")];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(".ranger").join("ranger-client.yml"));
        }
        paths.push(PathBuf::from("/etc/ranger/ranger-client.yml"));
        paths
    }

    /// Discover and load the first config file that exists.
    pub fn discover() -> Result<Self> {
        for path in Self::candidate_paths() {
            if path.is_file() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RangerError::new(
                codes::CLIENT_CONFIG_NOT_FOUND,
                format!("cannot read {}", path.display()),
            )
            .with_cause(e)
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            RangerError::new(
                codes::CLIENT_CONFIG_INVALID,
                format!("malformed client config {}", path.display()),
            )
            .with_cause(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:2849");
        assert_eq!(config.database.name, "default");
        assert_eq!(config.ssl.mode, "disable");
    }

    #[test]
    fn test_partial_yaml_overlays_defaults() {
        let config: ClientConfig =
            serde_yaml::from_str("server:\n  port: 9000\nauth:\n  username: ana\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.auth.username, "ana");
    }
}
