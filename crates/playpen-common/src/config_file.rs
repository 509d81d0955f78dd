//! Configuration file structures for playpen.
//!
//! This module defines structures for the TOML configuration file:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP host settings
//! - [`StorageConfig`]: Where pens and settings are kept
//! - [`RemoteConfig`]: Bundle store credentials and timeouts

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PipelineConfig, SandboxConfig};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [sandbox.engine]
/// epoch_interruption = true
///
/// [sandbox.execution]
/// max_fuel = 10_000_000
/// timeout_ms = 2000
///
/// [pipeline]
/// throttle_ms = 500
/// share_base_url = "https://play.example.dev/"
///
/// [storage]
/// dir = "./.playpen"
///
/// [remote]
/// admin_token = "your-secret-token"
///
/// [server]
/// bind_addr = "127.0.0.1:8080"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Preview sandbox configuration.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Pipeline controller configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bundle store configuration.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// HTTP host configuration.
    #[serde(default)]
    pub server: ServerConfigFile,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// HTTP host configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Bind address (e.g., "127.0.0.1:8080").
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory for file-backed storage.
    ///
    /// When unset, pens and settings live in memory for the process lifetime.
    #[serde(default)]
    pub dir: Option<String>,
}

/// Bundle store configuration.
///
/// The remote origin itself is a user setting
/// ([`crate::Settings::remote_runtime_origin`]); this section only holds
/// operator-level values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Token sent in the `X-Admin-Token` header on upload.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Upload request timeout in seconds.
    #[serde(default = "defaults::upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            admin_token: None,
            upload_timeout_secs: defaults::upload_timeout_secs(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn bind_addr() -> String {
        "127.0.0.1:8080".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub const fn upload_timeout_secs() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.server.graceful_shutdown);
        assert!(config.storage.dir.is_none());
        assert!(config.remote.admin_token.is_none());
        assert_eq!(config.pipeline.throttle_ms, 500);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            bind_addr = "0.0.0.0:3000"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        // Defaults applied
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.pipeline.allow_storage);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [sandbox.engine]
            epoch_interruption = true
            epoch_tick_ms = 5

            [sandbox.execution]
            max_fuel = 5_000_000
            timeout_ms = 50

            [pipeline]
            throttle_ms = 250
            share_base_url = "https://play.example.dev/"
            allow_url_pen = false
            allow_storage = false

            [storage]
            dir = "/tmp/playpen"

            [remote]
            admin_token = "secret-token"
            upload_timeout_secs = 5

            [server]
            bind_addr = "0.0.0.0:9000"
            request_timeout_secs = 60
            graceful_shutdown = false
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(config.sandbox.engine.epoch_interruption);
        assert_eq!(config.sandbox.engine.epoch_tick_ms, 5);
        assert_eq!(config.sandbox.execution.max_fuel, 5_000_000);
        assert_eq!(config.pipeline.throttle_ms, 250);
        assert_eq!(config.pipeline.share_base_url, "https://play.example.dev/");
        assert!(!config.pipeline.allow_url_pen);
        assert!(!config.pipeline.allow_storage);
        assert_eq!(config.storage.dir.as_deref(), Some("/tmp/playpen"));
        assert_eq!(config.remote.admin_token.as_deref(), Some("secret-token"));
        assert_eq!(config.remote.upload_timeout_secs, 5);
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert!(!config.server.graceful_shutdown);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }
}
