//! Client configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use xspd_core::XspdError;

/// Connection and polling settings for one detector client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Control-service host, with or without a scheme.
    pub host: String,
    /// Control-service port.
    pub port: u16,
    /// Target device: a device id, a single-digit index, or unset for the
    /// first advertised device.
    pub device_id: Option<String>,
    /// Status poll interval in seconds. Values below 0.5 are raised to
    /// 0.5 by the monitor loop.
    pub status_interval_s: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            device_id: None,
            status_interval_s: 1.0,
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, XspdError> {
        toml::from_str(text).map_err(|e| XspdError::Config(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, XspdError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| XspdError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
