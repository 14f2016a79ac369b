//! Proxy configuration.

use serde::{Deserialize, Serialize};

use crate::ProxyError;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default health-check route.
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/health";

/// Configuration for the local proxy listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Host to bind and advertise.
    pub host: String,
    /// Requested port. `0` means discover one automatically.
    pub port: u16,
    /// Path answering `GET` with `{"ok": true}`.
    pub health_check_path: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            health_check_path: DEFAULT_HEALTH_CHECK_PATH.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Default config with an explicit port.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// The explicitly requested port, if any.
    #[must_use]
    pub const fn requested_port(&self) -> Option<u16> {
        if self.port == 0 { None } else { Some(self.port) }
    }

    /// Check the config can be served.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an empty host or a health path that is
    /// not a plain absolute route.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.host.trim().is_empty() {
            return Err(ProxyError::InvalidConfig("host must not be empty".to_string()));
        }

        let path = &self.health_check_path;
        if !path.starts_with('/') {
            return Err(ProxyError::InvalidConfig(format!(
                "health check path must start with '/': {path}"
            )));
        }
        if path.contains(['{', '}', ':', '*']) {
            return Err(ProxyError::InvalidConfig(format!(
                "health check path must not contain route parameters: {path}"
            )));
        }

        Ok(())
    }
}
