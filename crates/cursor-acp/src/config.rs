//! Bridge configuration file and command-line overrides.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use cursor_acp_proxy::ProxyConfig;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "cursor-acp";

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Local proxy settings.
    pub proxy: ProxyConfig,
    /// Where session records live. Defaults to the user data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_dir: Option<PathBuf>,
}

/// Values given on the command line; each one overrides the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub health_path: Option<String>,
    pub sessions_dir: Option<PathBuf>,
}

impl AppConfig {
    /// `{config_dir}/cursor-acp/config.json`, if the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    /// Load config from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config: {}", path.display()));
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.proxy.host = host;
        }
        if let Some(port) = overrides.port {
            self.proxy.port = port;
        }
        if let Some(path) = overrides.health_path {
            self.proxy.health_check_path = path;
        }
        if let Some(dir) = overrides.sessions_dir {
            self.sessions_dir = Some(dir);
        }
    }

    /// Resolved session directory.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(
                || PathBuf::from(".").join(format!(".{APP_DIR}")).join("sessions"),
                |dir| dir.join(APP_DIR).join("sessions"),
            )
        })
    }
}
