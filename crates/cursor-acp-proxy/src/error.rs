//! Proxy errors.

use thiserror::Error;

/// Proxy lifecycle error.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid proxy config: {0}")]
    InvalidConfig(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No available port in range {start}-{end}")]
    PortExhausted { start: u16, end: u16 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
