//! Local HTTP proxy for the cursor ACP bridge.
//!
//! Provides:
//! - `ProxyConfig` - Host, requested port and health path
//! - Port discovery (listening-socket enumeration, then bind)
//! - `ProxyServer` - Start/stop lifecycle for the single local listener

pub mod config;
pub mod error;
pub mod port;
pub mod router;
pub mod server;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use port::{PortScanner, SsPortScanner};
pub use server::ProxyServer;
