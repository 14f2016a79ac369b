//! Tracing setup for the bridge binary.
//!
//! Logs go to stderr; stdout is reserved for the bridged protocol stream.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Disables all logging when set to `1` or `true`.
pub const SILENT_ENV: &str = "CURSOR_ACP_LOG_SILENT";

/// Level used when `RUST_LOG` is unset: `debug`, `info`, `warn` or `error`.
pub const LEVEL_ENV: &str = "CURSOR_ACP_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";

/// Pick the filter directive from the silent flag, `RUST_LOG` and the level variable.
#[must_use]
pub fn resolve_directive(
    silent: Option<&str>,
    rust_log: Option<&str>,
    level: Option<&str>,
) -> String {
    if matches!(silent, Some("1" | "true")) {
        return "off".to_string();
    }

    if let Some(rust_log) = rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        return rust_log.to_string();
    }

    match level.map(str::to_ascii_lowercase).as_deref() {
        Some(level @ ("debug" | "info" | "warn" | "error")) => level.to_string(),
        _ => DEFAULT_LEVEL.to_string(),
    }
}

/// Install the global subscriber.
pub fn init() {
    let directive = resolve_directive(
        std::env::var(SILENT_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
        std::env::var(LEVEL_ENV).ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
