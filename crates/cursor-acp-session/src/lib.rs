//! Session store for the cursor ACP bridge.
//!
//! Provides:
//! - `SessionManager` - Write-through session index over a durable backend
//! - Storage implementations (memory, file)

pub mod manager;
pub mod storage;

pub use manager::{ManagerError, SessionManager};
