//! Core abstractions for the cursor ACP bridge.
//!
//! This crate provides the shared building blocks:
//! - `Session` - Durable per-conversation state
//! - `NewSession` / `SessionUpdate` - Creation input and partial merges
//! - `SessionStorage` - Trait for durable backends

pub mod session;
pub mod traits;

pub use session::{NewSession, Session, SessionId, SessionUpdate};
pub use traits::{SessionStorage, StorageError};
