//! Storage seam for session persistence.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{Session, SessionId};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Wrap an I/O error with the path it happened on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Trait for durable session backends.
///
/// Each session is stored under its own key so that writes to different
/// sessions never touch the same record.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load every persisted session.
    async fn load_all(&self) -> Result<Vec<Session>, StorageError>;

    /// Insert or overwrite the record for `session.id`.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove the record for `id`. Removing an absent record succeeds.
    async fn remove(&self, id: SessionId) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: SessionStorage + ?Sized> SessionStorage for std::sync::Arc<T> {
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        (**self).load_all().await
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        (**self).save(session).await
    }

    async fn remove(&self, id: SessionId) -> Result<(), StorageError> {
        (**self).remove(id).await
    }
}
