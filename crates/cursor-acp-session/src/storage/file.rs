//! File-backed session storage.
//!
//! Each session lives in `{dir}/{id}.json`. Writes go to a temporary
//! sibling and are renamed into place, so a reader never sees a partial
//! record.

use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use cursor_acp_core::{Session, SessionId, SessionStorage, StorageError};
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";

/// Durable storage with one JSON file per session.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: SessionId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != RECORD_EXTENSION) {
                continue;
            }

            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::io(&path, e))?;

            match serde_json::from_str::<Session>(&content) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping malformed session record"
                    );
                }
            }
        }

        Ok(sessions)
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        let path = self.record_path(session.id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", session.id, Uuid::new_v4().simple()));
        let json = serde_json::to_vec_pretty(session)?;

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io(&path, e));
        }

        Ok(())
    }

    async fn remove(&self, id: SessionId) -> Result<(), StorageError> {
        let path = self.record_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }
}
