//! Session manager: a write-through index over durable session storage.
//!
//! Reads are served from memory. Every mutation runs inside a per-session
//! critical section that persists the new record first and only then
//! updates the in-memory index, so mutations to one session reach storage
//! in the order callers issued them while different sessions never wait
//! on each other.
//!
//! Cancellation is a flag, not an interrupt. The bridge layer is expected
//! to poll [`SessionManager::is_cancelled`] at points where it is safe to
//! abandon work against the native agent.

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use cursor_acp_core::{NewSession, Session, SessionId, SessionStorage, SessionUpdate, StorageError};
use tokio::sync::{Mutex, RwLock};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

/// Session manager for the bridge layer.
///
/// Construct one per process and share it by reference or `Arc`. Call
/// [`initialize`](Self::initialize) before trusting any lookup.
pub struct SessionManager<S>
where
    S: SessionStorage,
{
    storage: S,
    sessions: RwLock<HashMap<SessionId, Session>>,
    locks: std::sync::Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
    initialized: AtomicBool,
}

impl<S> SessionManager<S>
where
    S: SessionStorage,
{
    /// Create a new session manager over `storage`.
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            sessions: RwLock::new(HashMap::new()),
            locks: std::sync::Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Load every persisted session into memory, replacing the current index.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be read. The manager is
    /// then not considered initialized.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        let loaded = match self.storage.load_all().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.initialized.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let index: HashMap<SessionId, Session> =
            loaded.into_iter().map(|s| (s.id, s)).collect();
        let count = index.len();
        *self.sessions.write().await = index;
        self.initialized.store(true, Ordering::Release);

        tracing::info!(count, "Loaded sessions");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed successfully.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Create and persist a new session.
    ///
    /// # Errors
    /// Returns error if the record cannot be persisted.
    pub async fn create_session(&self, fields: NewSession) -> Result<Session, ManagerError> {
        let session = Session::new(fields);

        self.storage.save(&session).await?;
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        tracing::debug!(session_id = %session.id, cwd = ?session.cwd, "Session created");
        Ok(session)
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// All sessions, newest first.
    pub async fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Merge `update` into an existing session and persist it.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist, or a storage error.
    pub async fn update_session(
        &self,
        id: SessionId,
        update: SessionUpdate,
    ) -> Result<Session, ManagerError> {
        let session = self
            .mutate(id, |session| {
                session.apply(update);
                true
            })
            .await?;

        tracing::debug!(session_id = %id, mode_id = ?session.mode_id, "Session updated");
        Ok(session)
    }

    /// Remove a session from storage and memory. Absent sessions are ignored.
    ///
    /// # Errors
    /// Returns error if the record cannot be removed from storage.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), ManagerError> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_locked(id).await
        };
        self.release_lock(id, lock);
        result?;

        tracing::debug!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Flag a session as cancelled. Already-cancelled sessions are left as is.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist, or a storage error.
    pub async fn mark_cancelled(&self, id: SessionId) -> Result<(), ManagerError> {
        self.mutate(id, |session| {
            if session.cancelled {
                return false;
            }
            session.cancelled = true;
            session.touch();
            true
        })
        .await?;

        tracing::debug!(session_id = %id, "Session cancelled");
        Ok(())
    }

    /// Whether the session is flagged cancelled. Unknown sessions report `false`.
    pub async fn is_cancelled(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.cancelled)
    }

    /// Record the native agent conversation this session can resume.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not exist, or a storage error.
    pub async fn set_resume_id(
        &self,
        id: SessionId,
        resume_id: impl Into<String>,
    ) -> Result<(), ManagerError> {
        let update = SessionUpdate::resume_id(resume_id);
        self.mutate(id, |session| {
            session.apply(update);
            true
        })
        .await?;
        Ok(())
    }

    /// Whether the session exists and has a non-empty resume token.
    pub async fn can_resume(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .await
            .get(&id)
            .is_some_and(Session::has_resume_id)
    }

    /// Run `f` against a copy of the session under its lock; if it reports a
    /// change, persist the copy and then publish it to the index.
    async fn mutate<F>(&self, id: SessionId, f: F) -> Result<Session, ManagerError>
    where
        F: FnOnce(&mut Session) -> bool,
    {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(id, f).await
        };
        self.release_lock(id, lock);
        result
    }

    async fn mutate_locked<F>(&self, id: SessionId, f: F) -> Result<Session, ManagerError>
    where
        F: FnOnce(&mut Session) -> bool,
    {
        let mut session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ManagerError::NotFound(id))?;

        if f(&mut session) {
            self.storage.save(&session).await?;
            self.sessions.write().await.insert(id, session.clone());
        }

        Ok(session)
    }

    async fn remove_locked(&self, id: SessionId) -> Result<(), ManagerError> {
        self.storage.remove(id).await?;
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    fn lock_for(&self, id: SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drop our handle on `id`'s lock and forget the entry if nobody else holds it.
    ///
    /// Handles are only cloned under the `locks` mutex, so the count checked
    /// here cannot grow underneath us.
    fn release_lock(&self, id: SessionId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2)
        {
            locks.remove(&id);
        }
    }
}

#[cfg(all(test, feature = "memory", feature = "file"))]
mod tests {
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    async fn memory_manager() -> SessionManager<Arc<MemoryStorage>> {
        let manager = SessionManager::new(Arc::new(MemoryStorage::new()));
        manager.initialize().await.unwrap();
        manager
    }

    /// Storage that fails every operation.
    struct BrokenStorage;

    #[async_trait]
    impl SessionStorage for BrokenStorage {
        async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
            Err(StorageError::Internal("disk on fire".to_string()))
        }

        async fn save(&self, _session: &Session) -> Result<(), StorageError> {
            Err(StorageError::Internal("disk on fire".to_string()))
        }

        async fn remove(&self, _id: SessionId) -> Result<(), StorageError> {
            Err(StorageError::Internal("disk on fire".to_string()))
        }
    }

    /// Memory storage whose `save` parks for one chosen session until released.
    #[derive(Default)]
    struct GatedStorage {
        inner: MemoryStorage,
        gated: std::sync::Mutex<Option<SessionId>>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SessionStorage for GatedStorage {
        async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
            self.inner.load_all().await
        }

        async fn save(&self, session: &Session) -> Result<(), StorageError> {
            let gated = *self.gated.lock().unwrap();
            if gated == Some(session.id) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.save(session).await
        }

        async fn remove(&self, id: SessionId) -> Result<(), StorageError> {
            self.inner.remove(id).await
        }
    }

    fn lock_entries<S: SessionStorage>(manager: &SessionManager<S>) -> usize {
        manager.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_create_session_with_unique_id() {
        let manager = memory_manager().await;
        let a = manager.create_session(NewSession::with_cwd("/tmp")).await.unwrap();
        let b = manager.create_session(NewSession::with_cwd("/tmp")).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_get_matches_created_fields() {
        let manager = memory_manager().await;
        for fields in [
            NewSession::default(),
            NewSession::with_cwd("/tmp"),
            NewSession::default().mode("plan"),
            NewSession::with_cwd("/work").mode("ask"),
        ] {
            let created = manager.create_session(fields.clone()).await.unwrap();
            let loaded = manager.get_session(created.id).await.unwrap();

            assert_eq!(loaded.cwd, fields.cwd);
            assert_eq!(loaded.mode_id, fields.mode_id);
            assert_eq!(loaded.resume_id, None);
            assert!(!loaded.cancelled);
        }
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let tmp = tempfile::tempdir().unwrap();

        let first = SessionManager::new(FileStorage::new(tmp.path()));
        first.initialize().await.unwrap();
        let created = first
            .create_session(NewSession::with_cwd("/tmp").mode("plan"))
            .await
            .unwrap();
        first.set_resume_id(created.id, "resume-123").await.unwrap();
        first.mark_cancelled(created.id).await.unwrap();
        let expected = first.get_session(created.id).await.unwrap();

        let second = SessionManager::new(FileStorage::new(tmp.path()));
        assert!(!second.is_initialized());
        second.initialize().await.unwrap();
        assert!(second.is_initialized());

        let loaded = second.get_session(created.id).await.unwrap();
        assert_eq!(loaded, expected);
        assert!(second.can_resume(created.id).await);
        assert!(second.is_cancelled(created.id).await);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = SessionManager::new(Arc::clone(&storage));
        manager.initialize().await.unwrap();
        let session = manager.create_session(NewSession::default()).await.unwrap();

        manager.initialize().await.unwrap();
        manager.initialize().await.unwrap();

        assert_eq!(manager.list_sessions().await, vec![session]);
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_manager_unready() {
        let manager = SessionManager::new(BrokenStorage);
        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ManagerError::Storage(_)));
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_update_session_merges_fields() {
        let manager = memory_manager().await;
        let session = manager
            .create_session(NewSession::with_cwd("/tmp"))
            .await
            .unwrap();

        manager
            .update_session(session.id, SessionUpdate::mode("plan"))
            .await
            .unwrap();

        let updated = manager.get_session(session.id).await.unwrap();
        assert_eq!(updated.mode_id.as_deref(), Some("plan"));
        assert_eq!(updated.cwd.as_deref(), Some("/tmp"));
        assert!(!updated.cancelled);
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_not_found() {
        let manager = memory_manager().await;
        let id = SessionId::new_v4();
        let err = manager
            .update_session(id, SessionUpdate::mode("plan"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_index_untouched() {
        let manager = SessionManager::new(BrokenStorage);
        assert_err!(manager.create_session(NewSession::default()).await);
        assert!(manager.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_state() {
        let manager = memory_manager().await;
        let session = manager.create_session(NewSession::default()).await.unwrap();

        assert!(!manager.is_cancelled(session.id).await);
        assert_ok!(manager.mark_cancelled(session.id).await);
        assert!(manager.is_cancelled(session.id).await);
        assert_ok!(manager.mark_cancelled(session.id).await);
        assert!(manager.is_cancelled(session.id).await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_session() {
        let manager = memory_manager().await;
        let id = SessionId::new_v4();
        assert!(!manager.is_cancelled(id).await);
        assert!(matches!(
            manager.mark_cancelled(id).await,
            Err(ManagerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_does_not_touch_other_fields() {
        let manager = memory_manager().await;
        let session = manager
            .create_session(NewSession::with_cwd("/tmp").mode("plan"))
            .await
            .unwrap();
        manager.set_resume_id(session.id, "resume-1").await.unwrap();
        manager.mark_cancelled(session.id).await.unwrap();

        let loaded = manager.get_session(session.id).await.unwrap();
        assert_eq!(loaded.cwd.as_deref(), Some("/tmp"));
        assert_eq!(loaded.mode_id.as_deref(), Some("plan"));
        assert_eq!(loaded.resume_id.as_deref(), Some("resume-1"));
    }

    #[tokio::test]
    async fn test_resume_id() {
        let manager = memory_manager().await;
        let session = manager.create_session(NewSession::default()).await.unwrap();

        assert!(!manager.can_resume(session.id).await);
        manager.set_resume_id(session.id, "resume-123").await.unwrap();
        assert!(manager.can_resume(session.id).await);

        assert!(!manager.can_resume(SessionId::new_v4()).await);
        assert!(matches!(
            manager.set_resume_id(SessionId::new_v4(), "x").await,
            Err(ManagerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(FileStorage::new(tmp.path()));
        manager.initialize().await.unwrap();
        let session = manager.create_session(NewSession::default()).await.unwrap();

        manager.delete_session(session.id).await.unwrap();
        assert!(manager.get_session(session.id).await.is_none());
        assert_ok!(manager.delete_session(session.id).await);

        let fresh = SessionManager::new(FileStorage::new(tmp.path()));
        fresh.initialize().await.unwrap();
        assert!(fresh.get_session(session.id).await.is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let storage = Arc::new(MemoryStorage::new());
        let mut old = Session::new(NewSession::with_cwd("/old"));
        old.created_at = 100;
        let mut new = Session::new(NewSession::with_cwd("/new"));
        new.created_at = 200;
        storage.save(&old).await.unwrap();
        storage.save(&new).await.unwrap();

        let manager = SessionManager::new(storage);
        manager.initialize().await.unwrap();

        let listed = manager.list_sessions().await;
        assert_eq!(listed, vec![new, old]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_stay_consistent_with_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = Arc::new(SessionManager::new(Arc::clone(&storage)));
        manager.initialize().await.unwrap();
        let id = manager.create_session(NewSession::default()).await.unwrap().id;

        let tasks = (0..32).map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .update_session(id, SessionUpdate::mode(format!("mode-{i}")))
                    .await
                    .unwrap();
                manager
                    .set_resume_id(id, format!("resume-{i}"))
                    .await
                    .unwrap();
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let in_memory = manager.get_session(id).await.unwrap();
        let persisted = storage.load_all().await.unwrap();
        assert_eq!(persisted, vec![in_memory]);
    }

    #[tokio::test]
    async fn test_sequential_updates_reach_storage_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(FileStorage::new(tmp.path()));
        manager.initialize().await.unwrap();
        let session = manager.create_session(NewSession::default()).await.unwrap();

        for mode in ["default", "ask", "plan"] {
            manager
                .update_session(session.id, SessionUpdate::mode(mode))
                .await
                .unwrap();
        }

        let persisted = FileStorage::new(tmp.path()).load_all().await.unwrap();
        assert_eq!(persisted[0].mode_id.as_deref(), Some("plan"));
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_not_found() {
        let manager = memory_manager().await;
        let session = manager.create_session(NewSession::default()).await.unwrap();
        manager.delete_session(session.id).await.unwrap();

        for _ in 0..100 {
            let id = SessionId::new_v4();
            assert_err!(manager.mark_cancelled(id).await);
            assert_err!(manager.update_session(id, SessionUpdate::mode("plan")).await);
            assert_err!(manager.set_resume_id(id, "resume").await);
        }
        assert_err!(manager.mark_cancelled(session.id).await);

        assert_eq!(lock_entries(&manager), 0);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_mutation() {
        let manager = memory_manager().await;
        let session = manager.create_session(NewSession::default()).await.unwrap();

        manager.mark_cancelled(session.id).await.unwrap();
        manager.set_resume_id(session.id, "resume").await.unwrap();
        assert_eq!(lock_entries(&manager), 0);

        manager.delete_session(session.id).await.unwrap();
        assert_eq!(lock_entries(&manager), 0);
    }

    #[tokio::test]
    async fn test_mutations_on_different_sessions_do_not_block() {
        let storage = Arc::new(GatedStorage::default());
        let manager = Arc::new(SessionManager::new(Arc::clone(&storage)));
        manager.initialize().await.unwrap();
        let a = manager.create_session(NewSession::default()).await.unwrap().id;
        let b = manager.create_session(NewSession::default()).await.unwrap().id;

        *storage.gated.lock().unwrap() = Some(a);
        let stalled = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .update_session(a, SessionUpdate::mode("plan"))
                    .await
            })
        };
        storage.entered.notified().await;

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            manager.update_session(b, SessionUpdate::mode("ask")),
        )
        .await
        .expect("mutation on another session was blocked");
        assert_ok!(other);
        assert!(!stalled.is_finished());

        storage.release.notify_one();
        assert_ok!(stalled.await.unwrap());
        assert_eq!(
            manager.get_session(a).await.unwrap().mode_id.as_deref(),
            Some("plan")
        );
    }
}
