//! Session records and the partial inputs that create or mutate them.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier.
pub type SessionId = Uuid;

/// Durable state for one interactive agent conversation.
///
/// Serialized as camelCase JSON; absent optionals are omitted so the
/// on-disk record stays `{id, cwd?, modeId?, resumeId?, cancelled, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Working directory the session was opened in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Current mode / operating profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    /// Native agent conversation to resume against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_id: Option<String>,
    /// Set once the caller cancelled the session. Never cleared.
    #[serde(default)]
    pub cancelled: bool,
    /// Creation timestamp (Unix epoch seconds).
    #[serde(default)]
    pub created_at: i64,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: i64,
}

impl Session {
    /// Build a fresh record with a random id from the creation fields.
    #[must_use]
    pub fn new(fields: NewSession) -> Self {
        let timestamp = now();
        Self {
            id: Uuid::new_v4(),
            cwd: fields.cwd,
            mode_id: fields.mode_id,
            resume_id: None,
            cancelled: false,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Merge `update` into this record. Fields the update leaves unset are kept.
    pub fn apply(&mut self, update: SessionUpdate) {
        let SessionUpdate {
            cwd,
            mode_id,
            resume_id,
        } = update;

        if let Some(cwd) = cwd {
            self.cwd = Some(cwd);
        }
        if let Some(mode_id) = mode_id {
            self.mode_id = Some(mode_id);
        }
        if let Some(resume_id) = resume_id {
            self.resume_id = Some(resume_id);
        }
        self.touch();
    }

    /// Whether a non-empty resume token is present.
    #[must_use]
    pub fn has_resume_id(&self) -> bool {
        self.resume_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Fields accepted when creating a session. Both are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub mode_id: Option<String>,
}

impl NewSession {
    /// Creation input with a working directory.
    #[must_use]
    pub fn with_cwd(cwd: impl Into<String>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            mode_id: None,
        }
    }

    /// Set the initial mode.
    #[must_use]
    pub fn mode(mut self, mode_id: impl Into<String>) -> Self {
        self.mode_id = Some(mode_id.into());
        self
    }
}

/// Partial update merged into an existing session.
///
/// There is deliberately no `cancelled` field: cancellation only goes
/// through the store's mark-cancelled operation and cannot be undone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub mode_id: Option<String>,
    #[serde(default)]
    pub resume_id: Option<String>,
}

impl SessionUpdate {
    /// Update that only changes the mode.
    #[must_use]
    pub fn mode(mode_id: impl Into<String>) -> Self {
        Self {
            mode_id: Some(mode_id.into()),
            ..Self::default()
        }
    }

    /// Update that only changes the resume token.
    #[must_use]
    pub fn resume_id(resume_id: impl Into<String>) -> Self {
        Self {
            resume_id: Some(resume_id.into()),
            ..Self::default()
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
