//! Session storage with lookup helpers for the coordinator.

use crate::errors::{SignalError, SignalResult};
use crate::types::{CallSession, CallStatus, SessionId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory store of live sessions, shared between the coordinator and
/// its background tasks.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, CallSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, session: CallSession) -> SignalResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(SignalError::SessionExists {
                session_id: session.session_id.clone(),
            });
        }
        info!(
            session_id = %session.session_id,
            caller = %session.caller,
            callee = %session.callee,
            "created session"
        );
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    pub async fn get(&self, session_id: &SessionId) -> SignalResult<CallSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SignalError::SessionNotFound {
                session_id: session_id.clone(),
            })
    }

    pub async fn update(&self, session: CallSession) -> SignalResult<()> {
        let mut sessions = self.sessions.write().await;
        debug!(session_id = %session.session_id, status = %session.status, "updated session");
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    /// A RINGING session between the same pair in the same channel but the
    /// opposite direction: the glare counterpart of `session`.
    pub async fn find_glare_counterpart(&self, session: &CallSession) -> Option<CallSession> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .find(|other| {
                other.status == CallStatus::Ringing
                    && session.status == CallStatus::Ringing
                    && session.is_mirror_of(other)
            })
            .cloned()
    }

    /// All non-terminal sessions a user participates in. Used when a
    /// transport-level disconnect has to tear the user's calls down.
    pub async fn active_for_user(&self, user: &UserId) -> Vec<CallSession> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| !s.status.is_terminal() && (s.caller == *user || s.callee == *user))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = SessionStore::new();
        let session =
            CallSession::new("a".into(), "b".into(), "ch".into(), MediaKind::Audio);
        store.insert(session.clone()).await.unwrap();
        let err = store.insert(session).await.unwrap_err();
        assert!(matches!(err, SignalError::SessionExists { .. }));
    }

    #[tokio::test]
    async fn glare_counterpart_found() {
        let store = SessionStore::new();
        let outbound =
            CallSession::new("a".into(), "b".into(), "ch".into(), MediaKind::Audio);
        let inbound =
            CallSession::new("b".into(), "a".into(), "ch".into(), MediaKind::Audio);
        store.insert(inbound.clone()).await.unwrap();

        let found = store.find_glare_counterpart(&outbound).await.unwrap();
        assert_eq!(found.session_id, inbound.session_id);
    }

    #[tokio::test]
    async fn active_for_user_skips_terminal() {
        let store = SessionStore::new();
        let mut s1 = CallSession::new("a".into(), "b".into(), "ch".into(), MediaKind::Audio);
        let s2 = CallSession::new("a".into(), "c".into(), "ch".into(), MediaKind::Audio);
        s1.status = CallStatus::Ended;
        store.insert(s1).await.unwrap();
        store.insert(s2.clone()).await.unwrap();

        let active = store.active_for_user(&"a".into()).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, s2.session_id);
    }
}
