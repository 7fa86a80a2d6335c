//! Cleanup supervisor: transport-resident signaling state is removed
//! once a session is terminal, after a grace window that lets both
//! sides' observers see the terminal status first.
//!
//! Cleanup failure is never surfaced; it is logged and retried a
//! bounded number of times.

use crate::config::EngineConfig;
use ringline_signal_core::{CallSession, SessionId, UserId};
use ringline_signal_transport::SignalTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct CleanupSupervisor {
    transport: Arc<dyn SignalTransport>,
    grace: Duration,
    retry: Duration,
    max_attempts: u32,
}

impl CleanupSupervisor {
    pub fn new(transport: Arc<dyn SignalTransport>, config: &EngineConfig) -> Self {
        Self {
            transport,
            grace: config.cleanup_grace,
            retry: config.cleanup_retry,
            max_attempts: config.cleanup_max_attempts,
        }
    }

    /// Schedule removal of both parties' records for a terminal session.
    /// Returns the task handle so tests can await completion.
    pub fn schedule(&self, session: &CallSession) -> JoinHandle<()> {
        let transport = self.transport.clone();
        let grace = self.grace;
        let retry = self.retry;
        let max_attempts = self.max_attempts;
        let session_id = session.session_id.clone();
        let parties = [session.caller.clone(), session.callee.clone()];

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            for user in &parties {
                remove_with_retry(&*transport, user, &session_id, retry, max_attempts).await;
            }
            debug!(session_id = %session_id, "transport records cleared");
        })
    }
}

async fn remove_with_retry(
    transport: &dyn SignalTransport,
    user: &UserId,
    session_id: &SessionId,
    retry: Duration,
    max_attempts: u32,
) {
    for attempt in 1..=max_attempts {
        match transport.remove_session_state(user, session_id).await {
            Ok(()) => return,
            Err(e) if attempt < max_attempts => {
                debug!(
                    user = %user,
                    session_id = %session_id,
                    attempt,
                    error = %e,
                    "cleanup attempt failed, retrying"
                );
                tokio::time::sleep(retry).await;
            }
            Err(e) => {
                // Orphaned records are harmless; give up loudly in the log.
                warn!(
                    user = %user,
                    session_id = %session_id,
                    error = %e,
                    "cleanup abandoned after retries"
                );
            }
        }
    }
}
