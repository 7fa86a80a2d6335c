//! Notification dispatch: session transitions become exactly one of
//! show-incoming-prompt, show-outgoing-indicator, or dismiss-prompt.
//!
//! The auto-dismiss after the prompt window is a UI action only. The
//! session stays governed by the ringing timer, so a late accept after
//! the prompt disappeared, but before ring expiry, still succeeds.

use crate::config::EngineConfig;
use crate::events::IncomingCallInfo;
use async_trait::async_trait;
use dashmap::DashMap;
use ringline_signal_core::{ChannelId, MediaKind, SessionId, UserId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// An outgoing call the local user is waiting on.
#[derive(Debug, Clone)]
pub struct OutgoingCallInfo {
    pub session_id: SessionId,
    pub callee: UserId,
    pub channel: ChannelId,
    pub media_kind: MediaKind,
}

/// The UI surface the dispatcher renders into.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show_incoming_prompt(&self, info: IncomingCallInfo);
    async fn show_outgoing_indicator(&self, info: OutgoingCallInfo);
    async fn dismiss_prompt(&self, session_id: &SessionId);
}

/// Sink that renders nothing. For headless use and tests that assert on
/// the engine rather than the UI.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn show_incoming_prompt(&self, _info: IncomingCallInfo) {}
    async fn show_outgoing_indicator(&self, _info: OutgoingCallInfo) {}
    async fn dismiss_prompt(&self, _session_id: &SessionId) {}
}

pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    prompt_window: std::time::Duration,
    auto_dismiss: DashMap<SessionId, JoinHandle<()>>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, config: &EngineConfig) -> Self {
        Self {
            sink,
            prompt_window: config.prompt_window,
            auto_dismiss: DashMap::new(),
        }
    }

    pub async fn show_incoming(&self, info: IncomingCallInfo) {
        let session_id = info.session_id.clone();
        self.sink.show_incoming_prompt(info).await;

        let sink = self.sink.clone();
        let window = self.prompt_window;
        let timer_session = session_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            debug!(session_id = %timer_session, "incoming prompt auto-dismissed");
            sink.dismiss_prompt(&timer_session).await;
        });

        if let Some(old) = self.auto_dismiss.insert(session_id, handle) {
            old.abort();
        }
    }

    pub async fn show_outgoing(&self, info: OutgoingCallInfo) {
        self.sink.show_outgoing_indicator(info).await;
    }

    pub async fn dismiss(&self, session_id: &SessionId) {
        if let Some((_, handle)) = self.auto_dismiss.remove(session_id) {
            handle.abort();
        }
        self.sink.dismiss_prompt(session_id).await;
    }
}
