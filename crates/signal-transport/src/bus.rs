//! Realtime-bus transport: per-user inbox paths on a key-value bus.
//!
//! Models the hosted store's `<namespace>/<userId>/incoming/<callId>`
//! layout: a published signal is retained at its path until removed by
//! the cleanup supervisor, and every (re-)subscription replays retained
//! records. The replay is deliberate: it is the duplicate-delivery
//! source the state machine is required to absorb.

use crate::adapter::{SignalStream, SignalTransport};
use crate::errors::{TransportError, TransportResult};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ringline_signal_core::{SessionId, Signal, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

/// A record retained at a bus path until explicitly removed.
#[derive(Debug, Clone)]
pub struct RetainedRecord {
    pub path: String,
    pub signal: Signal,
}

#[derive(Default)]
struct Mailbox {
    retained: Vec<RetainedRecord>,
    subscribers: Vec<mpsc::UnboundedSender<Signal>>,
}

/// The shared bus. One instance models one namespace of the hosted
/// realtime store; both parties' transports hold the same `Arc`.
pub struct SignalBus {
    namespace: String,
    mailboxes: DashMap<UserId, Mailbox>,
    offline: DashSet<UserId>,
}

impl SignalBus {
    pub fn new(namespace: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            mailboxes: DashMap::new(),
            offline: DashSet::new(),
        })
    }

    fn record_path(&self, user: &UserId, session_id: &SessionId) -> String {
        format!("{}/{}/incoming/{}", self.namespace, user, session_id)
    }

    /// Mark a user (un)reachable. Mirrors the store link going down for
    /// that user; used by disconnect handling and failure tests.
    pub fn set_reachable(&self, user: &UserId, reachable: bool) {
        if reachable {
            self.offline.remove(user);
        } else {
            self.offline.insert(user.clone());
        }
    }

    pub fn publish(&self, to: &UserId, signal: Signal) -> TransportResult<()> {
        if self.offline.contains(to) {
            return Err(TransportError::Unavailable { user: to.clone() });
        }

        let path = self.record_path(to, &signal.session_id);
        let mut mailbox = self.mailboxes.entry(to.clone()).or_default();
        mailbox.retained.push(RetainedRecord {
            path: path.clone(),
            signal: signal.clone(),
        });
        trace!(path = %path, kind = ?signal.body.kind(), "retained signal record");

        mailbox
            .subscribers
            .retain(|sub| sub.send(signal.clone()).is_ok());
        Ok(())
    }

    pub fn subscribe(&self, user: &UserId) -> mpsc::UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mailbox = self.mailboxes.entry(user.clone()).or_default();

        // Late subscribers see everything still resident in their inbox.
        for record in &mailbox.retained {
            let _ = tx.send(record.signal.clone());
        }
        mailbox.subscribers.push(tx);
        debug!(user = %user, "bus subscription started");
        rx
    }

    /// Drop all retained records for one session in one user's inbox.
    pub fn remove_records(&self, user: &UserId, session_id: &SessionId) {
        if let Some(mut mailbox) = self.mailboxes.get_mut(user) {
            let before = mailbox.retained.len();
            mailbox
                .retained
                .retain(|r| r.signal.session_id != *session_id);
            let removed = before - mailbox.retained.len();
            if removed > 0 {
                debug!(user = %user, session_id = %session_id, removed, "cleared bus records");
            }
        }
    }

    /// Retained records currently resident in a user's inbox.
    pub fn records_for(&self, user: &UserId) -> Vec<RetainedRecord> {
        self.mailboxes
            .get(user)
            .map(|m| m.retained.clone())
            .unwrap_or_default()
    }
}

/// [`SignalTransport`] backed by a [`SignalBus`].
#[derive(Clone)]
pub struct BusTransport {
    bus: Arc<SignalBus>,
}

impl BusTransport {
    pub fn new(bus: Arc<SignalBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SignalTransport for BusTransport {
    async fn send(&self, to: &UserId, signal: Signal) -> TransportResult<()> {
        self.bus.publish(to, signal)
    }

    fn observe(&self, me: &UserId) -> SignalStream {
        Box::pin(UnboundedReceiverStream::new(self.bus.subscribe(me)))
    }

    async fn remove_session_state(
        &self,
        user: &UserId,
        session_id: &SessionId,
    ) -> TransportResult<()> {
        if self.bus.offline.contains(user) {
            // Cleanup is best-effort; the caller retries.
            warn!(user = %user, session_id = %session_id, "cleanup target unreachable");
            return Err(TransportError::Unavailable { user: user.clone() });
        }
        self.bus.remove_records(user, session_id);
        Ok(())
    }
}
