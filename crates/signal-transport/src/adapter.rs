//! The uniform transport seam: "send a signal to user X" and "observe
//! signals addressed to me", regardless of the backing medium.

use crate::errors::TransportResult;
use async_trait::async_trait;
use futures::Stream;
use ringline_signal_core::{SessionId, Signal, UserId};
use std::pin::Pin;

/// Lazy, infinite, restartable stream of signals addressed to one user.
pub type SignalStream = Pin<Box<dyn Stream<Item = Signal> + Send>>;

/// A signal transport. Exactly one backing implementation is injected
/// into the engine; callers never branch on the medium.
///
/// `send` is fire-and-forget past the local queue: success means the
/// signal was accepted for delivery, not that the recipient saw it.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn send(&self, to: &UserId, signal: Signal) -> TransportResult<()>;

    /// Subscribe to signals addressed to `me`. May replay transport-
    /// resident records on (re-)subscription; consumers must deduplicate.
    fn observe(&self, me: &UserId) -> SignalStream;

    /// Remove any transport-resident state for a session in a user's
    /// inbox. A no-op for transports that retain nothing.
    async fn remove_session_state(
        &self,
        user: &UserId,
        session_id: &SessionId,
    ) -> TransportResult<()> {
        let _ = (user, session_id);
        Ok(())
    }
}
