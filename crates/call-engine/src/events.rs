//! Application-facing events: the engine tells the app what happened,
//! the app decides what to render.

use async_trait::async_trait;
use ringline_signal_core::{
    CallStatus, CancelReason, ChannelId, MediaKind, SessionId, SignalError, UserId,
};

/// A call someone is placing to the local user.
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    pub session_id: SessionId,
    pub caller: UserId,
    pub channel: ChannelId,
    pub media_kind: MediaKind,
}

/// A lifecycle change on a session the local user participates in.
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    pub session_id: SessionId,
    pub previous: CallStatus,
    pub status: CallStatus,
    pub media_kind: MediaKind,
    pub cancel_reason: Option<CancelReason>,
}

/// An opaque negotiation payload for the media session layer.
#[derive(Debug, Clone)]
pub enum NegotiationPayload {
    Offer { sdp: String, renegotiate: bool },
    Answer { sdp: String },
    IceCandidate { candidate: String },
}

/// Handler the application implements to observe call activity.
///
/// All methods default to no-ops so an app can implement only what its
/// UI needs.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    /// A call notification addressed to the local user arrived.
    async fn on_incoming_call(&self, info: IncomingCallInfo) {
        let _ = info;
    }

    /// A session changed status (or media kind, on upgrade).
    async fn on_call_state_changed(&self, info: CallStatusInfo) {
        let _ = info;
    }

    /// The remote side upgraded the call; the renegotiation offer
    /// follows via [`Self::on_negotiation_signal`].
    async fn on_remote_upgrade(&self, session_id: SessionId, media_kind: MediaKind) {
        let _ = (session_id, media_kind);
    }

    /// A negotiation payload for the media layer. Candidates may arrive
    /// in any order, possibly before the answer; buffering is the media
    /// layer's job.
    async fn on_negotiation_signal(
        &self,
        session_id: SessionId,
        from: UserId,
        payload: NegotiationPayload,
    ) {
        let _ = (session_id, from, payload);
    }

    /// A user-initiated operation failed in a way worth showing.
    /// `error.user_message()` carries the product phrasing.
    async fn on_call_failed(&self, session_id: Option<SessionId>, error: SignalError) {
        let _ = (session_id, error);
    }
}

/// Handler that ignores everything.
pub struct NoopHandler;

#[async_trait]
impl CallEventHandler for NoopHandler {}
