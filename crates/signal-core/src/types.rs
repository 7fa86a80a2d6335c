//! Core data model: identifiers, call sessions, and signal envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identifier as supplied by the authentication boundary.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the conversation/context a call is scoped to.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session ID type. Globally unique and immutable once created.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("call-{}", uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media carried by a session. Upgradeable audio -> video, never back.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Lifecycle status of a call session.
///
/// Transitions are monotonic with respect to `rank()`: once a terminal
/// status is reached no further transitions are accepted.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Accepted,
    Declined,
    Cancelled,
    Expired,
    Ended,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Declined | CallStatus::Cancelled | CallStatus::Expired | CallStatus::Ended
        )
    }

    /// Position in the partial order Ringing < {Accepted, Declined,
    /// Cancelled, Expired} < Ended.
    pub fn rank(&self) -> u8 {
        match self {
            CallStatus::Ringing => 0,
            CallStatus::Accepted
            | CallStatus::Declined
            | CallStatus::Cancelled
            | CallStatus::Expired => 1,
            CallStatus::Ended => 2,
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Accepted => "accepted",
            CallStatus::Declined => "declined",
            CallStatus::Cancelled => "cancelled",
            CallStatus::Expired => "expired",
            CallStatus::Ended => "ended",
        };
        write!(f, "{}", s)
    }
}

/// Why a session ended up CANCELLED. `GlareLoser` marks the losing side
/// of a simultaneous mutual call so UIs can explain the collision.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CallerCancelled,
    GlareLoser,
    PeerDisconnected,
}

/// Which side of the call a participant is on.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Caller,
    Callee,
}

/// The central entity: one call from intent to termination.
///
/// Logically co-owned by caller and callee. Either side may observe and
/// terminate it; the state machine rejects illegal status regressions
/// regardless of which side proposes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub session_id: SessionId,
    pub caller: UserId,
    pub callee: UserId,
    pub channel: ChannelId,
    pub media_kind: MediaKind,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub cancel_reason: Option<CancelReason>,
}

impl CallSession {
    pub fn new(
        caller: UserId,
        callee: UserId,
        channel: ChannelId,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            caller,
            callee,
            channel,
            media_kind,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
            cancel_reason: None,
        }
    }

    pub fn role_of(&self, user: &UserId) -> Option<Role> {
        if *user == self.caller {
            Some(Role::Caller)
        } else if *user == self.callee {
            Some(Role::Callee)
        } else {
            None
        }
    }

    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        match self.role_of(user)? {
            Role::Caller => Some(&self.callee),
            Role::Callee => Some(&self.caller),
        }
    }

    /// True when `other` is the mirror of this session: same channel,
    /// same pair of users, opposite direction.
    pub fn is_mirror_of(&self, other: &CallSession) -> bool {
        self.channel == other.channel
            && self.caller == other.callee
            && self.callee == other.caller
    }
}

/// Kind discriminant for a [`Signal`], used for logging and dedup keys.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Hangup,
    CallDeclined,
    CallNotification,
    StatusUpdate,
}

/// Kind-specific contents of a signal. Session descriptions and ICE
/// candidates are opaque payloads passed through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalBody {
    Offer { sdp: String, renegotiate: bool },
    Answer { sdp: String },
    IceCandidate { candidate: String },
    Hangup,
    CallDeclined,
    CallNotification { media_kind: MediaKind },
    StatusUpdate { status: CallStatus },
}

impl SignalBody {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalBody::Offer { .. } => SignalKind::Offer,
            SignalBody::Answer { .. } => SignalKind::Answer,
            SignalBody::IceCandidate { .. } => SignalKind::IceCandidate,
            SignalBody::Hangup => SignalKind::Hangup,
            SignalBody::CallDeclined => SignalKind::CallDeclined,
            SignalBody::CallNotification { .. } => SignalKind::CallNotification,
            SignalBody::StatusUpdate { .. } => SignalKind::StatusUpdate,
        }
    }
}

/// An envelope carried over the transport, routed from one user to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub session_id: SessionId,
    pub from: UserId,
    pub to: UserId,
    pub channel: ChannelId,
    pub body: SignalBody,
}

impl Signal {
    pub fn new(
        session_id: SessionId,
        from: UserId,
        to: UserId,
        channel: ChannelId,
        body: SignalBody,
    ) -> Self {
        Self {
            session_id,
            from,
            to,
            channel,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rank_is_monotonic_over_lifecycle() {
        assert!(CallStatus::Ringing.rank() < CallStatus::Accepted.rank());
        assert!(CallStatus::Accepted.rank() < CallStatus::Ended.rank());
        assert_eq!(CallStatus::Declined.rank(), CallStatus::Expired.rank());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Accepted.is_terminal());
        for s in [
            CallStatus::Declined,
            CallStatus::Cancelled,
            CallStatus::Expired,
            CallStatus::Ended,
        ] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn signal_body_wire_tags_are_snake_case() {
        let body = SignalBody::CallNotification {
            media_kind: MediaKind::Video,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "call_notification");
        assert_eq!(json["media_kind"], "video");

        let parsed: SignalBody =
            serde_json::from_str(r#"{"kind":"status_update","status":"declined"}"#).unwrap();
        assert!(matches!(
            parsed,
            SignalBody::StatusUpdate {
                status: CallStatus::Declined
            }
        ));
    }

    #[test]
    fn mirror_sessions_detected() {
        let s1 = CallSession::new("a".into(), "b".into(), "ch".into(), MediaKind::Audio);
        let mut s2 = CallSession::new("b".into(), "a".into(), "ch".into(), MediaKind::Audio);
        assert!(s1.is_mirror_of(&s2));
        s2.channel = ChannelId::from("other");
        assert!(!s1.is_mirror_of(&s2));
    }
}
