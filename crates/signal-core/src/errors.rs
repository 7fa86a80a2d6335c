//! Error taxonomy for call signaling.
//!
//! `TransportUnavailable` and `PolicyViolation` surface to the user on
//! initiate/accept; `IllegalTransition` is a benign race unless it blocks
//! a user-initiated action; `ExpiredSession` means the call timed out
//! before the action landed.

use crate::types::{CallStatus, SessionId, UserId};
use thiserror::Error;

/// Result type for signaling operations.
pub type SignalResult<T> = Result<T, SignalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Recipient unreachable or the transport link is down.
    #[error("transport unavailable: cannot reach {user}")]
    TransportUnavailable { user: UserId },

    /// Signaling between the two users is not permitted.
    #[error("policy violation: {user_a} may not signal {user_b}")]
    PolicyViolation { user_a: UserId, user_b: UserId },

    /// Attempted transition inconsistent with the session's current state.
    #[error("illegal transition: {event} not applicable in {status} for session {session_id}")]
    IllegalTransition {
        session_id: SessionId,
        status: CallStatus,
        event: &'static str,
    },

    /// Action attempted after the ringing timeout already fired.
    #[error("session {session_id} expired before the action was applied")]
    ExpiredSession { session_id: SessionId },

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: SessionId },

    #[error("session {session_id} already exists")]
    SessionExists { session_id: SessionId },

    /// Actor is neither caller nor callee of the session.
    #[error("user {user} is not a participant of session {session_id}")]
    NotAParticipant { session_id: SessionId, user: UserId },
}

impl SignalError {
    /// Short, product-facing phrase for errors that reach the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            SignalError::TransportUnavailable { .. } => "could not reach user",
            SignalError::PolicyViolation { .. } => "cannot call this user",
            SignalError::ExpiredSession { .. } => "call no longer available",
            SignalError::IllegalTransition { .. } => "call state changed, try again",
            SignalError::SessionNotFound { .. } => "call no longer available",
            SignalError::SessionExists { .. } => "call already in progress",
            SignalError::NotAParticipant { .. } => "cannot act on this call",
        }
    }
}
