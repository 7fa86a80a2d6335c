//! Pure transition executor over the master state table.
//!
//! `apply` takes the current session and one event and returns what should
//! happen: the status change, the signals to publish, and the engine-side
//! effects. It performs no I/O, so every race and duplicate-delivery case
//! is unit-testable without a live transport.
//!
//! Idempotency rules: an event whose produced status equals the current
//! status is a no-op, and system/remote events on states they no longer
//! apply to are benign no-ops. User-initiated `accept` and `upgrade` are
//! the exceptions that fail loudly, since the user needs to know the
//! action did not land.

use crate::errors::{SignalError, SignalResult};
use crate::state_table::{
    Effect, EventKind, SessionEvent, SignalTemplate, StateKey, MASTER_TABLE,
};
use crate::types::{
    CallSession, CallStatus, CancelReason, MediaKind, Role, SessionId, Signal, SignalBody, UserId,
};
use tracing::debug;

/// Outcome of applying one event to one session.
#[derive(Debug, Clone)]
pub struct Applied {
    pub previous: CallStatus,
    /// New status, when the event changed it.
    pub next_status: Option<CallStatus>,
    /// New media kind (upgrade only).
    pub media_kind: Option<MediaKind>,
    /// Cancel reason to record (cancel only).
    pub cancel_reason: Option<CancelReason>,
    /// Signals to publish, already addressed.
    pub signals: Vec<Signal>,
    /// Engine-side effects to perform.
    pub effects: Vec<Effect>,
}

impl Applied {
    fn noop(previous: CallStatus) -> Self {
        Self {
            previous,
            next_status: None,
            media_kind: None,
            cancel_reason: None,
            signals: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.next_status.is_none()
            && self.media_kind.is_none()
            && self.signals.is_empty()
            && self.effects.is_empty()
    }
}

/// Apply `event` to `session` as observed by `local` (the user whose
/// process is running this machine). Pure: the caller commits the result.
pub fn apply(
    session: &CallSession,
    event: &SessionEvent,
    local: &UserId,
) -> SignalResult<Applied> {
    let acting = event.actor().unwrap_or(local);
    let role = session
        .role_of(acting)
        .ok_or_else(|| SignalError::NotAParticipant {
            session_id: session.session_id.clone(),
            user: acting.clone(),
        })?;

    let kind = event.kind();

    // Duplicate delivery of the transition that produced the current
    // status collapses to a no-op, per the dedup rules.
    if kind.produced_status() == Some(session.status) {
        debug!(
            session_id = %session.session_id,
            status = %session.status,
            event = kind.name(),
            "duplicate transition collapsed to no-op"
        );
        return Ok(Applied::noop(session.status));
    }

    let key = StateKey {
        role,
        status: session.status,
        event: kind,
    };

    match MASTER_TABLE.get(&key) {
        Some(transition) => {
            let mut applied = Applied {
                previous: session.status,
                next_status: transition.next_status,
                media_kind: None,
                cancel_reason: None,
                signals: Vec::new(),
                effects: transition.effects.clone(),
            };

            if let SessionEvent::Upgrade { to, .. } = event {
                match (session.media_kind, to) {
                    (MediaKind::Video, MediaKind::Video) => {
                        debug!(session_id = %session.session_id, "already video, upgrade is a no-op");
                        return Ok(Applied::noop(session.status));
                    }
                    (_, MediaKind::Audio) => {
                        // Downgrades do not exist.
                        return Err(SignalError::IllegalTransition {
                            session_id: session.session_id.clone(),
                            status: session.status,
                            event: kind.name(),
                        });
                    }
                    (MediaKind::Audio, MediaKind::Video) => {
                        applied.media_kind = Some(MediaKind::Video);
                    }
                }
            }

            if let SessionEvent::Cancel { reason, .. } = event {
                applied.cancel_reason = Some(*reason);
            }

            let next_status = applied.next_status;
            for template in &transition.signals {
                applied
                    .signals
                    .push(render_signal(session, event, acting, *template, next_status));
            }

            Ok(applied)
        }
        None => resolve_missing(session, kind),
    }
}

/// No table entry for (role, status, event): decide between benign no-op
/// and a surfaced error.
fn resolve_missing(session: &CallSession, kind: EventKind) -> SignalResult<Applied> {
    if session.status.is_terminal() {
        match kind {
            EventKind::Accept if session.status == CallStatus::Expired => {
                Err(SignalError::ExpiredSession {
                    session_id: session.session_id.clone(),
                })
            }
            // Accepting a declined/cancelled/ended call, or upgrading a
            // finished one, blocks a user action and must be reported.
            EventKind::Accept | EventKind::Upgrade => Err(SignalError::IllegalTransition {
                session_id: session.session_id.clone(),
                status: session.status,
                event: kind.name(),
            }),
            _ => {
                debug!(
                    session_id = %session.session_id,
                    status = %session.status,
                    event = kind.name(),
                    "event on terminal session ignored"
                );
                Ok(Applied::noop(session.status))
            }
        }
    } else if kind.is_user_initiated() {
        Err(SignalError::IllegalTransition {
            session_id: session.session_id.clone(),
            status: session.status,
            event: kind.name(),
        })
    } else {
        debug!(
            session_id = %session.session_id,
            status = %session.status,
            event = kind.name(),
            "stale system event ignored"
        );
        Ok(Applied::noop(session.status))
    }
}

fn render_signal(
    session: &CallSession,
    event: &SessionEvent,
    acting: &UserId,
    template: SignalTemplate,
    next_status: Option<CallStatus>,
) -> Signal {
    let peer = match session.role_of(acting) {
        Some(Role::Caller) => &session.callee,
        _ => &session.caller,
    };

    match template {
        SignalTemplate::DeclinedToCaller => Signal::new(
            session.session_id.clone(),
            session.callee.clone(),
            session.caller.clone(),
            session.channel.clone(),
            SignalBody::CallDeclined,
        ),
        SignalTemplate::HangupToPeer => Signal::new(
            session.session_id.clone(),
            acting.clone(),
            peer.clone(),
            session.channel.clone(),
            SignalBody::Hangup,
        ),
        SignalTemplate::StatusToPeer => Signal::new(
            session.session_id.clone(),
            acting.clone(),
            peer.clone(),
            session.channel.clone(),
            SignalBody::StatusUpdate {
                status: next_status.unwrap_or(session.status),
            },
        ),
        SignalTemplate::RenegotiateOfferToPeer => {
            let sdp = match event {
                SessionEvent::Upgrade { sdp, .. } => sdp.clone(),
                _ => String::new(),
            };
            Signal::new(
                session.session_id.clone(),
                acting.clone(),
                peer.clone(),
                session.channel.clone(),
                SignalBody::Offer {
                    sdp,
                    renegotiate: true,
                },
            )
        }
    }
}

/// Which of two simultaneous mutual calls survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlareOutcome {
    pub winner: SessionId,
    pub loser: SessionId,
}

/// Tie-break for simultaneous mutual calls (A calls B while B calls A in
/// the same channel): the lexicographically smaller session ID wins, the
/// other side is auto-cancelled with [`CancelReason::GlareLoser`].
pub fn resolve_glare(a: &CallSession, b: &CallSession) -> Option<GlareOutcome> {
    if !a.is_mirror_of(b) {
        return None;
    }
    if a.status != CallStatus::Ringing || b.status != CallStatus::Ringing {
        return None;
    }
    if a.session_id < b.session_id {
        Some(GlareOutcome {
            winner: a.session_id.clone(),
            loser: b.session_id.clone(),
        })
    } else {
        Some(GlareOutcome {
            winner: b.session_id.clone(),
            loser: a.session_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new("alice".into(), "bob".into(), "ch-1".into(), MediaKind::Audio)
    }

    fn alice() -> UserId {
        "alice".into()
    }

    fn bob() -> UserId {
        "bob".into()
    }

    #[test]
    fn callee_accepts_ringing_call() {
        let s = session();
        let applied = apply(&s, &SessionEvent::Accept { by: bob() }, &bob()).unwrap();
        assert_eq!(applied.next_status, Some(CallStatus::Accepted));
        assert!(applied.effects.contains(&Effect::CancelRingTimer));
        assert!(applied.effects.contains(&Effect::BeginNegotiation));
        assert_eq!(applied.signals.len(), 1);
        assert!(matches!(
            applied.signals[0].body,
            SignalBody::StatusUpdate {
                status: CallStatus::Accepted
            }
        ));
        assert_eq!(applied.signals[0].to, alice());
    }

    #[test]
    fn caller_cannot_accept_own_call() {
        let s = session();
        let err = apply(&s, &SessionEvent::Accept { by: alice() }, &alice()).unwrap_err();
        assert!(matches!(err, SignalError::IllegalTransition { .. }));
    }

    #[test]
    fn stranger_is_rejected() {
        let s = session();
        let mallory: UserId = "mallory".into();
        let err = apply(&s, &SessionEvent::Accept { by: mallory }, &alice()).unwrap_err();
        assert!(matches!(err, SignalError::NotAParticipant { .. }));
    }

    #[test]
    fn decline_emits_exactly_one_signal_and_repeat_is_noop() {
        let mut s = session();
        let applied = apply(&s, &SessionEvent::Decline { by: bob() }, &bob()).unwrap();
        assert_eq!(applied.next_status, Some(CallStatus::Declined));
        assert_eq!(applied.signals.len(), 1);
        assert!(matches!(applied.signals[0].body, SignalBody::CallDeclined));

        s.status = CallStatus::Declined;
        let again = apply(&s, &SessionEvent::Decline { by: bob() }, &bob()).unwrap();
        assert!(again.is_noop());
        assert!(again.signals.is_empty());
    }

    #[test]
    fn cancel_records_reason_and_notifies_callee() {
        let s = session();
        let applied = apply(
            &s,
            &SessionEvent::Cancel {
                by: alice(),
                reason: CancelReason::CallerCancelled,
            },
            &alice(),
        )
        .unwrap();
        assert_eq!(applied.next_status, Some(CallStatus::Cancelled));
        assert_eq!(applied.cancel_reason, Some(CancelReason::CallerCancelled));
        assert!(matches!(applied.signals[0].body, SignalBody::Hangup));
        assert_eq!(applied.signals[0].to, bob());
    }

    #[test]
    fn expire_is_idempotent() {
        let mut s = session();
        let applied = apply(&s, &SessionEvent::Expire, &alice()).unwrap();
        assert_eq!(applied.next_status, Some(CallStatus::Expired));

        s.status = CallStatus::Expired;
        let again = apply(&s, &SessionEvent::Expire, &alice()).unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn expire_after_accept_is_benign_noop() {
        let mut s = session();
        s.status = CallStatus::Accepted;
        let applied = apply(&s, &SessionEvent::Expire, &alice()).unwrap();
        assert!(applied.is_noop());
    }

    #[test]
    fn accept_after_expiry_reports_expired_session() {
        let mut s = session();
        s.status = CallStatus::Expired;
        let err = apply(&s, &SessionEvent::Accept { by: bob() }, &bob()).unwrap_err();
        assert!(matches!(err, SignalError::ExpiredSession { .. }));
    }

    #[test]
    fn hangup_before_accept_observed_still_reaches_ended() {
        // Peer accepted and hung up before our STATUS_UPDATE arrived.
        let s = session();
        let applied = apply(&s, &SessionEvent::RemoteHangup, &alice()).unwrap();
        assert_eq!(applied.next_status, Some(CallStatus::Ended));
    }

    #[test]
    fn hangup_requires_accepted() {
        let s = session();
        let err = apply(&s, &SessionEvent::Hangup { by: alice() }, &alice()).unwrap_err();
        assert!(matches!(err, SignalError::IllegalTransition { .. }));
    }

    #[test]
    fn upgrade_tags_offer_renegotiate() {
        let mut s = session();
        s.status = CallStatus::Accepted;
        let applied = apply(
            &s,
            &SessionEvent::Upgrade {
                by: alice(),
                to: MediaKind::Video,
                sdp: "v=0 video".into(),
            },
            &alice(),
        )
        .unwrap();
        assert_eq!(applied.next_status, None);
        assert_eq!(applied.media_kind, Some(MediaKind::Video));
        match &applied.signals[0].body {
            SignalBody::Offer { sdp, renegotiate } => {
                assert!(*renegotiate);
                assert_eq!(sdp, "v=0 video");
            }
            other => panic!("expected offer, got {:?}", other),
        }
    }

    #[test]
    fn upgrade_is_never_a_downgrade() {
        let mut s = session();
        s.status = CallStatus::Accepted;
        s.media_kind = MediaKind::Video;
        let err = apply(
            &s,
            &SessionEvent::Upgrade {
                by: alice(),
                to: MediaKind::Audio,
                sdp: String::new(),
            },
            &alice(),
        )
        .unwrap_err();
        assert!(matches!(err, SignalError::IllegalTransition { .. }));
    }

    #[test]
    fn upgrade_while_ringing_is_illegal() {
        let s = session();
        let err = apply(
            &s,
            &SessionEvent::Upgrade {
                by: alice(),
                to: MediaKind::Video,
                sdp: String::new(),
            },
            &alice(),
        )
        .unwrap_err();
        assert!(matches!(err, SignalError::IllegalTransition { .. }));
    }

    #[test]
    fn no_event_sequence_regresses_status() {
        // Drive a session to ENDED, then throw every event at it.
        let mut s = session();
        s.status = CallStatus::Ended;
        let events = [
            SessionEvent::Decline { by: bob() },
            SessionEvent::Cancel {
                by: alice(),
                reason: CancelReason::CallerCancelled,
            },
            SessionEvent::Expire,
            SessionEvent::Hangup { by: bob() },
            SessionEvent::RemoteAccepted,
            SessionEvent::RemoteDeclined,
            SessionEvent::RemoteHangup,
        ];
        for event in &events {
            let applied = apply(&s, event, &alice()).unwrap();
            assert!(applied.is_noop(), "{:?} was not a no-op", event.kind());
        }
    }

    #[test]
    fn glare_smaller_session_id_wins() {
        let mut a = session();
        let mut b = CallSession::new("bob".into(), "alice".into(), "ch-1".into(), MediaKind::Audio);
        a.session_id = SessionId("call-aaa".into());
        b.session_id = SessionId("call-bbb".into());

        let outcome = resolve_glare(&a, &b).unwrap();
        assert_eq!(outcome.winner, a.session_id);
        assert_eq!(outcome.loser, b.session_id);

        // Symmetric in argument order.
        let outcome2 = resolve_glare(&b, &a).unwrap();
        assert_eq!(outcome, outcome2);
    }

    #[test]
    fn glare_requires_mirrored_ringing_sessions() {
        let a = session();
        let mut b = CallSession::new("bob".into(), "alice".into(), "ch-1".into(), MediaKind::Audio);
        b.status = CallStatus::Accepted;
        assert!(resolve_glare(&a, &b).is_none());

        // Different channel is not glare.
        let c = CallSession::new("bob".into(), "alice".into(), "ch-2".into(), MediaKind::Audio);
        assert!(resolve_glare(&a, &c).is_none());
    }
}
