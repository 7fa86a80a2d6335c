//! State table types: keys, events, transitions, and the table itself.

use crate::types::{CallStatus, CancelReason, MediaKind, Role, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Key for looking up transitions in the state table.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StateKey {
    pub role: Role,
    pub status: CallStatus,
    pub event: EventKind,
}

/// Event discriminant used to key the table. Runtime payloads live on
/// [`SessionEvent`]; the table matches on kind alone.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Accept,
    Decline,
    Cancel,
    Expire,
    Hangup,
    Upgrade,
    RemoteAccepted,
    RemoteDeclined,
    RemoteHangup,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Accept => "Accept",
            EventKind::Decline => "Decline",
            EventKind::Cancel => "Cancel",
            EventKind::Expire => "Expire",
            EventKind::Hangup => "Hangup",
            EventKind::Upgrade => "Upgrade",
            EventKind::RemoteAccepted => "RemoteAccepted",
            EventKind::RemoteDeclined => "RemoteDeclined",
            EventKind::RemoteHangup => "RemoteHangup",
        }
    }

    /// The status this event drives a session toward, when it has one.
    /// Used by the executor to collapse duplicate deliveries into no-ops.
    pub fn produced_status(&self) -> Option<CallStatus> {
        match self {
            EventKind::Accept | EventKind::RemoteAccepted => Some(CallStatus::Accepted),
            EventKind::Decline | EventKind::RemoteDeclined => Some(CallStatus::Declined),
            EventKind::Cancel => Some(CallStatus::Cancelled),
            EventKind::Expire => Some(CallStatus::Expired),
            EventKind::Hangup | EventKind::RemoteHangup => Some(CallStatus::Ended),
            EventKind::Upgrade => None,
        }
    }

    /// User-initiated events fail loudly on illegal states; system and
    /// remote events are treated as benign races.
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            EventKind::Accept
                | EventKind::Decline
                | EventKind::Cancel
                | EventKind::Hangup
                | EventKind::Upgrade
        )
    }
}

/// A state-machine input: a local action, the ringing timer, or an
/// observation of the remote side's signal.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Accept { by: UserId },
    Decline { by: UserId },
    Cancel { by: UserId, reason: CancelReason },
    Expire,
    Hangup { by: UserId },
    Upgrade { by: UserId, to: MediaKind, sdp: String },
    RemoteAccepted,
    RemoteDeclined,
    RemoteHangup,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Accept { .. } => EventKind::Accept,
            SessionEvent::Decline { .. } => EventKind::Decline,
            SessionEvent::Cancel { .. } => EventKind::Cancel,
            SessionEvent::Expire => EventKind::Expire,
            SessionEvent::Hangup { .. } => EventKind::Hangup,
            SessionEvent::Upgrade { .. } => EventKind::Upgrade,
            SessionEvent::RemoteAccepted => EventKind::RemoteAccepted,
            SessionEvent::RemoteDeclined => EventKind::RemoteDeclined,
            SessionEvent::RemoteHangup => EventKind::RemoteHangup,
        }
    }

    /// The participant performing the event, when it is a local action.
    pub fn actor(&self) -> Option<&UserId> {
        match self {
            SessionEvent::Accept { by }
            | SessionEvent::Decline { by }
            | SessionEvent::Cancel { by, .. }
            | SessionEvent::Hangup { by }
            | SessionEvent::Upgrade { by, .. } => Some(by),
            _ => None,
        }
    }
}

/// Outbound signals a transition emits, as templates the executor
/// renders against the concrete session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTemplate {
    /// CALL_DECLINED to the caller.
    DeclinedToCaller,
    /// HANGUP to the peer of the acting/local side.
    HangupToPeer,
    /// STATUS_UPDATE carrying the post-transition status, to the peer.
    StatusToPeer,
    /// OFFER with `renegotiate = true`, to the peer of the upgrading side.
    RenegotiateOfferToPeer,
}

/// Side effects the engine performs after a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CancelRingTimer,
    ScheduleCleanup,
    BeginNegotiation,
    DismissPrompt,
}

/// What happens when an event occurs in a state.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Next status, if the transition changes it.
    pub next_status: Option<CallStatus>,
    /// Signals to publish after the transition.
    pub signals: Vec<SignalTemplate>,
    /// Engine-side effects.
    pub effects: Vec<Effect>,
}

/// Master state table: the single source of truth for legal transitions.
pub struct StateTable {
    transitions: HashMap<StateKey, Transition>,
}

impl StateTable {
    pub fn new() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        self.transitions.insert(key, transition);
    }

    pub fn get(&self, key: &StateKey) -> Option<&Transition> {
        self.transitions.get(key)
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.transitions.contains_key(key)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Consistency checks: terminal states must have no outgoing
    /// transitions, non-terminal states must have at least one, and no
    /// transition may lower the status rank.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut states_with_exits: HashSet<CallStatus> = HashSet::new();
        for (key, transition) in &self.transitions {
            states_with_exits.insert(key.status);

            if key.status.is_terminal() {
                errors.push(format!(
                    "terminal status {:?} has outgoing transition on {:?}",
                    key.status, key.event
                ));
            }

            if let Some(next) = transition.next_status {
                if next.rank() < key.status.rank() {
                    errors.push(format!(
                        "transition {:?} --{:?}--> {:?} regresses status",
                        key.status, key.event, next
                    ));
                }
            }
        }

        for status in [CallStatus::Ringing, CallStatus::Accepted] {
            if !states_with_exits.contains(&status) {
                errors.push(format!("status {:?} has no exit transitions", status));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
