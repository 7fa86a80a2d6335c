//! Wire protocol for the dedicated signaling relay.
//!
//! Newline-delimited JSON, one tagged event per line. Exactly one relay
//! target per outbound event; the server silently drops events whose
//! target it does not know.

use ringline_signal_core::{CallStatus, MediaKind};
use serde::{Deserialize, Serialize};

/// Client -> server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Must be the first event on a connection.
    Authenticate {
        user_id: String,
        channel_id: String,
    },
    Offer {
        target_user_id: String,
        call_id: String,
        sdp: String,
        renegotiate: bool,
    },
    Answer {
        target_user_id: String,
        call_id: String,
        sdp: String,
    },
    IceCandidate {
        target_user_id: String,
        call_id: String,
        candidate: String,
    },
    Hangup {
        target_user_id: String,
        call_id: String,
    },
    CallDeclined {
        target_user_id: String,
        call_id: String,
    },
    CallNotification {
        target_user_id: String,
        call_id: String,
        channel_id: String,
        media_kind: MediaKind,
    },
    StatusUpdate {
        target_user_id: String,
        call_id: String,
        status: CallStatus,
    },
}

impl ClientEvent {
    /// The user the event should be relayed to, if it is routable.
    pub fn target(&self) -> Option<&str> {
        match self {
            ClientEvent::Authenticate { .. } => None,
            ClientEvent::Offer { target_user_id, .. }
            | ClientEvent::Answer { target_user_id, .. }
            | ClientEvent::IceCandidate { target_user_id, .. }
            | ClientEvent::Hangup { target_user_id, .. }
            | ClientEvent::CallDeclined { target_user_id, .. }
            | ClientEvent::CallNotification { target_user_id, .. }
            | ClientEvent::StatusUpdate { target_user_id, .. } => Some(target_user_id),
        }
    }

    /// Rewrite a routable event into its server -> client mirror,
    /// stamping the sender.
    pub fn into_relayed(self, from: String) -> Option<ServerEvent> {
        match self {
            ClientEvent::Authenticate { .. } => None,
            ClientEvent::Offer {
                call_id,
                sdp,
                renegotiate,
                ..
            } => Some(ServerEvent::Offer {
                from,
                call_id,
                sdp,
                renegotiate,
            }),
            ClientEvent::Answer { call_id, sdp, .. } => Some(ServerEvent::Answer {
                from,
                call_id,
                sdp,
            }),
            ClientEvent::IceCandidate {
                call_id, candidate, ..
            } => Some(ServerEvent::IceCandidate {
                from,
                call_id,
                candidate,
            }),
            ClientEvent::Hangup { call_id, .. } => Some(ServerEvent::Hangup { from, call_id }),
            ClientEvent::CallDeclined { call_id, .. } => {
                Some(ServerEvent::CallDeclined { from, call_id })
            }
            ClientEvent::CallNotification {
                call_id,
                channel_id,
                media_kind,
                ..
            } => Some(ServerEvent::CallNotification {
                from,
                call_id,
                channel_id,
                media_kind,
            }),
            ClientEvent::StatusUpdate {
                call_id, status, ..
            } => Some(ServerEvent::StatusUpdate {
                from,
                call_id,
                status,
            }),
        }
    }
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserJoined {
        user_id: String,
        channel_participants: Vec<String>,
    },
    UserLeft {
        user_id: String,
    },
    Offer {
        from: String,
        call_id: String,
        sdp: String,
        renegotiate: bool,
    },
    Answer {
        from: String,
        call_id: String,
        sdp: String,
    },
    IceCandidate {
        from: String,
        call_id: String,
        candidate: String,
    },
    Hangup {
        from: String,
        call_id: String,
    },
    CallDeclined {
        from: String,
        call_id: String,
    },
    CallNotification {
        from: String,
        call_id: String,
        channel_id: String,
        media_kind: MediaKind,
    },
    StatusUpdate {
        from: String,
        call_id: String,
        status: CallStatus,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_kebab_case_tags() {
        let json = serde_json::to_string(&ClientEvent::IceCandidate {
            target_user_id: "bob".into(),
            call_id: "call-1".into(),
            candidate: "candidate:1".into(),
        })
        .unwrap();
        assert!(json.contains(r#""event":"ice-candidate""#));

        let json = serde_json::to_string(&ClientEvent::CallDeclined {
            target_user_id: "bob".into(),
            call_id: "call-1".into(),
        })
        .unwrap();
        assert!(json.contains(r#""event":"call-declined""#));
    }

    #[test]
    fn relayed_offer_keeps_renegotiate_flag() {
        let event = ClientEvent::Offer {
            target_user_id: "bob".into(),
            call_id: "call-1".into(),
            sdp: "v=0".into(),
            renegotiate: true,
        };
        match event.into_relayed("alice".into()).unwrap() {
            ServerEvent::Offer {
                from, renegotiate, ..
            } => {
                assert_eq!(from, "alice");
                assert!(renegotiate);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn authenticate_is_not_routable() {
        let event = ClientEvent::Authenticate {
            user_id: "alice".into(),
            channel_id: "ch-1".into(),
        };
        assert!(event.target().is_none());
        assert!(event.into_relayed("alice".into()).is_none());
    }
}
