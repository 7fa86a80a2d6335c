//! The call lifecycle transitions.
//!
//! RINGING -> {ACCEPTED, DECLINED, CANCELLED, EXPIRED}, ACCEPTED -> ENDED.
//! DECLINED/CANCELLED/EXPIRED/ENDED are terminal and deliberately have no
//! entries here; the executor collapses late events on them into no-ops.

use super::builder::StateTableBuilder;
use super::types::{Effect, EventKind, SignalTemplate, Transition};
use crate::types::{CallStatus, Role};

pub fn add_ringing_transitions(builder: &mut StateTableBuilder) {
    // Callee answers. Negotiation starts once both sides observe ACCEPTED.
    builder.add_transition(
        Role::Callee,
        CallStatus::Ringing,
        EventKind::Accept,
        Transition {
            next_status: Some(CallStatus::Accepted),
            signals: vec![SignalTemplate::StatusToPeer],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::BeginNegotiation,
            ],
        },
    );

    builder.add_transition(
        Role::Callee,
        CallStatus::Ringing,
        EventKind::Decline,
        Transition {
            next_status: Some(CallStatus::Declined),
            signals: vec![SignalTemplate::DeclinedToCaller],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::ScheduleCleanup,
            ],
        },
    );

    builder.add_transition(
        Role::Caller,
        CallStatus::Ringing,
        EventKind::Cancel,
        Transition {
            next_status: Some(CallStatus::Cancelled),
            signals: vec![SignalTemplate::HangupToPeer],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::ScheduleCleanup,
            ],
        },
    );

    // Ringing timer fired. The only automatic transition.
    builder.add_for_both(
        CallStatus::Ringing,
        EventKind::Expire,
        Transition {
            next_status: Some(CallStatus::Expired),
            signals: vec![SignalTemplate::StatusToPeer],
            effects: vec![Effect::DismissPrompt, Effect::ScheduleCleanup],
        },
    );

    // Caller observes the callee's acceptance.
    builder.add_for_both(
        CallStatus::Ringing,
        EventKind::RemoteAccepted,
        Transition {
            next_status: Some(CallStatus::Accepted),
            signals: vec![],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::BeginNegotiation,
            ],
        },
    );

    // Caller observes the callee's decline.
    builder.add_for_both(
        CallStatus::Ringing,
        EventKind::RemoteDeclined,
        Transition {
            next_status: Some(CallStatus::Declined),
            signals: vec![],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::ScheduleCleanup,
            ],
        },
    );

    // HANGUP observed before a local ACCEPTED: the peer accepted and hung
    // up in quick succession (or cancelled). Valid history, lands on ENDED.
    builder.add_for_both(
        CallStatus::Ringing,
        EventKind::RemoteHangup,
        Transition {
            next_status: Some(CallStatus::Ended),
            signals: vec![],
            effects: vec![
                Effect::CancelRingTimer,
                Effect::DismissPrompt,
                Effect::ScheduleCleanup,
            ],
        },
    );
}

pub fn add_accepted_transitions(builder: &mut StateTableBuilder) {
    builder.add_for_both(
        CallStatus::Accepted,
        EventKind::Hangup,
        Transition {
            next_status: Some(CallStatus::Ended),
            signals: vec![SignalTemplate::HangupToPeer],
            effects: vec![Effect::ScheduleCleanup],
        },
    );

    builder.add_for_both(
        CallStatus::Accepted,
        EventKind::RemoteHangup,
        Transition {
            next_status: Some(CallStatus::Ended),
            signals: vec![],
            effects: vec![Effect::ScheduleCleanup],
        },
    );

    // Audio -> video. Status is untouched; the executor swaps the media
    // kind and the peer learns of it via the renegotiation offer.
    builder.add_for_both(
        CallStatus::Accepted,
        EventKind::Upgrade,
        Transition {
            next_status: None,
            signals: vec![SignalTemplate::RenegotiateOfferToPeer],
            effects: vec![],
        },
    );
}
