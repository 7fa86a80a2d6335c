//! # ringline-signal-core
//!
//! Data model and lifecycle state machine for peer-to-peer call
//! signaling. This crate is transport-free: the state machine is a pure
//! function over (session, event), and everything with I/O lives in
//! `ringline-signal-transport` and `ringline-call-engine`.
//!
//! The lifecycle: RINGING -> {ACCEPTED, DECLINED, CANCELLED, EXPIRED},
//! ACCEPTED -> ENDED. Terminal statuses accept no further transitions;
//! duplicate and out-of-order signal deliveries collapse to no-ops.

pub mod errors;
pub mod state_machine;
pub mod state_table;
pub mod store;
pub mod types;

pub use errors::{SignalError, SignalResult};
pub use state_machine::{apply, resolve_glare, Applied, GlareOutcome};
pub use state_table::{Effect, EventKind, SessionEvent, StateKey, Transition, MASTER_TABLE};
pub use store::SessionStore;
pub use types::{
    CallSession, CallStatus, CancelReason, ChannelId, MediaKind, Role, SessionId, Signal,
    SignalBody, SignalKind, UserId,
};
