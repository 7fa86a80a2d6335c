//! # ringline-call-engine
//!
//! The coordination layer over `ringline-signal-core`'s state machine
//! and `ringline-signal-transport`'s adapters: policy gating, lifecycle
//! operations, ring timers and glare resolution, notification dispatch,
//! negotiation relay, and cleanup supervision.
//!
//! One [`CallCoordinator`] runs per signed-in user. The transport, the
//! interaction policy, the notification sink, and the event handler are
//! all injected at construction.

pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod negotiation;
pub mod notify;
pub mod policy;

pub use cleanup::CleanupSupervisor;
pub use config::EngineConfig;
pub use coordinator::CallCoordinator;
pub use events::{
    CallEventHandler, CallStatusInfo, IncomingCallInfo, NegotiationPayload, NoopHandler,
};
pub use negotiation::NegotiationRelay;
pub use notify::{NotificationDispatcher, NotificationSink, NullSink, OutgoingCallInfo};
pub use policy::{AllowAll, BlockListPolicy, BlockLists, BlockStore, InteractionPolicy, MemoryBlockStore};
