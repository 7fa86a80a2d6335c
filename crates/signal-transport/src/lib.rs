//! # ringline-signal-transport
//!
//! Transports for ringline signals behind one adapter seam:
//!
//! - [`bus::BusTransport`]: the realtime-store inbox model with
//!   per-user paths, retained records, and replay on subscription.
//! - [`relay::RelayClient`] / [`relay::RelayServer`]: a dedicated
//!   socket relay with an in-memory address book and channel presence.
//!
//! Which one backs an engine is injected configuration; the engine only
//! sees [`adapter::SignalTransport`].

pub mod adapter;
pub mod bus;
pub mod errors;
pub mod relay;

pub use adapter::{SignalStream, SignalTransport};
pub use bus::{BusTransport, SignalBus};
pub use errors::{TransportError, TransportResult};
pub use relay::{RelayClient, RelayServer};
