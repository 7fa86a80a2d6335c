//! Dedicated signaling relay: NDJSON-over-TCP protocol, server, client.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{PresenceEvent, RelayClient};
pub use protocol::{ClientEvent, ServerEvent};
pub use server::{Disconnect, RelayServer, RelayState};
