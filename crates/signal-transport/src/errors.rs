//! Transport-level errors.

use ringline_signal_core::UserId;
use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Recipient's address is unknown or the recipient is offline.
    #[error("recipient {user} is unreachable")]
    Unavailable { user: UserId },

    /// The transport link itself is down.
    #[error("transport link down: {0}")]
    LinkDown(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
