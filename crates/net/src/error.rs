//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-framed payload that is not a valid message; the stream is
    /// still in sync
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Server full")]
    ServerFull,

    #[error(transparent)]
    Core(#[from] pokerroom_core::Error),
}
