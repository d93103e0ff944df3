//! Error types for Pokerroom Core

use thiserror::Error;

use crate::models::RoomId;

/// Structural failures. Precondition mismatches are not errors; they
/// surface as [`crate::Outcome::Rejected`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Room already exists: {0}")]
    AlreadyExists(RoomId),

    #[error("Invalid room id: {0:?}")]
    InvalidRoomId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
