//! Tagged results of room transitions

use thiserror::Error;

use crate::models::{Phase, Room};

/// Why a transition was skipped. Not an error: the room is left unchanged
/// and nothing is broadcast.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("expected phase {expected}, room is in {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("backlog is empty")]
    EmptyBacklog,

    #[error("subject index {index} out of range (backlog has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no active round")]
    NoActiveRound,

    #[error("round already revealed")]
    RoundRevealed,

    #[error("participant is not in the room")]
    UnknownParticipant,

    #[error("observers cannot vote")]
    ObserverCannotVote,

    #[error("no non-blank subject given")]
    EmptySubject,
}

/// Result of a room-scoped operation routed through the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The transition happened; carries the new snapshot
    Applied(Room),
    /// No room with that id
    NotFound,
    /// Precondition not met; room unchanged
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn room(&self) -> Option<&Room> {
        match self {
            Outcome::Applied(room) => Some(room),
            _ => None,
        }
    }

    pub fn into_room(self) -> Option<Room> {
        match self {
            Outcome::Applied(room) => Some(room),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Outcome::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result of a participant leaving
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// Participant removed; room survives
    Left(Room),
    /// Last participant left; room no longer exists
    Destroyed,
    NotFound,
    Rejected(Rejection),
}
