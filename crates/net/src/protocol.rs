//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Room actions carry no room or participant id: both come from the
//! connection's binding, set by a successful `join`.

use pokerroom_core::{Deck, Participant, Room, RoomConfig, RoomId, Tally, VoteValue};
use serde::{Deserialize, Serialize};

/// Acknowledgment text for a join against a missing room without config
pub const ROOM_NOT_FOUND: &str = "room not found";

/// Messages sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a room, creating it when absent and a config is supplied
    Join {
        room_id: RoomId,
        participant: Participant,
        #[serde(default)]
        config: Option<RoomConfig>,
    },
    AddSubjects { subjects: Vec<String> },
    RemoveSubject { index: usize },
    StartSession,
    NextRound,
    ResetSession,
    CastVote { value: VoteValue },
    RevealVotes,
    /// Leave the bound room without closing the connection
    Leave,
    Ping,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Direct answer to `join`, sent to the joiner only
    JoinAck {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<Room>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deck: Option<Deck>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Full room snapshot, pushed to every connection in the room.
    /// Carries the active round's statistics once it is revealed.
    RoomState {
        room: Room,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tally: Option<Tally>,
    },

    /// A room action named a room that no longer exists
    RoomNotFound { room_id: RoomId },

    /// Request could not be processed
    Error { message: String },

    Pong,

    /// Server is shutting down
    ServerShutdown,
}

impl ServerMessage {
    pub fn join_accepted(room: Room) -> Self {
        let deck = room.config.deck_type.deck();
        ServerMessage::JoinAck {
            success: true,
            room: Some(room),
            deck: Some(deck),
            error: None,
        }
    }

    pub fn room_state(room: Room) -> Self {
        let tally = room
            .current_round()
            .and_then(|round| Tally::for_revealed(round, room.active_participant_count()));
        ServerMessage::RoomState { room, tally }
    }

    pub fn join_rejected(reason: impl Into<String>) -> Self {
        ServerMessage::JoinAck {
            success: false,
            room: None,
            deck: None,
            error: Some(reason.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
