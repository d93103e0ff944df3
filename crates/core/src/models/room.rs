//! Room model - the unit of isolation for one estimation session

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Participant, ParticipantId, RoomConfig, Votes};
use crate::error::{Error, Result};

/// Maximum length of a room id
const MAX_ROOM_ID_LEN: usize = 64;

/// Length of generated room codes
const ROOM_CODE_LEN: usize = 8;

/// Short shareable room identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Validate a client-supplied room id
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_ROOM_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidRoomId(id.to_string()))
        }
    }

    /// Generate a fresh lowercase room code
    pub fn generate() -> Self {
        let code: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(ROOM_CODE_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        RoomId::parse(&id)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room-level stage of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Curating the backlog
    Setup,
    /// Running rounds
    Voting,
    /// Every subject has been voted
    Completed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Voting => "voting",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Voting,
    Revealed,
}

/// Vote collection for exactly one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: Uuid,
    pub subject: String,
    pub status: RoundStatus,
    pub votes: Votes,
    pub opened_at: DateTime<Utc>,
}

impl Round {
    pub fn open(subject: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            status: RoundStatus::Voting,
            votes: Votes::new(),
            opened_at: Utc::now(),
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.status == RoundStatus::Revealed
    }
}

/// A room: participants, backlog and round history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub admin_id: ParticipantId,
    pub config: RoomConfig,
    pub participants: Vec<Participant>,
    pub subjects: Vec<String>,
    pub phase: Phase,
    pub rounds: Vec<Round>,
    /// `-1` on the wire when no round is active
    #[serde(with = "round_index")]
    pub current_round_index: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Create a room whose only participant is its admin
    pub fn new(id: RoomId, creator: Participant, config: RoomConfig) -> Self {
        let admin = Participant {
            role: super::Role::Admin,
            ..creator
        };
        Self {
            id,
            admin_id: admin.id.clone(),
            config,
            participants: vec![admin],
            subjects: Vec::new(),
            phase: Phase::Setup,
            rounds: Vec::new(),
            current_round_index: None,
            created_at: Utc::now(),
        }
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == *id)
    }

    /// Participants whose role is not observer
    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }

    pub fn active_participant_count(&self) -> usize {
        self.active_participants().count()
    }

    /// Add a participant, or overwrite name and role of an existing one.
    /// Returns `true` if the participant is new to the room.
    pub(crate) fn upsert_participant(&mut self, participant: Participant) -> bool {
        match self.participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => {
                existing.display_name = participant.display_name;
                existing.role = participant.role;
                false
            }
            None => {
                self.participants.push(participant);
                true
            }
        }
    }

    /// Returns `true` if the participant was present
    pub(crate) fn remove_participant(&mut self, id: &ParticipantId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != *id);
        self.participants.len() != before
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round_index.and_then(|i| self.rounds.get(i))
    }

    pub(crate) fn current_round_mut(&mut self) -> Option<&mut Round> {
        match self.current_round_index {
            Some(i) => self.rounds.get_mut(i),
            None => None,
        }
    }
}

/// Serde adapter mapping `Option<usize>` to the `-1`-sentinel integer
mod round_index {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(index: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match index {
            Some(i) => serializer.serialize_u64(*i as u64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            -1 => Ok(None),
            i if i >= 0 => usize::try_from(i).map(Some).map_err(de::Error::custom),
            other => Err(de::Error::custom(format!("invalid round index {}", other))),
        }
    }
}
