//! Room configuration and card decks

use serde::{Deserialize, Serialize};

use super::VoteValue;

/// Label of the "pass / need a break" card present in every deck
pub const COFFEE_CARD: &str = "☕";

/// Which deck of cards a room votes with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeckType {
    #[default]
    Fibonacci,
    Tshirt,
    Sequential,
}

impl DeckType {
    /// Cards in display order
    pub fn deck(&self) -> Deck {
        let mut cards: Vec<VoteValue> = match self {
            DeckType::Fibonacci => [1, 2, 3, 5, 8, 13, 21].into_iter().map(VoteValue::from).collect(),
            DeckType::Tshirt => ["PP", "P", "M", "G", "GG", "XGG"]
                .into_iter()
                .map(|size| VoteValue::Marker(size.to_string()))
                .collect(),
            DeckType::Sequential => (1..=10).map(VoteValue::from).collect(),
        };
        cards.push(VoteValue::Marker(COFFEE_CARD.to_string()));
        Deck {
            deck_type: *self,
            cards,
        }
    }
}

/// The playable cards of one deck type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub deck_type: DeckType,
    pub cards: Vec<VoteValue>,
}

/// Per-room settings, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub deck_type: DeckType,
    /// Reveal a round as soon as every active participant has voted
    pub auto_reveal: bool,
}

impl RoomConfig {
    pub fn new(deck_type: DeckType, auto_reveal: bool) -> Self {
        Self {
            deck_type,
            auto_reveal,
        }
    }
}
