//! Vote values and the per-round vote collection

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ParticipantId;

/// A card played by a participant.
///
/// On the wire a vote is either a JSON number or a JSON string. Strings
/// that read as a finite number are treated as numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteValue {
    Numeric(f64),
    /// Symbolic card such as `☕` or a t-shirt size
    Marker(String),
}

impl VoteValue {
    /// Parse a card label, preferring a numeric reading
    pub fn parse(label: &str) -> Self {
        match label.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => VoteValue::Numeric(n),
            _ => VoteValue::Marker(label.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VoteValue::Numeric(n) => Some(*n),
            VoteValue::Marker(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, VoteValue::Numeric(_))
    }
}

impl From<f64> for VoteValue {
    fn from(n: f64) -> Self {
        VoteValue::Numeric(n)
    }
}

impl From<i32> for VoteValue {
    fn from(n: i32) -> Self {
        VoteValue::Numeric(f64::from(n))
    }
}

impl From<&str> for VoteValue {
    fn from(label: &str) -> Self {
        VoteValue::parse(label)
    }
}

/// Whole numbers print without a fractional part (`8`, not `8.0`)
fn whole(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteValue::Numeric(n) => match whole(*n) {
                Some(i) => write!(f, "{}", i),
                None => write!(f, "{}", n),
            },
            VoteValue::Marker(label) => f.write_str(label),
        }
    }
}

impl Serialize for VoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VoteValue::Numeric(n) => match whole(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            VoteValue::Marker(label) => serializer.serialize_str(label),
        }
    }
}

struct VoteValueVisitor;

impl<'de> Visitor<'de> for VoteValueVisitor {
    type Value = VoteValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a card label")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<VoteValue, E> {
        Ok(VoteValue::Numeric(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<VoteValue, E> {
        Ok(VoteValue::Numeric(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<VoteValue, E> {
        if v.is_finite() {
            Ok(VoteValue::Numeric(v))
        } else {
            Err(E::custom("vote must be a finite number"))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<VoteValue, E> {
        Ok(VoteValue::parse(v))
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VoteValueVisitor)
    }
}

/// Votes of one round, kept in the order participants first voted.
///
/// Re-voting replaces the value but keeps the original position, so the
/// first-seen order of distinct values stays stable for the distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Votes {
    entries: Vec<(ParticipantId, VoteValue)>,
}

impl Votes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote, overwriting any earlier vote from the same participant
    pub fn insert(&mut self, participant_id: ParticipantId, value: VoteValue) {
        match self.entries.iter_mut().find(|(id, _)| *id == participant_id) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((participant_id, value)),
        }
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<&VoteValue> {
        self.entries
            .iter()
            .find(|(id, _)| id == participant_id)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.get(participant_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &VoteValue)> {
        self.entries.iter().map(|(id, value)| (id, value))
    }

    /// Values in first-vote order
    pub fn values(&self) -> impl Iterator<Item = &VoteValue> {
        self.entries.iter().map(|(_, value)| value)
    }
}

impl<K: Into<ParticipantId>, V: Into<VoteValue>> FromIterator<(K, V)> for Votes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut votes = Votes::new();
        for (id, value) in iter {
            votes.insert(id.into(), value.into());
        }
        votes
    }
}

impl Serialize for Votes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, value) in &self.entries {
            map.serialize_entry(id, value)?;
        }
        map.end()
    }
}

struct VotesVisitor;

impl<'de> Visitor<'de> for VotesVisitor {
    type Value = Votes;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of participant id to vote")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Votes, A::Error> {
        let mut votes = Votes::new();
        while let Some((id, value)) = access.next_entry::<ParticipantId, VoteValue>()? {
            votes.insert(id, value);
        }
        Ok(votes)
    }
}

impl<'de> Deserialize<'de> for Votes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(VotesVisitor)
    }
}
