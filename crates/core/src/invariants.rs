//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible room states during
//! development. These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::{Phase, Room};

/// Validate that a live Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    // Index is either unset or points into the history
    debug_assert!(
        room.current_round_index.map_or(true, |i| i < room.rounds.len()),
        "Room {} has round index {:?} but {} rounds",
        room.id,
        room.current_round_index,
        room.rounds.len()
    );

    // One round per started subject, in backlog order
    debug_assert!(
        room.rounds.len() <= room.subjects.len(),
        "Room {} has {} rounds for {} subjects",
        room.id,
        room.rounds.len(),
        room.subjects.len()
    );
    debug_assert!(
        room.rounds
            .iter()
            .zip(&room.subjects)
            .all(|(round, subject)| round.subject == *subject),
        "Room {} has a round whose subject does not match the backlog",
        room.id
    );

    // Setup never carries history
    debug_assert!(
        room.phase != Phase::Setup || (room.rounds.is_empty() && room.current_round_index.is_none()),
        "Room {} is in setup but has round history",
        room.id
    );

    // Voting always has an active round
    debug_assert!(
        room.phase == Phase::Setup || room.current_round_index.is_some(),
        "Room {} is in {} without an active round",
        room.id,
        room.phase
    );

    // A live room is never empty
    debug_assert!(
        !room.participants.is_empty(),
        "Room {} is live with no participants",
        room.id
    );

    let mut seen = HashSet::new();
    debug_assert!(
        room.participants.iter().all(|p| seen.insert(&p.id)),
        "Room {} has duplicate participant ids",
        room.id
    );
}
