//! Session phase machine
//!
//! `setup -> voting -> completed`, and back to `setup` only through
//! [`Room::reset_session`]. Each transition checks its precondition first
//! and leaves the room untouched when it does not hold.

use crate::models::{Phase, Room, Round};
use crate::outcome::Rejection;

/// Result of applying a transition to a room in place
pub type Transition = std::result::Result<(), Rejection>;

impl Room {
    fn require_phase(&self, expected: Phase) -> Transition {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Rejection::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    /// Append subjects to the backlog in the given order. Labels are
    /// trimmed and blank ones dropped.
    pub fn add_subjects<I, S>(&mut self, subjects: I) -> Transition
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.require_phase(Phase::Setup)?;

        let labels: Vec<String> = subjects
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(Rejection::EmptySubject);
        }

        self.subjects.extend(labels);
        Ok(())
    }

    /// Remove one backlog entry, shifting later entries down
    pub fn remove_subject(&mut self, index: usize) -> Transition {
        self.require_phase(Phase::Setup)?;

        if index >= self.subjects.len() {
            return Err(Rejection::IndexOutOfRange {
                index,
                len: self.subjects.len(),
            });
        }

        self.subjects.remove(index);
        Ok(())
    }

    /// Open the first round. An empty backlog cannot start a session.
    pub fn start_session(&mut self) -> Transition {
        self.require_phase(Phase::Setup)?;

        let first = self.subjects.first().cloned().ok_or(Rejection::EmptyBacklog)?;
        self.rounds.push(Round::open(first));
        self.current_round_index = Some(0);
        self.phase = Phase::Voting;
        Ok(())
    }

    /// Open the round for the next subject, or complete the session when
    /// the backlog is exhausted. The current round does not need to be
    /// revealed first.
    pub fn next_round(&mut self) -> Transition {
        self.require_phase(Phase::Voting)?;

        let next = self.current_round_index.map_or(0, |i| i + 1);
        match self.subjects.get(next).cloned() {
            Some(subject) => {
                self.rounds.push(Round::open(subject));
                self.current_round_index = Some(next);
            }
            None => self.phase = Phase::Completed,
        }
        Ok(())
    }

    /// Clear backlog and history. Participants and config are kept.
    pub fn reset_session(&mut self) -> Transition {
        self.subjects.clear();
        self.rounds.clear();
        self.current_round_index = None;
        self.phase = Phase::Setup;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeckType, Participant, Role, RoomConfig, RoomId, RoundStatus};

    fn make_room(subjects: &[&str]) -> Room {
        let mut room = Room::new(
            RoomId::parse("r1").unwrap(),
            Participant::new("p1", "Admin", Role::Admin),
            RoomConfig::new(DeckType::Fibonacci, false),
        );
        if !subjects.is_empty() {
            room.add_subjects(subjects).unwrap();
        }
        room
    }

    #[test]
    fn test_add_subjects_keeps_order_and_duplicates() {
        let mut room = make_room(&["A", "B"]);
        room.add_subjects(["A", "  C  ", ""]).unwrap();
        assert_eq!(room.subjects, vec!["A", "B", "A", "C"]);
    }

    #[test]
    fn test_add_only_blank_subjects_rejected() {
        let mut room = make_room(&[]);
        assert_eq!(room.add_subjects(["", "   "]), Err(Rejection::EmptySubject));
        assert!(room.subjects.is_empty());
    }

    #[test]
    fn test_remove_subject_shifts_indices() {
        let mut room = make_room(&["A", "B", "C"]);
        room.remove_subject(1).unwrap();
        assert_eq!(room.subjects, vec!["A", "C"]);
    }

    #[test]
    fn test_remove_subject_out_of_range_is_noop() {
        let mut room = make_room(&["A", "B"]);
        let before = room.clone();
        assert_eq!(
            room.remove_subject(2),
            Err(Rejection::IndexOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(room, before);
    }

    #[test]
    fn test_backlog_frozen_outside_setup() {
        let mut room = make_room(&["A"]);
        room.start_session().unwrap();
        let before = room.clone();

        assert!(matches!(room.add_subjects(["B"]), Err(Rejection::WrongPhase { .. })));
        assert!(matches!(room.remove_subject(0), Err(Rejection::WrongPhase { .. })));
        assert_eq!(room, before);
    }

    #[test]
    fn test_start_with_empty_backlog_is_noop() {
        let mut room = make_room(&[]);
        assert_eq!(room.start_session(), Err(Rejection::EmptyBacklog));
        assert_eq!(room.phase, Phase::Setup);
        assert!(room.rounds.is_empty());
        assert_eq!(room.current_round_index, None);
    }

    #[test]
    fn test_start_session_opens_first_round() {
        let mut room = make_room(&["A", "B"]);
        room.start_session().unwrap();

        assert_eq!(room.phase, Phase::Voting);
        assert_eq!(room.rounds.len(), 1);
        assert_eq!(room.rounds[0].subject, "A");
        assert_eq!(room.rounds[0].status, RoundStatus::Voting);
        assert!(room.rounds[0].votes.is_empty());
        assert_eq!(room.current_round_index, Some(0));
    }

    #[test]
    fn test_start_session_twice_rejected() {
        let mut room = make_room(&["A", "B"]);
        room.start_session().unwrap();
        assert!(matches!(room.start_session(), Err(Rejection::WrongPhase { .. })));
        assert_eq!(room.rounds.len(), 1);
    }

    #[test]
    fn test_next_round_advances_through_backlog() {
        let mut room = make_room(&["A", "B"]);
        room.start_session().unwrap();
        room.next_round().unwrap();

        assert_eq!(room.rounds.len(), 2);
        assert_eq!(room.rounds[1].subject, "B");
        assert_eq!(room.current_round_index, Some(1));
        assert_eq!(room.phase, Phase::Voting);
    }

    #[test]
    fn test_next_round_on_last_subject_completes() {
        let mut room = make_room(&["A", "B"]);
        room.start_session().unwrap();
        room.next_round().unwrap();
        room.next_round().unwrap();

        assert_eq!(room.phase, Phase::Completed);
        assert_eq!(room.rounds.len(), 2);
        assert_eq!(room.current_round_index, Some(1));

        assert!(matches!(room.next_round(), Err(Rejection::WrongPhase { .. })));
        assert_eq!(room.rounds.len(), 2);
    }

    #[test]
    fn test_next_round_does_not_require_reveal() {
        let mut room = make_room(&["A", "B"]);
        room.start_session().unwrap();
        assert_eq!(room.rounds[0].status, RoundStatus::Voting);

        room.next_round().unwrap();
        assert_eq!(room.current_round_index, Some(1));
        assert_eq!(room.rounds[0].status, RoundStatus::Voting);
    }

    #[test]
    fn test_next_round_in_setup_rejected() {
        let mut room = make_room(&["A"]);
        assert!(matches!(room.next_round(), Err(Rejection::WrongPhase { .. })));
        assert!(room.rounds.is_empty());
    }

    #[test]
    fn test_reset_from_completed() {
        let mut room = make_room(&["A"]);
        room.upsert_participant(Participant::new("p2", "Bob", Role::Member));
        room.start_session().unwrap();
        room.next_round().unwrap();
        assert_eq!(room.phase, Phase::Completed);

        room.reset_session().unwrap();
        assert_eq!(room.phase, Phase::Setup);
        assert!(room.subjects.is_empty());
        assert!(room.rounds.is_empty());
        assert_eq!(room.current_round_index, None);
        assert_eq!(room.participants.len(), 2);
        assert_eq!(room.config, RoomConfig::new(DeckType::Fibonacci, false));
    }
}
