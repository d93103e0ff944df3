//! Room registry - process-wide table of live rooms
//!
//! Every room sits behind its own mutex, so operations on different rooms
//! never wait on each other and operations on the same room run one at a
//! time. The table lock only guards insertion and removal of entries.
//!
//! Lock order: table lock, then room lock. Never take the table lock while
//! holding a room lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::invariants::assert_room_invariants;
use crate::models::{Participant, ParticipantId, Room, RoomConfig, RoomId, VoteValue};
use crate::observer::RoomObserver;
use crate::outcome::{LeaveOutcome, Outcome, Rejection};
use crate::session::Transition;

/// A room plus its tombstone flag.
///
/// A slot is closed under its own lock when the last participant leaves,
/// before it is unlinked from the table; anyone still holding the `Arc`
/// then treats the room as gone.
struct RoomSlot {
    room: Room,
    closed: bool,
}

type SharedSlot = Arc<Mutex<RoomSlot>>;

/// How a join was satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The room did not exist; the caller created it and is its admin
    Created(Room),
    /// Joined or rejoined an existing room
    Joined(Room),
}

impl Admission {
    pub fn room(&self) -> &Room {
        match self {
            Admission::Created(room) | Admission::Joined(room) => room,
        }
    }

    pub fn into_room(self) -> Room {
        match self {
            Admission::Created(room) | Admission::Joined(room) => room,
        }
    }
}

/// Process-wide keyed collection of rooms
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, SharedSlot>>,
    observer: Option<Arc<dyn RoomObserver>>,
}

impl RoomRegistry {
    /// Create an empty registry without a change observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that reports applied changes to `observer`
    pub fn with_observer(observer: Arc<dyn RoomObserver>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            observer: Some(observer),
        }
    }

    fn slot(&self, id: &RoomId) -> Option<SharedSlot> {
        self.rooms.read().get(id).cloned()
    }

    fn notify_changed(&self, room: &Room) {
        if let Some(observer) = &self.observer {
            observer.room_changed(room);
        }
    }

    /// Snapshot of a live room
    pub fn get_room(&self, id: &RoomId) -> Option<Room> {
        let slot = self.slot(id)?;
        let guard = slot.lock();
        (!guard.closed).then(|| guard.room.clone())
    }

    /// Register a new room with `creator` as its admin and only participant
    pub fn create_room(
        &self,
        id: RoomId,
        creator: Participant,
        config: RoomConfig,
    ) -> Result<Room> {
        let mut rooms = self.rooms.write();
        if let Some(existing) = rooms.get(&id) {
            if !existing.lock().closed {
                return Err(Error::AlreadyExists(id));
            }
        }

        let slot = Arc::new(Mutex::new(RoomSlot {
            room: Room::new(id.clone(), creator, config),
            closed: false,
        }));
        let guard = slot.lock();
        rooms.insert(id.clone(), Arc::clone(&slot));
        drop(rooms);

        info!(room_id = %id, admin_id = %guard.room.admin_id, "Room created");
        assert_room_invariants(&guard.room);
        self.notify_changed(&guard.room);
        Ok(guard.room.clone())
    }

    /// Join an existing room. A participant whose id is already present
    /// rejoins: name and role are overwritten, nothing is duplicated.
    pub fn join(&self, id: &RoomId, participant: Participant) -> Result<Room> {
        let slot = self
            .slot(id)
            .ok_or_else(|| Error::RoomNotFound(id.clone()))?;
        let mut guard = slot.lock();
        if guard.closed {
            return Err(Error::RoomNotFound(id.clone()));
        }

        let participant_id = participant.id.clone();
        if guard.room.upsert_participant(participant) {
            info!(room_id = %id, participant_id = %participant_id, "Participant joined");
        } else {
            debug!(room_id = %id, participant_id = %participant_id, "Participant rejoined");
        }
        guard.room.settle_auto_reveal();

        assert_room_invariants(&guard.room);
        self.notify_changed(&guard.room);
        Ok(guard.room.clone())
    }

    /// Join `id`, creating it first when it does not exist and a config is
    /// supplied. Without a config a missing room is `RoomNotFound`.
    ///
    /// Races with a concurrent creator or with the room being destroyed are
    /// retried, so exactly one caller ever sees `Created` for a fresh room.
    pub fn join_or_create(
        &self,
        id: &RoomId,
        participant: Participant,
        config: Option<RoomConfig>,
    ) -> Result<Admission> {
        loop {
            match self.join(id, participant.clone()) {
                Ok(room) => return Ok(Admission::Joined(room)),
                Err(Error::RoomNotFound(_)) => {}
                Err(e) => return Err(e),
            }

            let Some(config) = config else {
                return Err(Error::RoomNotFound(id.clone()));
            };
            match self.create_room(id.clone(), participant.clone(), config) {
                Ok(room) => return Ok(Admission::Created(room)),
                Err(Error::AlreadyExists(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a participant. The room is destroyed when it becomes empty.
    pub fn leave(&self, id: &RoomId, participant_id: &ParticipantId) -> LeaveOutcome {
        let Some(slot) = self.slot(id) else {
            return LeaveOutcome::NotFound;
        };
        let mut guard = slot.lock();
        if guard.closed {
            return LeaveOutcome::NotFound;
        }
        if !guard.room.remove_participant(participant_id) {
            debug!(room_id = %id, participant_id = %participant_id, "Leave from non-participant ignored");
            return LeaveOutcome::Rejected(Rejection::UnknownParticipant);
        }
        info!(room_id = %id, participant_id = %participant_id, "Participant left");

        if guard.room.participants.is_empty() {
            guard.closed = true;
            drop(guard);

            // Notify under the table lock so no successor room can be
            // created under this id before observers forget the old one
            let mut rooms = self.rooms.write();
            if rooms.get(id).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                rooms.remove(id);
                info!(room_id = %id, "Room destroyed");
                if let Some(observer) = &self.observer {
                    observer.room_destroyed(id);
                }
            }
            return LeaveOutcome::Destroyed;
        }

        guard.room.settle_auto_reveal();
        assert_room_invariants(&guard.room);
        self.notify_changed(&guard.room);
        LeaveOutcome::Left(guard.room.clone())
    }

    /// Run one transition under the room's lock
    fn apply<F>(&self, id: &RoomId, op: &'static str, transition: F) -> Outcome
    where
        F: FnOnce(&mut Room) -> Transition,
    {
        let Some(slot) = self.slot(id) else {
            debug!(room_id = %id, op, "Room not found");
            return Outcome::NotFound;
        };
        let mut guard = slot.lock();
        if guard.closed {
            debug!(room_id = %id, op, "Room not found");
            return Outcome::NotFound;
        }

        match transition(&mut guard.room) {
            Ok(()) => {
                debug!(room_id = %id, op, phase = %guard.room.phase, "Transition applied");
                assert_room_invariants(&guard.room);
                self.notify_changed(&guard.room);
                Outcome::Applied(guard.room.clone())
            }
            Err(reason) => {
                debug!(room_id = %id, op, reason = %reason, "Transition rejected");
                Outcome::Rejected(reason)
            }
        }
    }

    pub fn add_subjects(&self, id: &RoomId, subjects: &[String]) -> Outcome {
        self.apply(id, "add_subjects", |room| room.add_subjects(subjects))
    }

    pub fn remove_subject(&self, id: &RoomId, index: usize) -> Outcome {
        self.apply(id, "remove_subject", |room| room.remove_subject(index))
    }

    pub fn start_session(&self, id: &RoomId) -> Outcome {
        self.apply(id, "start_session", Room::start_session)
    }

    pub fn next_round(&self, id: &RoomId) -> Outcome {
        self.apply(id, "next_round", Room::next_round)
    }

    pub fn reset_session(&self, id: &RoomId) -> Outcome {
        self.apply(id, "reset_session", Room::reset_session)
    }

    pub fn cast_vote(&self, id: &RoomId, participant_id: &ParticipantId, value: VoteValue) -> Outcome {
        self.apply(id, "cast_vote", |room| room.cast_vote(participant_id, value))
    }

    pub fn reveal_votes(&self, id: &RoomId) -> Outcome {
        self.apply(id, "reveal_votes", Room::reveal_votes)
    }

    /// Ids of live rooms
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeckType, Phase, Role, RoundStatus};
    use crate::observer::testing::RecordingObserver;
    use std::thread;

    fn room_id(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn admin(id: &str) -> Participant {
        Participant::new(id, "Admin", Role::Admin)
    }

    fn member(id: &str) -> Participant {
        Participant::new(id, id.to_uppercase(), Role::Member)
    }

    fn config(auto_reveal: bool) -> RoomConfig {
        RoomConfig::new(DeckType::Fibonacci, auto_reveal)
    }

    #[test]
    fn test_create_and_get() {
        let registry = RoomRegistry::new();
        let id = room_id("r1");
        assert!(registry.get_room(&id).is_none());

        let room = registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        assert_eq!(room.admin_id.as_str(), "p1");
        assert_eq!(registry.get_room(&id), Some(room));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_existing_fails() {
        let registry = RoomRegistry::new();
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        assert_eq!(
            registry.create_room(id.clone(), admin("p2"), config(true)),
            Err(Error::AlreadyExists(id))
        );
    }

    #[test]
    fn test_join_missing_room() {
        let registry = RoomRegistry::new();
        let id = room_id("nope");
        assert_eq!(registry.join(&id, member("p1")), Err(Error::RoomNotFound(id.clone())));
        assert_eq!(
            registry.join_or_create(&id, member("p1"), None),
            Err(Error::RoomNotFound(id))
        );
    }

    #[test]
    fn test_rejoin_does_not_duplicate() {
        let registry = RoomRegistry::new();
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        registry.join(&id, member("p2")).unwrap();
        let room = registry
            .join(&id, Participant::new("p2", "Renamed", Role::Observer))
            .unwrap();

        assert_eq!(room.participants.len(), 2);
        let p2 = room.participant(&"p2".into()).unwrap();
        assert_eq!(p2.display_name, "Renamed");
        assert_eq!(p2.role, Role::Observer);
    }

    #[test]
    fn test_join_or_create() {
        let registry = RoomRegistry::new();
        let id = room_id("r1");
        let first = registry.join_or_create(&id, admin("p1"), Some(config(false))).unwrap();
        assert!(matches!(first, Admission::Created(_)));

        // Config of a later joiner is ignored
        let second = registry.join_or_create(&id, member("p2"), Some(config(true))).unwrap();
        assert!(matches!(second, Admission::Joined(_)));
        assert!(!second.room().config.auto_reveal);
        assert_eq!(second.room().participants.len(), 2);
    }

    #[test]
    fn test_leave_removes_exactly_one_and_destroys_when_empty() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = RoomRegistry::with_observer(observer.clone());
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        registry.join(&id, member("p2")).unwrap();

        match registry.leave(&id, &"p1".into()) {
            LeaveOutcome::Left(room) => {
                assert_eq!(room.participants.len(), 1);
                assert_eq!(room.participants[0].id.as_str(), "p2");
            }
            other => panic!("expected Left, got {:?}", other),
        }
        assert_eq!(
            registry.leave(&id, &"ghost".into()),
            LeaveOutcome::Rejected(Rejection::UnknownParticipant)
        );

        assert_eq!(registry.leave(&id, &"p2".into()), LeaveOutcome::Destroyed);
        assert!(registry.get_room(&id).is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.leave(&id, &"p2".into()), LeaveOutcome::NotFound);
        assert_eq!(registry.start_session(&id), Outcome::NotFound);
        assert_eq!(observer.destroyed.lock().as_slice(), &[id]);
    }

    #[test]
    fn test_operations_on_missing_room() {
        let registry = RoomRegistry::new();
        let id = room_id("none");
        assert_eq!(registry.add_subjects(&id, &["A".to_string()]), Outcome::NotFound);
        assert_eq!(registry.cast_vote(&id, &"p1".into(), 5.into()), Outcome::NotFound);
        assert_eq!(registry.reveal_votes(&id), Outcome::NotFound);
    }

    #[test]
    fn test_full_session_flow() {
        let registry = RoomRegistry::new();
        let id = room_id("flow");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        registry.join(&id, member("p2")).unwrap();

        assert!(registry.add_subjects(&id, &["A".into(), "B".into()]).is_applied());
        let room = registry.start_session(&id).into_room().unwrap();
        assert_eq!(room.phase, Phase::Voting);

        assert!(registry.cast_vote(&id, &"p1".into(), 5.into()).is_applied());
        assert!(registry.reveal_votes(&id).is_applied());
        assert!(registry.next_round(&id).is_applied());
        let room = registry.next_round(&id).into_room().unwrap();
        assert_eq!(room.phase, Phase::Completed);
        assert_eq!(room.rounds.len(), 2);

        let room = registry.reset_session(&id).into_room().unwrap();
        assert_eq!(room.phase, Phase::Setup);
        assert_eq!(room.participants.len(), 2);
    }

    #[test]
    fn test_rejection_leaves_room_unchanged_and_silent() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = RoomRegistry::with_observer(observer.clone());
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        registry.add_subjects(&id, &["A".into()]);
        let notified = observer.changed.lock().len();
        let before = registry.get_room(&id).unwrap();

        assert_eq!(
            registry.remove_subject(&id, 5).rejection(),
            Some(Rejection::IndexOutOfRange { index: 5, len: 1 })
        );
        assert_eq!(registry.get_room(&id).unwrap(), before);
        assert_eq!(observer.changed.lock().len(), notified);
    }

    #[test]
    fn test_every_applied_transition_notifies() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = RoomRegistry::with_observer(observer.clone());
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();
        registry.join(&id, member("p2")).unwrap();
        registry.add_subjects(&id, &["A".into()]);
        registry.start_session(&id);

        let changed = observer.changed.lock();
        assert_eq!(changed.len(), 4);
        assert_eq!(changed[3].phase, Phase::Voting);
    }

    #[test]
    fn test_leaving_holdout_triggers_auto_reveal() {
        let registry = RoomRegistry::new();
        let id = room_id("r1");
        registry.create_room(id.clone(), admin("p1"), config(true)).unwrap();
        registry.join(&id, member("p2")).unwrap();
        registry.add_subjects(&id, &["A".into()]);
        registry.start_session(&id);
        registry.cast_vote(&id, &"p1".into(), 8.into());

        match registry.leave(&id, &"p2".into()) {
            LeaveOutcome::Left(room) => {
                assert_eq!(room.current_round().unwrap().status, RoundStatus::Revealed)
            }
            other => panic!("expected Left, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_creators_single_winner() {
        let registry = Arc::new(RoomRegistry::new());
        let id = room_id("race");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || {
                    registry
                        .join_or_create(&id, member(&format!("p{}", i)), Some(config(false)))
                        .unwrap()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| matches!(a, Admission::Created(_)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.get_room(&id).unwrap().participants.len(), 16);
    }

    #[test]
    fn test_concurrent_votes_all_recorded_and_auto_revealed() {
        let registry = Arc::new(RoomRegistry::new());
        let id = room_id("votes");
        registry.create_room(id.clone(), admin("p0"), config(true)).unwrap();
        for i in 1..12 {
            registry.join(&id, member(&format!("p{}", i))).unwrap();
        }
        registry.add_subjects(&id, &["A".into()]);
        registry.start_session(&id);

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || {
                    registry.cast_vote(&id, &ParticipantId::new(format!("p{}", i)), 3.into())
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_applied());
        }

        let room = registry.get_room(&id).unwrap();
        let round = room.current_round().unwrap();
        assert_eq!(round.votes.len(), 12);
        assert_eq!(round.status, RoundStatus::Revealed);
    }

    #[test]
    fn test_join_racing_last_leave_never_lands_in_dead_room() {
        for _ in 0..50 {
            let registry = Arc::new(RoomRegistry::new());
            let id = room_id("churn");
            registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();

            let leaver = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || registry.leave(&id, &"p1".into()))
            };
            let joiner = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || registry.join_or_create(&id, member("p2"), Some(config(false))))
            };
            leaver.join().unwrap();
            joiner.join().unwrap().unwrap();

            let room = registry.get_room(&id).expect("joiner must end up in a live room");
            assert!(room.participant(&"p2".into()).is_some());
        }
    }

    /// Change and destroy notifications in the order they were delivered
    #[derive(Default)]
    struct EventLog(Mutex<Vec<&'static str>>);

    impl RoomObserver for EventLog {
        fn room_changed(&self, _room: &Room) {
            self.0.lock().push("changed");
        }

        fn room_destroyed(&self, _room_id: &RoomId) {
            self.0.lock().push("destroyed");
        }
    }

    #[test]
    fn test_destroy_never_reported_after_successor_created() {
        for _ in 0..50 {
            let log = Arc::new(EventLog::default());
            let registry = Arc::new(RoomRegistry::with_observer(log.clone()));
            let id = room_id("reborn");
            registry.create_room(id.clone(), admin("p1"), config(false)).unwrap();

            let leaver = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || registry.leave(&id, &"p1".into()))
            };
            let joiner = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || registry.join_or_create(&id, member("p2"), Some(config(false))))
            };
            leaver.join().unwrap();
            joiner.join().unwrap().unwrap();

            let events = log.0.lock();
            assert!(events.iter().filter(|e| **e == "destroyed").count() <= 1);
            assert_eq!(events.last(), Some(&"changed"));
        }
    }

    #[test]
    fn test_rooms_are_independent() {
        let registry = RoomRegistry::new();
        let a = room_id("a");
        let b = room_id("b");
        registry.create_room(a.clone(), admin("p1"), config(false)).unwrap();
        registry.create_room(b.clone(), admin("p1"), config(false)).unwrap();
        registry.add_subjects(&a, &["X".into()]);
        registry.start_session(&a);

        assert_eq!(registry.get_room(&a).unwrap().phase, Phase::Voting);
        assert_eq!(registry.get_room(&b).unwrap().phase, Phase::Setup);
        let mut ids = registry.room_ids();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }
}
