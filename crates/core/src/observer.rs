//! Notification seam between the registry and the broadcast layer

use crate::models::{Room, RoomId};

/// Receives every applied room change.
///
/// Called while the room's lock is held, so implementations must not block
/// and must not call back into the registry.
pub trait RoomObserver: Send + Sync {
    /// Full snapshot after an applied transition
    fn room_changed(&self, room: &Room);

    /// The last participant left and the room is gone. Called once per
    /// removed room, before any successor with the same id can exist.
    fn room_destroyed(&self, _room_id: &RoomId) {}
}
