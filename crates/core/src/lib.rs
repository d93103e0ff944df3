//! Pokerroom Core Library
//!
//! Authoritative room state for planning-poker sessions: membership,
//! backlog and phase transitions, per-subject vote rounds, auto-reveal and
//! post-reveal statistics.

pub mod error;
pub mod invariants;
pub mod models;
pub mod observer;
pub mod outcome;
pub mod registry;
pub mod session;
pub mod tally;
pub mod voting;

pub use error::{Error, Result};
pub use models::*;
pub use observer::RoomObserver;
pub use outcome::{LeaveOutcome, Outcome, Rejection};
pub use registry::{Admission, RoomRegistry};
pub use session::Transition;
pub use tally::{Bucket, Tally};
