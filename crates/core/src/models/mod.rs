//! Data models for Pokerroom

mod config;
mod participant;
mod room;
mod vote;

pub use config::*;
pub use participant::*;
pub use room::*;
pub use vote::*;
