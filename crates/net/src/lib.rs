//! Pokerroom Network Library
//!
//! Transport for planning-poker rooms over TCP.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, routes actions to the room registry
//!   and pushes full room snapshots to every connection in the room
//! - **Client**: connects to a server and sends room actions
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(ServerConfig::default()).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! client.join(room_id, participant, Some(config)).await?;
//!
//! while let Some(msg) = client.next_event().await {
//!     match msg {
//!         ServerMessage::RoomState { room, tally } => { /* render */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ServerMessage, ROOM_NOT_FOUND};
pub use server::{Broadcaster, Server, ServerConfig, DEFAULT_MAX_CONNECTIONS};

/// Default port for pokerroom servers
pub const DEFAULT_PORT: u16 = 3001;
