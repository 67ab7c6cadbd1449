//! # R-Type Server - The Authoritative Match Host
//!
//! Lobbies, custom rooms and authoritative game sessions for R-Type
//! multiplayer, driven by one fixed-rate loop.
//!
//! ## Architecture
//!
//! - **Transport**: TCP for control traffic, UDP for inputs and snapshots
//! - **Router**: validates every frame before any handler sees it
//! - **Lobbies**: quick-match queues per mode and difficulty, with countdowns
//! - **Rooms**: named, optionally password-protected custom games
//! - **Sessions**: the simulation itself, streaming snapshots at a fixed rate
//!
//! ## Authority
//!
//! ```text
//! CLIENT                            SERVER
//!   |                                 |
//!   |--- INPUT (seq 7, flags) ------->|  <- applied next tick
//!   |                                 |
//!   |<-- SNAPSHOT (ack 7, entities) --|
//!   |                                 |
//! ```
//!
//! Clients send intent only. Positions, hits and scores are decided here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rtype_server::{GameServer, ServerConfig};
//!
//! let config = ServerConfig::load("server.toml")?;
//! let mut server = GameServer::bind(config)?;
//! server.run(None); // Blocks, runs at the configured tick rate
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod admin;
pub mod config;
pub mod connection;
pub mod error;
pub mod leaderboard;
pub mod lobby;
pub mod room;
pub mod router;
pub mod sender;
pub mod server;
pub mod session;
pub mod state;
pub mod tick;
pub mod transport;

pub use admin::{AdminAction, AdminService};
pub use config::{CompressionSettings, ServerConfig};
pub use connection::{ConnectionId, ConnectionRegistry, Membership, PlayerConnection};
pub use error::{ProtocolStateError, ServerError, ServerResult};
pub use leaderboard::HighScores;
pub use lobby::{Lobby, LobbyEvent, LobbyManager};
pub use room::{Room, RoomEvent, RoomManager};
pub use router::{PacketListener, PacketRouter, PacketSource, RouterStats};
pub use sender::{Outbox, PacketSender};
pub use server::GameServer;
pub use session::{GameSession, GameSessionManager, SessionSettings};
pub use state::ServerState;
pub use tick::{TickLoop, TickStats};
pub use transport::{MemoryHandle, MemoryTransport, SocketTransport, Transport, TransportEvent};
