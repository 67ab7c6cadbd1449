//! # Game Server
//!
//! The fixed-rate loop that owns the transport and the server state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        GAME SERVER                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐    │
//! │  │ Transport   │──▶│ PacketRouter │──▶│ ServerState     │    │
//! │  │ (poll)      │   │ (validate)   │   │ (lobby/room/    │    │
//! │  └─────────────┘   └──────────────┘   │  sessions)      │    │
//! │         ▲                             └────────┬────────┘    │
//! │         │          ┌──────────────┐            │             │
//! │         └──────────│ PacketSender │◀── Outbox ─┘             │
//! │                    └──────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Order
//!
//! 1. Drain every queued transport event through the router
//! 2. Advance lobbies, rooms and sessions
//! 3. Flush the outbox to the transport
//! 4. Sleep out the rest of the tick budget

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtype_protocol::{CompressionConfig, CompressionStats, DisconnectReason, ProtocolEncoder};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::{PacketRouter, PacketSource};
use crate::sender::PacketSender;
use crate::state::ServerState;
use crate::tick::TickLoop;
use crate::transport::{SocketTransport, Transport, TransportEvent};

/// The authoritative R-Type server over a transport `T`.
#[derive(Debug)]
pub struct GameServer<T: Transport> {
    transport: T,
    router: PacketRouter,
    sender: PacketSender,
    state: ServerState,
    compression: Arc<CompressionStats>,
    tick: u64,
    stats_every: u64,
    running: AtomicBool,
}

impl GameServer<SocketTransport> {
    /// Binds the TCP and UDP sockets named in `config`.
    ///
    /// # Errors
    ///
    /// Fails when either socket cannot be bound; the server must not start.
    pub fn bind(config: ServerConfig) -> ServerResult<Self> {
        let transport = SocketTransport::bind(&config)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> GameServer<T> {
    /// Creates a server over an already-open transport.
    #[must_use]
    pub fn new(config: ServerConfig, transport: T) -> Self {
        Self::with_state(ServerState::new(config), transport)
    }

    /// Creates a server around prepared state.
    #[must_use]
    pub fn with_state(state: ServerState, transport: T) -> Self {
        let config = state.config();
        let compression = Arc::new(CompressionStats::new());
        let encoder = ProtocolEncoder::new(CompressionConfig::from(config.compression), Arc::clone(&compression));
        let stats_every = u64::from(config.stats_interval_seconds) * u64::from(config.tick_rate);

        Self {
            transport,
            router: PacketRouter::new(encoder.clone()),
            sender: PacketSender::new(encoder),
            state,
            compression,
            tick: 0,
            stats_every,
            running: AtomicBool::new(false),
        }
    }

    /// Ticks run so far.
    #[inline]
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Server state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &ServerState {
        &self.state
    }

    /// Transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Router drop counters.
    #[inline]
    #[must_use]
    pub const fn router(&self) -> &PacketRouter {
        &self.router
    }

    /// True while [`GameServer::run`] is looping.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Asks [`GameServer::run`] to return after the current tick.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Runs one server tick.
    pub fn tick(&mut self) {
        // 1. Drain the transport
        while let Some(event) = self.transport.poll() {
            match event {
                TransportEvent::Connected(connection) => {
                    tracing::debug!("Transport opened {}", connection);
                }
                TransportEvent::Disconnected(connection) => {
                    self.state.handle_disconnect(connection, DisconnectReason::Timeout);
                }
                TransportEvent::Reliable { connection, bytes } => {
                    self.router
                        .route(PacketSource::Reliable(connection), &bytes, &mut self.state);
                }
                TransportEvent::Unreliable { from, bytes } => {
                    self.router
                        .route(PacketSource::Unreliable(from), &bytes, &mut self.state);
                }
            }
        }

        // 2. Advance the world
        self.state.update();

        // 3. Flush
        self.sender.flush(self.state.outbox_mut(), &mut self.transport);

        self.tick += 1;
        if self.stats_every > 0 && self.tick % self.stats_every == 0 {
            self.log_stats();
        }
    }

    /// Runs the fixed-rate loop until [`GameServer::shutdown`] or until
    /// `duration` has elapsed.
    pub fn run(&mut self, duration: Option<Duration>) {
        let mut tick_loop = TickLoop::new(self.state.config().tick_rate);
        let started = Instant::now();
        self.running.store(true, Ordering::Relaxed);
        tracing::info!("Server loop running at {} Hz", tick_loop.tick_rate());

        while self.is_running() {
            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
            while tick_loop.should_tick() {
                let start = tick_loop.begin_tick();
                self.tick();
                tick_loop.end_tick(start);
            }
            tick_loop.wait_for_next_tick();
        }
        self.running.store(false, Ordering::Relaxed);

        let stats = tick_loop.stats();
        tracing::info!(
            "Server loop stopped after {} ticks (avg {}us, max {}us, {:.2}% late)",
            stats.total_ticks,
            stats.avg_tick_us,
            stats.max_tick_us,
            stats.late_percent()
        );
    }

    fn log_stats(&self) {
        let routed = self.router.stats();
        let sent = self.sender.stats();
        let transport = self.transport.stats();
        tracing::info!(
            "Tick {} | players {} | lobbies {} | rooms {} | sessions {} | in {} ({} dropped) | out {} ({} failed)",
            self.tick,
            self.state.players().len(),
            self.state.lobbies().len(),
            self.state.rooms().len(),
            self.state.sessions().len(),
            routed.dispatched,
            routed.dropped(),
            sent.packets_sent,
            sent.send_errors + transport.send_errors
        );
        tracing::info!("{}", self.compression.report());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::transport::{MemoryHandle, MemoryOutput, MemoryTransport};
    use rtype_protocol::{ClientConnect, FixedString, PacketType, ServerAccept, CLIENT_VERSION};

    fn server() -> (GameServer<MemoryTransport>, MemoryHandle) {
        let (transport, handle) = MemoryTransport::pair(256);
        let config = ServerConfig {
            tick_rate: 20,
            snapshot_rate: 20,
            ..ServerConfig::default()
        };
        (GameServer::new(config, transport), handle)
    }

    fn client_encoder() -> ProtocolEncoder {
        ProtocolEncoder::new(CompressionConfig::default(), Arc::new(CompressionStats::new()))
    }

    #[test]
    fn test_server_creation() {
        let (server, _handle) = server();
        assert_eq!(server.current_tick(), 0);
        assert!(!server.is_running());
        assert!(server.state().players().is_empty());
        assert_eq!(server.stats_every, 100);
    }

    #[test]
    fn test_idle_tick_advances() {
        let (mut server, handle) = server();
        server.tick();
        server.tick();
        assert_eq!(server.current_tick(), 2);
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn test_connect_round_trip() {
        let (mut server, handle) = server();
        let encoder = client_encoder();
        let connect = ClientConnect {
            client_version: CLIENT_VERSION,
            player_name: FixedString::new("ada"),
        };

        assert!(handle.connect(ConnectionId(1)));
        assert!(handle.send_reliable(ConnectionId(1), encoder.encode_payload(&connect, 0).unwrap()));
        server.tick();

        assert_eq!(server.state().players().len(), 1);
        let accept = handle
            .drain()
            .into_iter()
            .find_map(|output| match output {
                MemoryOutput::Packet(packet) => {
                    let decoded = encoder.decode_packet(&packet.bytes).unwrap();
                    (decoded.packet_type == PacketType::Accept).then(|| decoded.parse::<ServerAccept>().unwrap())
                }
                MemoryOutput::Closed(_) => None,
            })
            .unwrap();
        assert_eq!(accept.server_tick_rate, 20);
    }

    #[test]
    fn test_transport_close_removes_player() {
        let (mut server, handle) = server();
        let encoder = client_encoder();
        let connect = ClientConnect {
            client_version: CLIENT_VERSION,
            player_name: FixedString::new("bob"),
        };
        handle.connect(ConnectionId(4));
        handle.send_reliable(ConnectionId(4), encoder.encode_payload(&connect, 0).unwrap());
        server.tick();
        assert_eq!(server.state().players().len(), 1);

        handle.close(ConnectionId(4));
        server.tick();
        assert!(server.state().players().is_empty());
    }

    #[test]
    fn test_garbage_is_counted_not_fatal() {
        let (mut server, handle) = server();
        handle.connect(ConnectionId(1));
        handle.send_reliable(ConnectionId(1), vec![0xFF; 3]);
        server.tick();
        assert_eq!(server.router().stats().dropped(), 1);
        assert!(server.state().players().is_empty());
    }

    #[test]
    fn test_run_stops_after_duration() {
        let (mut server, _handle) = server();
        server.run(Some(Duration::from_millis(120)));
        assert!(!server.is_running());
        assert!(server.current_tick() >= 1);
    }
}
