//! End-to-end flows through the in-process transport.

use std::net::SocketAddr;
use std::sync::Arc;

use rtype_protocol::{
    Channel, ClientConnect, ClientInput, ClientJoinLobby, ClientUdpHandshake, CompressionConfig, CompressionStats,
    Difficulty, EntityType, FixedString, GameMode, GameStart, PacketType, Payload, ProtocolEncoder, ServerAccept,
    Snapshot, CLIENT_VERSION,
};
use rtype_server::transport::{MemoryOutput, OutboundPacket};
use rtype_server::{ConnectionId, GameServer, MemoryHandle, MemoryTransport, ServerConfig};

struct Harness {
    server: GameServer<MemoryTransport>,
    handle: MemoryHandle,
    codec: ProtocolEncoder,
    outputs: Vec<OutboundPacket>,
}

impl Harness {
    fn new() -> Self {
        let (transport, handle) = MemoryTransport::pair(1024);
        let config = ServerConfig {
            tick_rate: 10,
            snapshot_rate: 10,
            countdown_seconds: 1,
            delta_snapshots: false,
            ..ServerConfig::default()
        };
        Self {
            server: GameServer::new(config, transport),
            handle,
            codec: ProtocolEncoder::new(CompressionConfig::default(), Arc::new(CompressionStats::new())),
            outputs: Vec::new(),
        }
    }

    fn tick(&mut self) {
        self.server.tick();
        for output in self.handle.drain() {
            if let MemoryOutput::Packet(packet) = output {
                self.outputs.push(packet);
            }
        }
    }

    fn send_reliable<P: Payload>(&self, connection: u32, payload: &P) {
        let bytes = self.codec.encode_payload(payload, 0).unwrap();
        assert!(self.handle.send_reliable(ConnectionId(connection), bytes));
    }

    fn send_datagram<P: Payload>(&self, from: SocketAddr, payload: &P) {
        let bytes = self.codec.encode_payload(payload, 0).unwrap();
        assert!(self.handle.send_unreliable(from, bytes));
    }

    /// Takes every received packet of `packet_type` out of the buffer.
    fn take<P: Payload>(&mut self, packet_type: PacketType) -> Vec<(OutboundPacket, P)> {
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for packet in self.outputs.drain(..) {
            let decoded = self.codec.decode_packet(&packet.bytes).unwrap();
            if decoded.packet_type == packet_type {
                let payload = decoded.parse::<P>().unwrap();
                taken.push((packet, payload));
            } else {
                kept.push(packet);
            }
        }
        self.outputs = kept;
        taken
    }

    fn connect(&mut self, connection: u32, name: &str) -> u32 {
        self.handle.connect(ConnectionId(connection));
        self.send_reliable(
            connection,
            &ClientConnect {
                client_version: CLIENT_VERSION,
                player_name: FixedString::new(name),
            },
        );
        self.tick();
        let accepted = self.take::<ServerAccept>(PacketType::Accept);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0.connection, ConnectionId(connection));
        accepted[0].1.assigned_player_id
    }

    /// Puts two players into a duo lobby and ticks until the match starts.
    fn start_duo(&mut self) -> (u32, u32, GameStart) {
        let a = self.connect(1, "ada");
        let b = self.connect(2, "bob");
        for (connection, player_id) in [(1, a), (2, b)] {
            self.send_reliable(
                connection,
                &ClientJoinLobby {
                    player_id,
                    game_mode: GameMode::Duo,
                    difficulty: Difficulty::Normal,
                },
            );
        }
        for _ in 0..30 {
            self.tick();
            let started = self.take::<GameStart>(PacketType::GameStart);
            if !started.is_empty() {
                assert_eq!(started.len(), 2);
                assert!(started.iter().all(|(packet, _)| packet.channel == Channel::Reliable));
                return (a, b, started[0].1.clone());
            }
        }
        panic!("duo lobby never started");
    }
}

fn input(player_id: u32, sequence_number: u32) -> ClientInput {
    ClientInput {
        player_id,
        input_flags: 0,
        client_tick: sequence_number,
        sequence_number,
    }
}

#[test]
fn test_duo_match_starts_for_both_players() {
    let mut h = Harness::new();
    let (a, b, start) = h.start_duo();
    assert_ne!(a, b);
    assert_eq!(start.header.game_mode, GameMode::Duo);
    assert_eq!(start.header.player_count, 2);
    let mut spawned: Vec<u32> = start.spawns.iter().map(|s| s.player_id).collect();
    spawned.sort_unstable();
    let mut expected = vec![a, b];
    expected.sort_unstable();
    assert_eq!(spawned, expected);
}

#[test]
fn test_snapshot_acks_highest_input() {
    let mut h = Harness::new();
    let (a, _b, start) = h.start_duo();
    let peer: SocketAddr = "127.0.0.1:40001".parse().unwrap();

    h.send_datagram(
        peer,
        &ClientUdpHandshake {
            player_id: a,
            session_id: start.header.game_session_id,
        },
    );
    h.tick();
    h.outputs.clear();

    for sequence in [5, 3, 7] {
        h.send_datagram(peer, &input(a, sequence));
    }
    h.tick();

    let snapshots = h.take::<Snapshot>(PacketType::Snapshot);
    let (packet, snapshot) = snapshots.last().unwrap();
    assert_eq!(packet.channel, Channel::Unreliable);
    assert_eq!(packet.peer, Some(peer));
    assert_eq!(usize::from(snapshot.header.entity_count), snapshot.entities.len());

    let ships: Vec<_> = snapshot
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Player)
        .collect();
    assert_eq!(ships.len(), 2);
    assert!(ships.iter().any(|e| e.last_ack_sequence == 7));
    assert!(ships.iter().all(|e| e.last_ack_sequence != 5));
}

#[test]
fn test_input_on_reliable_channel_is_dropped() {
    let mut h = Harness::new();
    let a = h.connect(1, "ada");
    let before = h.server.router().stats().wrong_channel;

    h.send_reliable(1, &input(a, 1));
    h.tick();

    assert_eq!(h.server.router().stats().wrong_channel, before + 1);
    assert_eq!(h.server.state().players().len(), 1);
}

#[test]
fn test_wrong_payload_size_is_dropped() {
    let mut h = Harness::new();
    h.connect(1, "ada");
    let before = h.server.router().stats().size_mismatches;

    let bytes = h.codec.encode_packet(PacketType::JoinLobby, &[0, 0, 0, 1, 0], 0).unwrap();
    h.handle.send_reliable(ConnectionId(1), bytes);
    h.tick();

    assert_eq!(h.server.router().stats().size_mismatches, before + 1);
    assert!(h.server.state().lobbies().is_empty());
}

#[test]
fn test_unbound_datagram_input_is_ignored() {
    let mut h = Harness::new();
    let (a, _b, _start) = h.start_duo();
    let stranger: SocketAddr = "127.0.0.1:40099".parse().unwrap();

    h.send_datagram(stranger, &input(a, 9));
    h.tick();

    assert!(h.server.router().stats().state_rejections + h.server.router().stats().handler_errors >= 1);
    assert!(h.take::<Snapshot>(PacketType::Snapshot).is_empty());
}
