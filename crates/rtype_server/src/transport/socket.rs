//! Non-blocking TCP + UDP transport.
//!
//! TCP carries the reliable channel. The byte stream is split into packets by
//! reading each header's `payload_length`. UDP carries the unreliable channel,
//! one packet per datagram.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

use rtype_protocol::{Channel, FrameError, PacketHeader, ProtocolResult, HEADER_SIZE, MAX_PACKET_SIZE};

use super::{Transport, TransportEvent, TransportStats};
use crate::config::ServerConfig;
use crate::connection::ConnectionId;
use crate::error::{ProtocolStateError, ServerError, ServerResult};

/// Bytes read from a stream per `read` call.
const READ_CHUNK: usize = 4096;

struct StreamState {
    stream: TcpStream,
    inbox: Vec<u8>,
    outbox: Vec<u8>,
}

impl StreamState {
    /// Writes as much of the outbox as the socket accepts.
    fn flush(&mut self) -> io::Result<()> {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads everything available. Returns false once the peer has closed.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Splits the next complete packet off the front of a stream buffer.
fn next_frame(inbox: &mut Vec<u8>) -> ProtocolResult<Option<Vec<u8>>> {
    if inbox.len() < HEADER_SIZE || inbox.len() < PacketHeader::size_for_flags(inbox[2]) {
        return Ok(None);
    }
    let header = PacketHeader::decode(inbox)?;
    let total = header.total_size();
    if total > MAX_PACKET_SIZE {
        return Err(FrameError::PacketTooLarge { size: total, max: MAX_PACKET_SIZE }.into());
    }
    if inbox.len() < total {
        return Ok(None);
    }
    Ok(Some(inbox.drain(..total).collect()))
}

/// Socket-backed transport.
pub struct SocketTransport {
    listener: TcpListener,
    udp: UdpSocket,
    connections: HashMap<ConnectionId, StreamState>,
    peers: HashMap<ConnectionId, SocketAddr>,
    pending: VecDeque<TransportEvent>,
    next_connection: u32,
    recv_buffer: Vec<u8>,
    stats: TransportStats,
}

impl SocketTransport {
    /// Binds both listening sockets. Failure here is fatal for the server.
    pub fn bind(config: &ServerConfig) -> ServerResult<Self> {
        let bind_error = |address: String| {
            move |err: io::Error| ServerError::Bind {
                address: address.clone(),
                reason: err.to_string(),
            }
        };

        let tcp_address = config.tcp_address();
        let listener = TcpListener::bind(&tcp_address).map_err(bind_error(tcp_address.clone()))?;
        listener
            .set_nonblocking(true)
            .map_err(bind_error(tcp_address.clone()))?;

        let udp_address = config.udp_address();
        let udp = UdpSocket::bind(&udp_address).map_err(bind_error(udp_address.clone()))?;
        udp.set_nonblocking(true).map_err(bind_error(udp_address.clone()))?;

        tracing::info!("Listening on tcp://{} and udp://{}", tcp_address, udp_address);

        Ok(Self {
            listener,
            udp,
            connections: HashMap::new(),
            peers: HashMap::new(),
            pending: VecDeque::new(),
            next_connection: 1,
            recv_buffer: vec![0u8; MAX_PACKET_SIZE],
            stats: TransportStats::default(),
        })
    }

    /// Bound reliable address.
    pub fn tcp_local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Bound unreliable address.
    pub fn udp_local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    let id = ConnectionId(self.next_connection);
                    self.next_connection = self.next_connection.wrapping_add(1);
                    tracing::info!("Accepted {} from {}", id, addr);
                    self.connections.insert(
                        id,
                        StreamState {
                            stream,
                            inbox: Vec::with_capacity(MAX_PACKET_SIZE),
                            outbox: Vec::new(),
                        },
                    );
                    self.pending.push_back(TransportEvent::Connected(id));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.stats.recv_errors += 1;
                    tracing::warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn read_streams(&mut self) {
        let mut closed = Vec::new();
        for (&id, state) in &mut self.connections {
            let open = match state.fill() {
                Ok(open) => open,
                Err(e) => {
                    self.stats.recv_errors += 1;
                    tracing::debug!("Read error on {}: {}", id, e);
                    false
                }
            };

            loop {
                match next_frame(&mut state.inbox) {
                    Ok(Some(bytes)) => {
                        self.stats.record_recv(bytes.len());
                        self.pending.push_back(TransportEvent::Reliable { connection: id, bytes });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // A stream cannot resynchronize after a bad frame.
                        tracing::warn!("Closing {}: {}", id, e);
                        closed.push(id);
                        break;
                    }
                }
            }

            if !open || state.flush().is_err() {
                closed.push(id);
            }
        }

        closed.sort_unstable();
        closed.dedup();
        for id in closed {
            self.close(id);
            self.pending.push_back(TransportEvent::Disconnected(id));
        }
    }

    fn read_datagrams(&mut self) {
        loop {
            match self.udp.recv_from(&mut self.recv_buffer) {
                Ok((len, from)) => {
                    self.stats.record_recv(len);
                    self.pending.push_back(TransportEvent::Unreliable {
                        from,
                        bytes: self.recv_buffer[..len].to_vec(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP errors from earlier sends surface here on some platforms.
                    self.stats.recv_errors += 1;
                    tracing::debug!("Datagram receive error: {}", e);
                    break;
                }
            }
        }
    }

    fn close(&mut self, connection: ConnectionId) {
        if let Some(state) = self.connections.remove(&connection) {
            let _ = state.stream.shutdown(std::net::Shutdown::Both);
        }
        self.peers.remove(&connection);
    }
}

impl Transport for SocketTransport {
    fn send(&mut self, channel: Channel, connection: ConnectionId, bytes: &[u8]) -> ServerResult<()> {
        let result = match channel {
            Channel::Reliable => {
                let state = self
                    .connections
                    .get_mut(&connection)
                    .ok_or(ProtocolStateError::UnknownPlayer)?;
                state.outbox.extend_from_slice(bytes);
                state.flush()
            }
            Channel::Unreliable => {
                let peer = *self
                    .peers
                    .get(&connection)
                    .ok_or(ProtocolStateError::UnboundUnreliablePeer)?;
                self.udp.send_to(bytes, peer).map(|_| ())
            }
        };
        match result {
            Ok(()) => {
                self.stats.record_send(bytes.len());
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e.into())
            }
        }
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if self.pending.is_empty() {
            self.accept_pending();
            self.read_streams();
            self.read_datagrams();
        }
        self.pending.pop_front()
    }

    fn associate_unreliable_peer(&mut self, connection: ConnectionId, peer: SocketAddr) {
        self.peers.insert(connection, peer);
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        if let Some(state) = self.connections.get_mut(&connection) {
            // Best effort: push out anything queued (e.g. KICK_NOTIFICATION).
            let _ = state.flush();
        }
        self.close(connection);
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
