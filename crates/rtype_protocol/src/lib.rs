//! # R-Type Protocol - The Wire
//!
//! Versioned binary framing shared by the multiplayer client and server.
//!
//! ## Architecture
//!
//! - **Header**: 9 bytes, 13 when the payload is compressed (big-endian)
//! - **Payloads**: one fixed-layout record per packet type, exact byte sizes
//! - **Compression**: LZ4 on large bursty packets only, kept only when it pays
//! - **Telemetry**: shared counters over every encode attempt
//!
//! ## Packet Flow
//!
//! ```text
//! payload record ──to_bytes──▶ ProtocolEncoder ──▶ [header|payload] ──▶ transport
//!                                   │
//!                              Compressor ──▶ CompressionStats
//!
//! transport ──▶ [header|payload] ──▶ decode_packet ──▶ check_payload_size ──▶ from_bytes
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rtype_protocol::{CompressionStats, Payload, ProtocolEncoder, ClientPing};
//!
//! let stats = Arc::new(CompressionStats::new());
//! let encoder = ProtocolEncoder::new(Default::default(), stats);
//! let ping = ClientPing { player_id: 1, client_timestamp: 500 };
//! let packet = encoder.encode_payload(&ping, 0)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod codec;
pub mod compression;
pub mod encoder;
pub mod error;
pub mod header;
pub mod packet_type;
pub mod payload;
pub mod registry;
pub mod stats;

pub use codec::{FixedString, WireReader, WireWriter};
pub use compression::{CompressionConfig, Compressor};
pub use encoder::{DecodedPacket, ProtocolEncoder};
pub use error::{FrameError, ProtocolError, ProtocolResult};
pub use header::{validate_packet, PacketHeader, PACKET_FLAG_COMPRESSED};
pub use packet_type::{Channel, PacketType};
pub use payload::*;
pub use registry::{check_payload_size, payload_layout, PayloadLayout};
pub use stats::{CompressionStats, CompressionStatsSnapshot};

/// Wire protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Largest packet (header + payload) any transport will carry.
///
/// 1400 bytes stays under a 1500 byte Ethernet MTU with IP/UDP headers.
pub const MAX_PACKET_SIZE: usize = 1400;

/// Base header size in bytes.
pub const HEADER_SIZE: usize = 9;

/// Extra header bytes present when the payload is compressed.
pub const COMPRESSED_HEADER_EXTRA: usize = 4;

/// Largest payload that fits a packet with the largest header.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE - COMPRESSED_HEADER_EXTRA;

/// Default reliable (TCP) port.
pub const DEFAULT_TCP_PORT: u16 = 4242;

/// Default unreliable (UDP) port.
pub const DEFAULT_UDP_PORT: u16 = 4243;

/// Client build version expected in CONNECT.
pub const CLIENT_VERSION: u8 = 0x01;
