//! # Protocol Encoder
//!
//! Turns payload bytes into complete packets and back.
//!
//! ## Design
//!
//! - Encoding decides compression per packet and records every packet in the
//!   shared telemetry
//! - No packet leaving the encoder exceeds [`MAX_PACKET_SIZE`]
//! - Decoding validates the frame before touching the payload and discards
//!   any packet whose decompressed size disagrees with its header

use std::sync::Arc;

use crate::codec::WireWriter;
use crate::compression::{CompressionConfig, Compressor};
use crate::error::{FrameError, ProtocolError, ProtocolResult};
use crate::header::PacketHeader;
use crate::packet_type::PacketType;
use crate::payload::Payload;
use crate::stats::CompressionStats;
use crate::{MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};

/// A packet whose frame decoded successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Header as received.
    pub header: PacketHeader,
    /// Decoded packet type.
    pub packet_type: PacketType,
    /// Payload, decompressed if it arrived compressed.
    pub payload: Vec<u8>,
}

impl DecodedPacket {
    /// Decodes the payload as `P`, checking the packet type first.
    pub fn parse<P: Payload>(&self) -> ProtocolResult<P> {
        if self.packet_type != P::PACKET_TYPE {
            return Err(ProtocolError::InvalidField {
                field: "packet_type",
                value: u32::from(self.packet_type.as_u8()),
            });
        }
        P::from_bytes(&self.payload)
    }
}

/// Packet framing with optional compression.
#[derive(Debug, Clone)]
pub struct ProtocolEncoder {
    compressor: Compressor,
}

impl ProtocolEncoder {
    /// Creates an encoder reporting into `stats`.
    #[must_use]
    pub fn new(config: CompressionConfig, stats: Arc<CompressionStats>) -> Self {
        Self {
            compressor: Compressor::new(config, stats),
        }
    }

    /// Telemetry handle.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<CompressionStats> {
        self.compressor.stats()
    }

    /// Compressor in use.
    #[inline]
    #[must_use]
    pub const fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    /// Frames `payload` as a `packet_type` packet with `sequence_number`.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the raw payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn encode_packet(
        &self,
        packet_type: PacketType,
        payload: &[u8],
        sequence_number: u32,
    ) -> ProtocolResult<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let (body, compressed) = if self.compressor.should_compress(packet_type, payload.len()) {
            self.compressor.compress(payload)
        } else {
            (payload.into(), false)
        };

        // Both lengths are bounded by MAX_PAYLOAD_SIZE, so they fit their fields.
        let body_len = u16::try_from(body.len()).map_err(|_| ProtocolError::PayloadTooLarge {
            size: body.len(),
            max: MAX_PAYLOAD_SIZE,
        })?;
        let header = if compressed {
            tracing::trace!(
                "compressed {:?} payload {} -> {} bytes",
                packet_type,
                payload.len(),
                body.len()
            );
            let original = u32::try_from(payload.len()).unwrap_or(u32::MAX);
            PacketHeader::compressed(packet_type, body_len, sequence_number, original)
        } else {
            PacketHeader::new(packet_type, body_len, sequence_number)
        };

        let mut writer = WireWriter::with_capacity(header.total_size());
        header.encode_into(&mut writer);
        writer.write_bytes(&body);
        debug_assert!(writer.len() <= MAX_PACKET_SIZE);

        self.compressor
            .stats()
            .record_packet(payload.len(), body.len(), compressed);
        Ok(writer.into_bytes())
    }

    /// Encodes a typed payload under its own packet type.
    pub fn encode_payload<P: Payload>(&self, payload: &P, sequence_number: u32) -> ProtocolResult<Vec<u8>> {
        self.encode_packet(P::PACKET_TYPE, &payload.to_bytes(), sequence_number)
    }

    /// Decodes one packet from the start of `bytes`.
    ///
    /// Validates the frame, resolves the type, and restores the payload. The
    /// payload's size against the registry is left to the consumer.
    pub fn decode_packet(&self, bytes: &[u8]) -> ProtocolResult<DecodedPacket> {
        let header = PacketHeader::decode_checked(bytes)?;
        let packet_type = header.kind()?;

        let start = header.header_size();
        let body = &bytes[start..header.total_size()];
        let payload = if header.is_compressed() {
            let original = usize::try_from(header.uncompressed_size).map_err(|_| {
                ProtocolError::Frame(FrameError::PacketTooLarge {
                    size: usize::MAX,
                    max: MAX_PAYLOAD_SIZE,
                })
            })?;
            self.compressor.decompress(body, original)?
        } else {
            body.to_vec()
        };

        Ok(DecodedPacket {
            header,
            packet_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::validate_packet;
    use crate::payload::*;
    use crate::HEADER_SIZE;

    fn encoder() -> ProtocolEncoder {
        ProtocolEncoder::new(CompressionConfig::default(), Arc::new(CompressionStats::new()))
    }

    fn player_state(id: u32) -> EntityState {
        EntityState {
            entity_id: id,
            entity_type: EntityType::Player,
            position_x: 100.0,
            position_y: 300.0,
            velocity_x: 0,
            velocity_y: 0,
            health: 1000,
            flags: 0,
            last_ack_sequence: 0,
        }
    }

    #[test]
    fn test_ping_packet() {
        let enc = encoder();
        let ping = ClientPing { player_id: 1, client_timestamp: 500 };
        let bytes = enc.encode_payload(&ping, 3).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 8);
        assert_eq!(bytes[1], PacketType::Ping.as_u8());
        assert_eq!(bytes[2], 0);

        let decoded = enc.decode_packet(&bytes).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Ping);
        assert_eq!(decoded.header.sequence_number, 3);
        assert_eq!(decoded.parse::<ClientPing>().unwrap(), ping);
        assert!(decoded.parse::<ServerPong>().is_err());
    }

    #[test]
    fn test_payload_size_ceiling() {
        let enc = encoder();
        assert!(enc.encode_packet(PacketType::Snapshot, &[0u8; MAX_PAYLOAD_SIZE], 0).is_ok());
        assert_eq!(
            enc.encode_packet(PacketType::Snapshot, &[0u8; MAX_PAYLOAD_SIZE + 1], 0),
            Err(ProtocolError::PayloadTooLarge { size: MAX_PAYLOAD_SIZE + 1, max: MAX_PAYLOAD_SIZE })
        );
    }

    #[test]
    fn test_uncompressed_at_limit_fits() {
        let enc = ProtocolEncoder::new(
            CompressionConfig { enabled: false, ..CompressionConfig::default() },
            Arc::new(CompressionStats::new()),
        );
        let bytes = enc.encode_packet(PacketType::Snapshot, &[7u8; MAX_PAYLOAD_SIZE], 0).unwrap();
        assert!(bytes.len() <= MAX_PACKET_SIZE);
        assert!(validate_packet(&bytes));
    }

    #[test]
    fn test_full_snapshot_compresses_and_round_trips() {
        let enc = encoder();
        let entities: Vec<_> = (1..=MAX_SNAPSHOT_ENTITIES as u32).map(player_state).collect();
        let snapshot = Snapshot::new(
            SnapshotHeader { server_tick: 10, entity_count: 0, scroll_x: 500.0 },
            entities,
        );
        let raw = snapshot.to_bytes();
        let bytes = enc.encode_payload(&snapshot, 1).unwrap();
        assert!(bytes.len() <= MAX_PACKET_SIZE);
        assert_eq!(bytes[2], crate::PACKET_FLAG_COMPRESSED);
        assert!(bytes.len() < raw.len());

        let decoded = enc.decode_packet(&bytes).unwrap();
        assert_eq!(decoded.header.uncompressed_size as usize, raw.len());
        assert_eq!(decoded.parse::<Snapshot>().unwrap(), snapshot);

        let stats = enc.stats().snapshot();
        assert_eq!(stats.total_packets, 1);
        assert_eq!(stats.compressed_packets, 1);
    }

    #[test]
    fn test_small_and_ineligible_never_compressed() {
        let enc = encoder();
        let small = enc.encode_packet(PacketType::Snapshot, &[0u8; 100], 0).unwrap();
        assert_eq!(small[2], 0);
        let input = enc.encode_packet(PacketType::PlayerJoined, &[0u8; 36], 0).unwrap();
        assert_eq!(input[2], 0);
        assert_eq!(enc.stats().snapshot().compression_attempts, 0);
        assert_eq!(enc.stats().snapshot().total_packets, 2);
    }

    #[test]
    fn test_decode_rejects_corrupt_compressed_payload() {
        let enc = encoder();
        let mut bytes = enc.encode_packet(PacketType::Snapshot, &[0u8; 600], 0).unwrap();
        assert_eq!(bytes[2], crate::PACKET_FLAG_COMPRESSED);
        // Claim a larger original size than the block restores to.
        bytes[9..13].copy_from_slice(&700u32.to_be_bytes());
        assert!(matches!(enc.decode_packet(&bytes), Err(ProtocolError::Decompression(_))));
    }

    #[test]
    fn test_decode_unknown_type() {
        let enc = encoder();
        let mut bytes = enc.encode_packet(PacketType::Ping, &[0u8; 8], 0).unwrap();
        bytes[1] = 0x7E;
        assert_eq!(enc.decode_packet(&bytes), Err(ProtocolError::UnknownPacketType(0x7E)));
    }
}
