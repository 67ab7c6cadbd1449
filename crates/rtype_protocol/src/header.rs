//! # Packet Header
//!
//! ```text
//! ┌─────────┬──────┬───────┬────────────────┬─────────────────┬───────────────────┐
//! │ version │ type │ flags │ payload_length │ sequence_number │ uncompressed_size │
//! │   u8    │  u8  │  u8   │    u16 (BE)    │    u32 (BE)     │ u32 (BE) optional │
//! └─────────┴──────┴───────┴────────────────┴─────────────────┴───────────────────┘
//!  offset 0   1      2       3                5                 9 (compressed only)
//! ```
//!
//! The header size is a pure function of the flags byte, so a decoder can
//! locate the payload without look-ahead.

use crate::codec::{WireReader, WireWriter};
use crate::error::{FrameError, ProtocolResult};
use crate::packet_type::PacketType;
use crate::{COMPRESSED_HEADER_EXTRA, HEADER_SIZE, MAX_PACKET_SIZE, PROTOCOL_VERSION};

/// Flag bit: payload is LZ4 compressed and `uncompressed_size` follows.
pub const PACKET_FLAG_COMPRESSED: u8 = 0x01;

/// Header present in every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version, must equal [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Raw packet type byte.
    pub packet_type: u8,
    /// Flag bits.
    pub flags: u8,
    /// Length of the bytes following the header (compressed size if compressed).
    pub payload_length: u16,
    /// Monotonic per-sender sequence number.
    pub sequence_number: u32,
    /// Original payload size. Only on the wire when compressed; zero otherwise.
    pub uncompressed_size: u32,
}

impl PacketHeader {
    /// Creates an uncompressed header.
    #[inline]
    #[must_use]
    pub const fn new(packet_type: PacketType, payload_length: u16, sequence_number: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type: packet_type as u8,
            flags: 0,
            payload_length,
            sequence_number,
            uncompressed_size: 0,
        }
    }

    /// Creates a header for a compressed payload.
    #[inline]
    #[must_use]
    pub const fn compressed(
        packet_type: PacketType,
        payload_length: u16,
        sequence_number: u32,
        uncompressed_size: u32,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type: packet_type as u8,
            flags: PACKET_FLAG_COMPRESSED,
            payload_length,
            sequence_number,
            uncompressed_size,
        }
    }

    /// True if the compressed flag is set.
    #[inline]
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.flags & PACKET_FLAG_COMPRESSED != 0
    }

    /// Encoded header size for the given flags byte.
    #[inline]
    #[must_use]
    pub const fn size_for_flags(flags: u8) -> usize {
        if flags & PACKET_FLAG_COMPRESSED != 0 {
            HEADER_SIZE + COMPRESSED_HEADER_EXTRA
        } else {
            HEADER_SIZE
        }
    }

    /// Encoded size of this header.
    #[inline]
    #[must_use]
    pub const fn header_size(&self) -> usize {
        Self::size_for_flags(self.flags)
    }

    /// Header plus payload size.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.header_size() + self.payload_length as usize
    }

    /// Decoded packet type.
    pub fn kind(&self) -> ProtocolResult<PacketType> {
        PacketType::try_from(self.packet_type)
    }

    /// Appends the encoded header to `writer`.
    pub fn encode_into(&self, writer: &mut WireWriter) {
        writer.write_u8(self.version);
        writer.write_u8(self.packet_type);
        writer.write_u8(self.flags);
        writer.write_u16(self.payload_length);
        writer.write_u32(self.sequence_number);
        if self.is_compressed() {
            writer.write_u32(self.uncompressed_size);
        }
    }

    /// Encodes into a fresh buffer of 9 or 13 bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(self.header_size());
        self.encode_into(&mut writer);
        writer.into_bytes()
    }

    /// Decodes a header from the start of `bytes`.
    ///
    /// Rejects short buffers and foreign versions. Does not look at the payload.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::BufferTooShort {
                needed: HEADER_SIZE,
                available: bytes.len(),
            }
            .into());
        }

        let mut reader = WireReader::new(bytes);
        let version = reader.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version).into());
        }
        let packet_type = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let payload_length = reader.read_u16()?;
        let sequence_number = reader.read_u32()?;

        let uncompressed_size = if flags & PACKET_FLAG_COMPRESSED != 0 {
            if bytes.len() < HEADER_SIZE + COMPRESSED_HEADER_EXTRA {
                return Err(FrameError::BufferTooShort {
                    needed: HEADER_SIZE + COMPRESSED_HEADER_EXTRA,
                    available: bytes.len(),
                }
                .into());
            }
            reader.read_u32()?
        } else {
            0
        };

        Ok(Self {
            version,
            packet_type,
            flags,
            payload_length,
            sequence_number,
            uncompressed_size,
        })
    }

    /// Full frame check: header decodes, total size within the packet limit,
    /// and the buffer holds the whole declared payload.
    pub fn decode_checked(bytes: &[u8]) -> ProtocolResult<Self> {
        let header = Self::decode(bytes)?;
        let total = header.total_size();
        if total > MAX_PACKET_SIZE {
            return Err(FrameError::PacketTooLarge {
                size: total,
                max: MAX_PACKET_SIZE,
            }
            .into());
        }
        if bytes.len() < total {
            return Err(FrameError::LengthExceedsBuffer {
                declared: usize::from(header.payload_length),
                available: bytes.len() - header.header_size(),
            }
            .into());
        }
        Ok(header)
    }
}

/// Hot-path check that never allocates or decompresses.
#[must_use]
pub fn validate_packet(bytes: &[u8]) -> bool {
    PacketHeader::decode_checked(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::new(PacketType::Ping, 8, 0x0102_0304);
        let bytes = header.encode();
        assert_eq!(bytes, vec![0x01, 0x04, 0x00, 0x00, 0x08, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_compressed_header_layout() {
        let header = PacketHeader::compressed(PacketType::Snapshot, 0x0100, 7, 0x0000_0500);
        let bytes = header.encode();
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[2], PACKET_FLAG_COMPRESSED);
        assert_eq!(&bytes[9..13], &[0x00, 0x00, 0x05, 0x00]);
    }

    #[test]
    fn test_header_round_trip_all_flags() {
        let headers = [
            PacketHeader::new(PacketType::Input, 14, 0),
            PacketHeader::new(PacketType::Connect, 33, u32::MAX),
            PacketHeader::compressed(PacketType::Snapshot, 400, 99, 1200),
            PacketHeader::compressed(PacketType::RoomList, 0, 1, 0),
        ];
        for header in headers {
            let bytes = header.encode();
            assert_eq!(bytes.len(), header.header_size());
            assert_eq!(PacketHeader::decode(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn test_size_for_flags() {
        assert_eq!(PacketHeader::size_for_flags(0), 9);
        assert_eq!(PacketHeader::size_for_flags(PACKET_FLAG_COMPRESSED), 13);
        assert_eq!(PacketHeader::size_for_flags(0xFE), 9);
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = PacketHeader::decode(&[0x01, 0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Frame(FrameError::BufferTooShort { needed: 9, available: 3 })
        ));
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut bytes = PacketHeader::new(PacketType::Ping, 0, 0).encode();
        bytes[0] = 0x02;
        assert_eq!(
            PacketHeader::decode(&bytes),
            Err(ProtocolError::Frame(FrameError::UnsupportedVersion(0x02)))
        );
    }

    #[test]
    fn test_compressed_requires_extra_bytes() {
        let bytes = PacketHeader::compressed(PacketType::Snapshot, 0, 0, 10).encode();
        assert!(PacketHeader::decode(&bytes[..9]).is_err());
        assert!(PacketHeader::decode(&bytes).is_ok());
    }

    #[test]
    fn test_validate_packet() {
        let mut packet = PacketHeader::new(PacketType::Ping, 4, 1).encode();
        assert!(!validate_packet(&packet));
        packet.extend_from_slice(&[0, 0, 0, 0]);
        assert!(validate_packet(&packet));

        let oversized = PacketHeader::new(PacketType::Snapshot, 1400, 1).encode();
        assert!(matches!(
            PacketHeader::decode_checked(&oversized),
            Err(ProtocolError::Frame(FrameError::PacketTooLarge { .. }))
        ));
    }
}
