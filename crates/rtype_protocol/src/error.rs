//! # Protocol Error Types
//!
//! Every way an inbound or outbound packet can be refused by the wire layer.

use thiserror::Error;

/// Framing failures detected while reading a packet header.
///
/// A packet failing here is dropped; the sender is not otherwise penalized.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the header (or declared packet) requires.
    #[error("buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Header carries a protocol version this build does not speak.
    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    /// Declared payload length runs past the end of the received buffer.
    #[error("declared payload length {declared} exceeds buffer ({available} bytes after header)")]
    LengthExceedsBuffer {
        /// `payload_length` from the header.
        declared: usize,
        /// Bytes actually available after the header.
        available: usize,
    },

    /// Total packet size is above the transport-safe maximum.
    #[error("packet of {size} bytes exceeds maximum packet size {max}")]
    PacketTooLarge {
        /// Declared total size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },
}

/// Errors produced by the protocol layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header could not be framed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Outgoing payload is larger than a single packet can carry.
    #[error("payload of {size} bytes exceeds maximum payload size {max}")]
    PayloadTooLarge {
        /// Payload size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Payload size does not match the fixed layout of its packet type.
    #[error("size mismatch for packet type {packet_type:#04x}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Raw packet type byte.
        packet_type: u8,
        /// Size dictated by the payload layout.
        expected: usize,
        /// Size received.
        actual: usize,
    },

    /// LZ4 failure or decompressed length differs from `uncompressed_size`.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Type byte does not name any known packet.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// An enumerated field held a value outside its domain.
    #[error("invalid value {value} for field {field}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw value read from the wire.
        value: u32,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
