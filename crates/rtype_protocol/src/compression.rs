//! # Payload Compression
//!
//! Selective LZ4 (block format) on large, bursty packet types.
//!
//! ## Design
//!
//! - Only allow-listed types at or above the size threshold are tried
//! - The compressed form is kept only if it saves at least `min_gain`
//! - Decompression must yield exactly the advertised size or the packet is
//!   discarded whole

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet_type::PacketType;
use crate::stats::CompressionStats;
use crate::MAX_PAYLOAD_SIZE;

/// Payloads smaller than this are never compressed.
pub const MIN_COMPRESSION_SIZE: usize = 128;

/// Minimum fractional size reduction for the compressed form to be used.
pub const MIN_COMPRESSION_GAIN: f32 = 0.10;

/// Packet types eligible for compression.
pub const COMPRESSIBLE_TYPES: [PacketType; 5] = [
    PacketType::Snapshot,
    PacketType::DeltaSnapshot,
    PacketType::RoomList,
    PacketType::LobbyState,
    PacketType::GameStart,
];

/// Compression toggle and thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressionConfig {
    /// Global toggle.
    pub enabled: bool,
    /// Size threshold in bytes.
    pub min_size: usize,
    /// Required reduction, e.g. 0.10 for 10%.
    pub min_gain: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: MIN_COMPRESSION_SIZE,
            min_gain: MIN_COMPRESSION_GAIN,
        }
    }
}

/// LZ4 compressor bound to a telemetry handle.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressionConfig,
    stats: Arc<CompressionStats>,
}

impl Compressor {
    /// Creates a compressor reporting into `stats`.
    #[must_use]
    pub fn new(config: CompressionConfig, stats: Arc<CompressionStats>) -> Self {
        Self { config, stats }
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Telemetry handle.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<CompressionStats> {
        &self.stats
    }

    /// True if a payload of `size` bytes of `packet_type` should be tried.
    #[must_use]
    pub fn should_compress(&self, packet_type: PacketType, size: usize) -> bool {
        self.config.enabled && size >= self.config.min_size && COMPRESSIBLE_TYPES.contains(&packet_type)
    }

    /// Compresses `data`, keeping the result only if it clears the gain
    /// threshold. Returns the bytes to send and whether they are compressed.
    #[must_use]
    pub fn compress<'a>(&self, data: &'a [u8]) -> (Cow<'a, [u8]>, bool) {
        let start = Instant::now();
        let compressed = lz4_flex::block::compress(data);
        self.stats.record_attempt(start.elapsed());

        if self.is_worthwhile(data.len(), compressed.len()) {
            (Cow::Owned(compressed), true)
        } else {
            (Cow::Borrowed(data), false)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_worthwhile(&self, original_size: usize, compressed_size: usize) -> bool {
        if original_size == 0 {
            return false;
        }
        let ratio = compressed_size as f64 / original_size as f64;
        ratio <= 1.0 - f64::from(self.config.min_gain)
    }

    /// Restores a payload, failing unless exactly `original_size` bytes come out.
    pub fn decompress(&self, data: &[u8], original_size: usize) -> ProtocolResult<Vec<u8>> {
        decompress(data, original_size)
    }
}

/// Restores an LZ4 block, failing unless exactly `original_size` bytes come out.
pub fn decompress(data: &[u8], original_size: usize) -> ProtocolResult<Vec<u8>> {
    if original_size > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::Decompression(format!(
            "advertised size {original_size} exceeds maximum payload size {MAX_PAYLOAD_SIZE}"
        )));
    }
    let restored = lz4_flex::block::decompress(data, original_size)
        .map_err(|err| ProtocolError::Decompression(err.to_string()))?;
    if restored.len() != original_size {
        return Err(ProtocolError::Decompression(format!(
            "expected {original_size} bytes, got {}",
            restored.len()
        )));
    }
    Ok(restored)
}
