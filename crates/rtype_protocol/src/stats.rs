//! # Compression Telemetry
//!
//! Counters over every packet the encoder emits and every compression
//! attempt the compressor makes.
//!
//! ## Design
//!
//! - One explicitly owned object, shared as `Arc<CompressionStats>`; never global
//! - A single `parking_lot::Mutex` guards the counters, so senders on several
//!   threads may record concurrently
//! - Reads take a point-in-time copy; derived figures are computed on the copy

use std::time::Duration;

use parking_lot::Mutex;

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressionStatsSnapshot {
    /// Packets run through the encoder.
    pub total_packets: u64,
    /// Packets sent with a compressed payload.
    pub compressed_packets: u64,
    /// Times the compressor actually ran.
    pub compression_attempts: u64,
    /// Payload bytes before compression.
    pub bytes_before: u64,
    /// Payload bytes as sent.
    pub bytes_after: u64,
    /// Wall-clock time spent compressing.
    pub total_compression_time: Duration,
}

impl CompressionStatsSnapshot {
    /// Sent bytes over original bytes; 1.0 when nothing was recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }

    /// Bytes not sent thanks to compression.
    #[inline]
    #[must_use]
    pub const fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    /// Share of packets that went out compressed, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_rate_percent(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            self.compressed_packets as f64 * 100.0 / self.total_packets as f64
        }
    }

    /// Mean time per compression attempt.
    #[must_use]
    pub fn average_compression_time(&self) -> Duration {
        match u32::try_from(self.compression_attempts) {
            Ok(0) => Duration::ZERO,
            Ok(attempts) => self.total_compression_time / attempts,
            Err(_) => Duration::from_secs_f64(
                self.total_compression_time.as_secs_f64() / self.compression_attempts as f64,
            ),
        }
    }
}

/// Thread-safe compression counters.
#[derive(Debug, Default)]
pub struct CompressionStats {
    counters: Mutex<CompressionStatsSnapshot>,
}

impl CompressionStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one encoded packet.
    pub fn record_packet(&self, original_size: usize, sent_size: usize, compressed: bool) {
        let mut counters = self.counters.lock();
        counters.total_packets += 1;
        counters.bytes_before += original_size as u64;
        counters.bytes_after += sent_size as u64;
        if compressed {
            counters.compressed_packets += 1;
        }
    }

    /// Records one compressor run, whether or not its output was kept.
    pub fn record_attempt(&self, elapsed: Duration) {
        let mut counters = self.counters.lock();
        counters.compression_attempts += 1;
        counters.total_compression_time += elapsed;
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> CompressionStatsSnapshot {
        *self.counters.lock()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.counters.lock() = CompressionStatsSnapshot::default();
    }

    /// One-line summary for periodic logging.
    #[must_use]
    pub fn report(&self) -> String {
        let s = self.snapshot();
        format!(
            "packets={} compressed={} ({:.1}%) bytes {} -> {} (ratio {:.3}, saved {}) avg_compress={}us",
            s.total_packets,
            s.compressed_packets,
            s.compression_rate_percent(),
            s.bytes_before,
            s.bytes_after,
            s.compression_ratio(),
            s.bytes_saved(),
            s.average_compression_time().as_micros(),
        )
    }
}
