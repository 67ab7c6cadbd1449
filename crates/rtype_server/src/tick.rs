//! # Server Tick Loop
//!
//! Fixed-timestep pacing for the single server loop.
//!
//! ## Design
//!
//! - Ticks are owed from accumulated wall time; a slow tick is followed by
//!   catch-up ticks rather than a longer simulation step
//! - Every tick is timed; ticks over budget are counted as late
//! - Lobby countdowns and snapshot cadence count these ticks, never wall time

use std::time::{Duration, Instant};

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Fastest tick observed.
    pub min_tick_us: u64,
    /// Slowest tick observed.
    pub max_tick_us: u64,
    /// Rolling average tick duration.
    pub avg_tick_us: u64,
    /// Ticks that overran their budget.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }

    /// Late ticks as a percentage of all measured ticks.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn late_percent(&self) -> f64 {
        self.late_ticks as f64 * 100.0 / self.total_ticks.max(1) as f64
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-timestep loop controller.
#[derive(Debug)]
pub struct TickLoop {
    tick_rate: u32,
    tick_duration: Duration,
    last_tick: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

impl TickLoop {
    /// Creates a loop running `tick_rate` times per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(tick_rate));
        Self {
            tick_rate,
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// True while at least one tick is owed. Call until it returns false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;
        self.accumulator >= self.tick_duration
    }

    /// Consumes one owed tick and returns its start time.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Records the duration of the tick started at `start`.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let us = duration_us(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + us) / 16;
        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_tick.elapsed() + self.accumulator;
        if elapsed < self.tick_duration {
            std::thread::sleep(self.tick_duration - elapsed);
        }
    }

    /// Ticks begun so far.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Configured rate.
    #[inline]
    #[must_use]
    pub const fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Budget per tick.
    #[inline]
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Timing statistics.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Starts a new statistics window.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::new(64);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_micros(15_625));
        assert_eq!(TickLoop::new(0).tick_rate(), 1);
    }

    #[test]
    fn test_owed_ticks_are_consumed() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(5));

        let mut ran = 0;
        while tick_loop.should_tick() {
            let start = tick_loop.begin_tick();
            tick_loop.end_tick(start);
            ran += 1;
        }
        assert!(ran >= 4, "ran {ran}");
        assert_eq!(tick_loop.tick_count(), ran);
        assert_eq!(tick_loop.stats().total_ticks, ran);
    }

    #[test]
    fn test_late_ticks_counted() {
        let mut tick_loop = TickLoop::new(1000);
        let start = tick_loop.begin_tick();
        std::thread::sleep(Duration::from_millis(3));
        tick_loop.end_tick(start);

        let stats = *tick_loop.stats();
        assert_eq!(stats.late_ticks, 1);
        assert!(stats.min_tick_us <= stats.max_tick_us);
        assert!((stats.late_percent() - 100.0).abs() < f64::EPSILON);

        tick_loop.reset_stats();
        assert_eq!(tick_loop.stats().total_ticks, 0);
    }
}
