//! All-time high scores, kept in memory for the life of the process.

use rtype_protocol::{FixedString, GlobalLeaderboard, LeaderboardEntry, LeaderboardHeader};

/// Lines kept on the board.
pub const HIGH_SCORE_SLOTS: usize = 10;

/// Top scores of finished matches, best first.
#[derive(Debug, Clone, Default)]
pub struct HighScores {
    entries: Vec<LeaderboardEntry>,
}

impl HighScores {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines on the board.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Board lines, best first.
    #[must_use]
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Records a score. Returns its rank (0 is best) if it made the board.
    ///
    /// Ties rank below scores recorded earlier.
    pub fn submit(&mut self, player_name: &str, score: u32, wave: u32) -> Option<usize> {
        let rank = self.entries.partition_point(|e| e.score >= score);
        if rank >= HIGH_SCORE_SLOTS {
            return None;
        }
        self.entries.insert(
            rank,
            LeaderboardEntry {
                player_name: FixedString::new(player_name),
                score,
                wave: u16::try_from(wave).unwrap_or(u16::MAX),
            },
        );
        self.entries.truncate(HIGH_SCORE_SLOTS);
        tracing::info!("High score #{}: {} with {}", rank + 1, player_name, score);
        Some(rank)
    }

    /// GLOBAL_LEADERBOARD payload for the current board.
    #[must_use]
    pub fn to_payload(&self) -> GlobalLeaderboard {
        GlobalLeaderboard::new(LeaderboardHeader { entry_count: 0 }, self.entries.clone())
    }
}
