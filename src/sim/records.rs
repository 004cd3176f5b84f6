//! End-of-run evaluation against a level's stored records.

use crate::sim::level::LevelInfo;

/// Outcome of one finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Records {
    pub score: i32,
    /// Time taken, in ms. With a countdown this is the time used, not
    /// the time left.
    pub time_ms: i64,
    pub new_high_score: bool,
    pub new_best_time: bool,
}

impl Records {
    /// `elapsed` is what the world reports: time played, or time left
    /// when the level has a countdown.
    pub fn evaluate(level: &LevelInfo, score: i32, elapsed: u64) -> Self {
        let elapsed = elapsed as i64;
        let time_ms = if level.countdown_ms > 0 {
            level.countdown_ms as i64 - elapsed
        } else {
            elapsed
        };
        Records {
            score,
            time_ms,
            new_high_score: score > level.high_score,
            new_best_time: time_ms < level.best_time_ms || level.best_time_ms <= 0,
        }
    }

    /// Store whichever records were beaten.
    pub fn apply(&self, level: &mut LevelInfo) {
        if self.new_high_score {
            level.high_score = self.score;
        }
        if self.new_best_time {
            level.best_time_ms = self.time_ms;
        }
    }
}

/// `MM:SS`, or `HH:MM:SS` once there are hours. Negative times read as 0.
pub fn format_time(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    let (hrs, min, sec) = (secs / 3600, secs / 60 % 60, secs % 60);
    if hrs > 0 {
        format!("{hrs:02}:{min:02}:{sec:02}")
    } else {
        format!("{min:02}:{sec:02}")
    }
}
