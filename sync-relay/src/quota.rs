//! Daily budget for the priority channel.

/// Default number of priority sends allowed per UTC day.
pub const DEFAULT_PRIORITY_DAILY_LIMIT: u32 = 50;

const SECONDS_PER_DAY: u64 = 86_400;

/// Tracks how much of the priority channel's daily budget is left.
///
/// The window is the UTC calendar day of the supplied timestamp.
/// Exhaustion is not an error: callers skip the send, and the skip
/// count is kept for diagnostics.
#[derive(Debug, Clone)]
pub struct PriorityQuota {
    daily_limit: u32,
    used: u32,
    skipped: u64,
    window_day: u64,
}

impl PriorityQuota {
    /// Create a quota with the given daily limit.
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            used: 0,
            skipped: 0,
            window_day: 0,
        }
    }

    /// Try to consume one send from the budget at `now` (epoch secs).
    ///
    /// Returns true when the send may proceed. Crossing into a new
    /// UTC day resets the budget.
    pub fn try_consume(&mut self, now: u64) -> bool {
        let day = now / SECONDS_PER_DAY;
        if day != self.window_day {
            self.window_day = day;
            self.used = 0;
        }
        if self.used < self.daily_limit {
            self.used += 1;
            true
        } else {
            self.skipped += 1;
            false
        }
    }

    /// Sends remaining in the current window as of `now`.
    pub fn remaining(&self, now: u64) -> u32 {
        if now / SECONDS_PER_DAY != self.window_day {
            return self.daily_limit;
        }
        self.daily_limit.saturating_sub(self.used)
    }

    /// Total sends skipped across all windows.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Default for PriorityQuota {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_DAILY_LIMIT)
    }
}
