//! # Sleep backoff
//!
//! Once a waiter has burned through its spin budget it starts sleeping, and
//! [`DelaySchedule`] decides for how long. The first sleep is
//! [`MIN_DELAY_MSEC`]; every following one grows the previous duration by a
//! random fraction of itself, so each step lies in `[prev, 2 * prev]`.
//!
//! The growth matters under heavy contention: a holder that the scheduler has
//! pushed down in priority only runs once every waiter is asleep, and a fixed
//! 1 ms sleep could starve it forever. Once the duration passes
//! [`MAX_DELAY_MSEC`] it wraps back to the minimum instead of being clamped,
//! which keeps the number of tries within a reasonable wall-clock time.
//!
//! After [`NUM_DELAYS`] sleeps the wait is declared stuck. The total number of
//! tries is fixed rather than the total time, which fixes the probability of
//! a false alarm. With the defaults that is roughly two minutes of waiting.
//!
//! ## Example
//! ```rust
//! use pgspin::backoff::{DelaySchedule, MIN_DELAY_MSEC};
//!
//! let mut delay = DelaySchedule::new();
//! assert_eq!(delay.next_cycle(), Some(MIN_DELAY_MSEC));
//! delay.grow(0.5);
//! assert_eq!(delay.current_ms(), 2);
//! ```

/// Number of delay cycles a wait may go through before it is stuck.
pub const NUM_DELAYS: u32 = 1000;

/// First sleep, and the value the schedule wraps back to.
pub const MIN_DELAY_MSEC: u32 = 1;

/// Largest sleep; exceeding it resets the schedule to [`MIN_DELAY_MSEC`].
pub const MAX_DELAY_MSEC: u32 = 1000;

/// Per-wait sleep state. Lives for one acquisition only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelaySchedule {
    /// 0 until the first delay cycle.
    cur_delay: u32,
    delays: u32,
}

impl DelaySchedule {
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            cur_delay: 0,
            delays: 0,
        }
    }

    /// Starts a delay cycle.
    ///
    /// Returns the number of milliseconds to sleep, or `None` once the cycle
    /// count passes [`NUM_DELAYS`], i.e. the lock is stuck.
    #[inline]
    pub fn next_cycle(&mut self) -> Option<u32> {
        self.delays += 1;
        if self.delays > NUM_DELAYS {
            return None;
        }

        if self.cur_delay == 0 {
            self.cur_delay = MIN_DELAY_MSEC;
        }
        Some(self.cur_delay)
    }

    /// Grows the current delay by `random` (in `[0, 1)`) times itself,
    /// rounded to the nearest millisecond, wrapping to the minimum past
    /// [`MAX_DELAY_MSEC`].
    #[inline]
    pub fn grow(&mut self, random: f64) {
        let cur = self.cur_delay.max(MIN_DELAY_MSEC);
        let step = (cur as f64 * random + 0.5) as u32;

        self.cur_delay = cur.saturating_add(step);
        if self.cur_delay > MAX_DELAY_MSEC {
            self.cur_delay = MIN_DELAY_MSEC;
        }
    }

    /// Delay the next cycle will sleep for; 0 before the first cycle.
    #[inline(always)]
    pub fn current_ms(&self) -> u32 {
        self.cur_delay
    }

    /// Number of delay cycles started so far.
    #[inline(always)]
    pub fn delays(&self) -> u32 {
        self.delays
    }

    /// Whether at least one delay cycle has happened.
    #[inline(always)]
    pub fn has_delayed(&self) -> bool {
        self.cur_delay != 0
    }
}

impl Default for DelaySchedule {
    fn default() -> Self {
        Self::new()
    }
}
