//! # Spin budget
//!
//! How many failed test-and-set attempts a waiter makes before it gives up the
//! CPU and sleeps. On a uniprocessor spinning is pure waste (the holder cannot
//! run while we spin), on a multiprocessor a short spin is much cheaper than a
//! trip through the kernel. Nobody tells us which one we are on, so the budget
//! learns it from how waits end:
//!
//! - a wait that never had to sleep raises the budget by [`SPINS_INCREMENT`],
//! - a wait that slept at least once lowers it by [`SPINS_DECREMENT`].
//!
//! It climbs fast and decays slowly, converging to [`MAX_SPINS_PER_DELAY`] on
//! machines with several execution units and to [`MIN_SPINS_PER_DELAY`] on a
//! single one.
//!
//! A single context rarely lives long enough to converge, so observations are
//! pooled in a [`SharedSpinEstimate`]: a context adopts the shared value when it
//! starts and folds its own value back in when it exits.

use core::sync::atomic::{AtomicU32, Ordering::Relaxed};

/// Lower bound of the budget. Going to 1 is not safe: some CPUs always fail
/// the first test-and-set after returning from the kernel.
pub const MIN_SPINS_PER_DELAY: u32 = 10;

/// Upper bound of the budget.
pub const MAX_SPINS_PER_DELAY: u32 = 1000;

/// Budget of a context that has not adopted a shared estimate yet.
pub const DEFAULT_SPINS_PER_DELAY: u32 = 100;

/// Step applied after a wait that never slept.
pub const SPINS_INCREMENT: u32 = 100;

/// Step applied after a wait that slept.
pub const SPINS_DECREMENT: u32 = 1;

/// Weight of the existing shared value in [`SpinBudget::recompute`], out of 16.
const SHARED_WEIGHT: u32 = 15;

/// Per-context spin budget, always within
/// `MIN_SPINS_PER_DELAY..=MAX_SPINS_PER_DELAY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpinBudget(u32);

impl SpinBudget {
    /// The starting budget of a fresh context.
    pub const DEFAULT: Self = Self(DEFAULT_SPINS_PER_DELAY);

    /// Creates a budget, clamping `spins` into the allowed range.
    #[inline]
    pub const fn new(spins: u32) -> Self {
        Self(clamp(spins))
    }

    #[inline(always)]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Records a wait that acquired the lock without sleeping.
    #[inline]
    pub fn record_success(&mut self) {
        if self.0 < MAX_SPINS_PER_DELAY {
            self.0 = (self.0 + SPINS_INCREMENT).min(MAX_SPINS_PER_DELAY);
        }
    }

    /// Records a wait that went through at least one delay cycle.
    #[inline]
    pub fn record_delayed(&mut self) {
        if self.0 > MIN_SPINS_PER_DELAY {
            self.0 = (self.0 - SPINS_DECREMENT).max(MIN_SPINS_PER_DELAY);
        }
    }

    /// Overwrites the local budget with the shared estimate.
    ///
    /// Called once at context start, possibly while holding an unrelated
    /// lock, so it does nothing but a store. Out-of-range values are clamped.
    #[inline(always)]
    pub fn adopt_shared(&mut self, shared: u32) {
        self.0 = clamp(shared);
    }

    /// New shared estimate: `(shared * 15 + local) / 16`.
    ///
    /// Truncates instead of rounding so that a single `-1` step in one
    /// context can still move the shared value. Pure; storing the result is
    /// up to the caller. If `shared` is in range the result is too.
    #[inline(always)]
    pub const fn recompute(self, shared: u32) -> u32 {
        // u64 keeps arbitrary caller-supplied values from overflowing
        ((shared as u64 * SHARED_WEIGHT as u64 + self.0 as u64) / 16) as u32
    }
}

impl Default for SpinBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<SpinBudget> for u32 {
    fn from(budget: SpinBudget) -> u32 {
        budget.0
    }
}

#[inline(always)]
const fn clamp(spins: u32) -> u32 {
    if spins < MIN_SPINS_PER_DELAY {
        MIN_SPINS_PER_DELAY
    } else if spins > MAX_SPINS_PER_DELAY {
        MAX_SPINS_PER_DELAY
    } else {
        spins
    }
}

/// Shared slot holding the converged budget across contexts.
///
/// Place it wherever the contexts can all see it (a `static`, or shared
/// memory mapped by every process). Each update is a single atomic
/// read-modify-write, so no outer lock is needed.
///
/// ```rust
/// use pgspin::{SharedSpinEstimate, SpinBudget};
///
/// static ESTIMATE: SharedSpinEstimate = SharedSpinEstimate::new();
///
/// let mut budget = SpinBudget::default();
/// ESTIMATE.adopt_into(&mut budget);
/// // ... contend on locks, the budget adapts ...
/// ESTIMATE.publish(budget);
/// ```
#[derive(Debug)]
pub struct SharedSpinEstimate {
    spins: AtomicU32,
}

impl SharedSpinEstimate {
    /// A slot initialized to [`DEFAULT_SPINS_PER_DELAY`].
    pub const fn new() -> Self {
        Self::with_value(DEFAULT_SPINS_PER_DELAY)
    }

    /// A slot initialized to `spins`, clamped into range.
    pub const fn with_value(spins: u32) -> Self {
        Self {
            spins: AtomicU32::new(clamp(spins)),
        }
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.spins.load(Relaxed)
    }

    /// Context start: copy the shared estimate into `budget`.
    #[inline]
    pub fn adopt_into(&self, budget: &mut SpinBudget) {
        budget.adopt_shared(self.load());
    }

    /// Context exit: fold `budget` into the shared estimate. Returns the
    /// value stored.
    pub fn publish(&self, budget: SpinBudget) -> u32 {
        let prev = self
            .spins
            .fetch_update(Relaxed, Relaxed, |shared| Some(budget.recompute(shared)))
            .unwrap_or_else(|current| current);
        budget.recompute(prev)
    }

    /// Adopts the shared estimate into the calling thread's context and
    /// returns a guard that publishes the thread's budget back on drop.
    #[cfg(feature = "std")]
    pub fn enter(&self) -> crate::context::EstimateScope<'_> {
        crate::context::EstimateScope::new(self)
    }
}

impl Default for SharedSpinEstimate {
    fn default() -> Self {
        Self::new()
    }
}
