//! # Wait loop
//!
//! [`SpinContext`] is the per-context handle that waits for a contended flag.
//! It owns the context's [`SpinBudget`] and its [`Platform`], so the adaptive
//! state is an explicit value that lives as long as the thread or process
//! that created it.
//!
//! A wait alternates between two phases:
//!
//! 1. **spin**: retry the test-and-set with a CPU pause in between, up to
//!    `budget` times;
//! 2. **delay**: sleep for the next [`DelaySchedule`] duration, then spin again.
//!
//! When the schedule runs out the wait fails with [`StuckLock`]. How the wait
//! ended is then fed back into the budget.
//!
//! ## Example
//! ```rust
//! use pgspin::{SpinContext, StdPlatform, TasFlag, TestAndSet};
//!
//! let flag = TasFlag::new();
//! let mut ctx = SpinContext::new(StdPlatform);
//!
//! ctx.acquire(&flag);
//! assert!(!flag.is_free());
//! unsafe { ctx.release(&flag) };
//! assert!(flag.is_free());
//! ```

use core::panic::Location;

use crate::backoff::DelaySchedule;
use crate::budget::SpinBudget;
use crate::flag::TestAndSet;
use crate::platform::Platform;
use crate::StuckLock;

/// How a successful wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acquired {
    /// Failed attempts across all spin phases.
    pub spins: u32,
    /// Delay cycles (sleeps) taken.
    pub delays: u32,
}

impl Acquired {
    /// Whether the wait had to sleep at least once.
    #[inline]
    pub fn slept(&self) -> bool {
        self.delays != 0
    }
}

/// Per-context waiting state.
#[derive(Debug)]
pub struct SpinContext<P> {
    budget: SpinBudget,
    platform: P,
}

impl<P: Platform> SpinContext<P> {
    /// A context starting at [`SpinBudget::DEFAULT`].
    #[inline]
    pub const fn new(platform: P) -> Self {
        Self::with_budget(platform, SpinBudget::DEFAULT)
    }

    #[inline]
    pub const fn with_budget(platform: P, budget: SpinBudget) -> Self {
        Self { budget, platform }
    }

    #[inline]
    pub fn budget(&self) -> SpinBudget {
        self.budget
    }

    #[inline]
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn into_parts(self) -> (SpinBudget, P) {
        (self.budget, self.platform)
    }

    /// Replaces the local budget with the shared estimate. See
    /// [`SpinBudget::adopt_shared`].
    #[inline]
    pub fn adopt_shared(&mut self, shared: u32) {
        self.budget.adopt_shared(shared);
    }

    /// New shared estimate from `shared` and this context's budget. See
    /// [`SpinBudget::recompute`].
    #[inline]
    pub fn recompute(&self, shared: u32) -> u32 {
        self.budget.recompute(shared)
    }

    /// Acquires `flag`, terminating through [`Platform::fatal`] if it is stuck.
    ///
    /// An uncontended flag is taken on the first attempt without touching the
    /// budget; only contended acquisitions go through [`wait`](Self::wait).
    #[track_caller]
    #[inline]
    pub fn acquire<F: TestAndSet + ?Sized>(&mut self, flag: &F) -> Acquired {
        if !flag.try_acquire() {
            return Acquired::default();
        }
        self.acquire_slow(flag, Location::caller())
    }

    #[cold]
    fn acquire_slow<F: TestAndSet + ?Sized>(
        &mut self,
        flag: &F,
        site: &'static Location<'static>,
    ) -> Acquired {
        match self.wait_at(flag, site) {
            Ok(acquired) => acquired,
            Err(err) => self.platform.fatal(&err),
        }
    }

    /// Waits until `flag` is acquired, or fails with [`StuckLock`] after
    /// [`NUM_DELAYS`](crate::NUM_DELAYS) delay cycles.
    ///
    /// The caller is reported as the call site.
    #[track_caller]
    #[inline]
    pub fn wait<F: TestAndSet + ?Sized>(&mut self, flag: &F) -> Result<Acquired, StuckLock> {
        self.wait_at(flag, Location::caller())
    }

    /// [`wait`](Self::wait) with an explicit call site.
    pub fn wait_at<F: TestAndSet + ?Sized>(
        &mut self,
        flag: &F,
        site: &'static Location<'static>,
    ) -> Result<Acquired, StuckLock> {
        let mut delay = DelaySchedule::new();
        let mut spins = 0;
        let mut total = 0u32;

        while flag.try_acquire() {
            flag.spin_delay();
            total = total.saturating_add(1);

            spins += 1;
            if spins >= self.budget.get() {
                let ms = match delay.next_cycle() {
                    Some(ms) => ms,
                    None => {
                        let addr = flag as *const F as *const () as usize;
                        return Err(StuckLock::new(addr, site));
                    }
                };

                self.platform.sleep_ms(ms);
                delay.grow(self.platform.random_unit());
                spins = 0;
            }
        }

        if delay.has_delayed() {
            self.budget.record_delayed();
        } else {
            self.budget.record_success();
        }

        Ok(Acquired {
            spins: total,
            delays: delay.delays(),
        })
    }

    /// Releases a flag previously acquired through this context.
    ///
    /// # Safety
    /// The calling context must hold `flag`.
    #[inline(always)]
    pub unsafe fn release<F: TestAndSet + ?Sized>(&self, flag: &F) {
        flag.release();
    }
}
