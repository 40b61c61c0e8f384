//! Per-thread spin budget used by [`RawSpinLock`](crate::RawSpinLock).
//!
//! Each thread starts at [`SpinBudget::DEFAULT`]. Exchange with a
//! [`SharedSpinEstimate`] happens only at the points the thread picks:
//! [`adopt_shared`] when it starts contending, [`recompute`] when it is done,
//! or both at once through [`SharedSpinEstimate::enter`].

use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::Location;

use crate::budget::{SharedSpinEstimate, SpinBudget};
use crate::flag::TestAndSet;
use crate::platform::{Platform, StdPlatform};
use crate::wait::{Acquired, SpinContext};

thread_local! {
    static BUDGET: Cell<SpinBudget> = const { Cell::new(SpinBudget::DEFAULT) };
}

/// The calling thread's current budget.
pub fn budget() -> SpinBudget {
    BUDGET.with(Cell::get)
}

/// Overwrites the calling thread's budget with the shared estimate.
pub fn adopt_shared(shared: u32) {
    BUDGET.with(|b| {
        let mut budget = b.get();
        budget.adopt_shared(shared);
        b.set(budget);
    });
}

/// New shared estimate from `shared` and the calling thread's budget.
pub fn recompute(shared: u32) -> u32 {
    budget().recompute(shared)
}

/// Runs the adaptive wait on the calling thread's budget. Never returns if
/// the lock is stuck.
pub(crate) fn acquire_slow<F: TestAndSet + ?Sized>(
    flag: &F,
    site: &'static Location<'static>,
) -> Acquired {
    let mut ctx = SpinContext::with_budget(StdPlatform, budget());
    let acquired = match ctx.wait_at(flag, site) {
        Ok(acquired) => acquired,
        Err(err) => ctx.platform_mut().fatal(&err),
    };
    BUDGET.with(|b| b.set(ctx.budget()));
    acquired
}

/// Scope of a thread's participation in a [`SharedSpinEstimate`], created by
/// [`SharedSpinEstimate::enter`]. Publishes the thread's budget on drop.
#[must_use = "the budget is published when the scope is dropped"]
pub struct EstimateScope<'a> {
    shared: &'a SharedSpinEstimate,
    // the thread-local it publishes from is this thread's
    _not_send: PhantomData<*const ()>,
}

impl<'a> EstimateScope<'a> {
    pub(crate) fn new(shared: &'a SharedSpinEstimate) -> Self {
        adopt_shared(shared.load());
        Self {
            shared,
            _not_send: PhantomData,
        }
    }
}

impl Drop for EstimateScope<'_> {
    fn drop(&mut self) {
        self.shared.publish(budget());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::TasFlag;
    use std::thread;

    #[test]
    fn test_thread_starts_at_default() {
        thread::spawn(|| assert_eq!(budget(), SpinBudget::DEFAULT))
            .join()
            .unwrap();
    }

    #[test]
    fn test_adopt_and_recompute() {
        thread::spawn(|| {
            adopt_shared(16);
            assert_eq!(budget().get(), 16);
            assert_eq!(recompute(160), 151);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_budgets_are_per_thread() {
        adopt_shared(500);
        thread::spawn(|| assert_eq!(budget(), SpinBudget::DEFAULT))
            .join()
            .unwrap();
        assert_eq!(budget().get(), 500);
    }

    #[test]
    fn test_slow_path_updates_thread_budget() {
        thread::spawn(|| {
            let flag = TasFlag::new();
            acquire_slow(&flag, Location::caller());
            assert!(!flag.is_free());
            assert_eq!(budget().get(), 200);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_scope_adopts_then_publishes() {
        let shared = SharedSpinEstimate::with_value(160);
        thread::scope(|s| {
            s.spawn(|| {
                let scope = shared.enter();
                assert_eq!(budget().get(), 160);
                adopt_shared(16);
                drop(scope);
            });
        });
        assert_eq!(shared.load(), 151);
    }
}
