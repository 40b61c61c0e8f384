//! # pgspin
//!
//! A test-and-set spinlock for very short critical sections in memory shared
//! by several threads or processes, including places where a blocking mutex
//! is not an option.
//!
//! Waiting starts as a busy spin and escalates to randomized sleeps. How long
//! to spin before sleeping adapts to the machine, and a wait that never ends
//! is reported as a stuck lock instead of hanging forever.
//!
//! The crate includes:
//!
//! - [`TasFlag`] / [`TestAndSet`]: the atomic lock word and the contract the
//!   wait loop needs from it.
//! - [`SpinContext`]: the wait loop, owning a per-context [`SpinBudget`].
//! - [`DelaySchedule`](backoff::DelaySchedule): the randomized sleep schedule.
//! - [`SharedSpinEstimate`]: pooling spin budgets across contexts.
//! - [`SpinLock<T>`], [`RawSpinLock`] and the `lock_api` based [`Mutex<T>`]
//!   (with `std`).
//!
//! ## Quick Example
//!
//! ```rust
//! use pgspin::{SharedSpinEstimate, SpinLock};
//!
//! static ESTIMATE: SharedSpinEstimate = SharedSpinEstimate::new();
//! static TOTAL: SpinLock<u64> = SpinLock::new(0);
//!
//! let workers: Vec<_> = (0..4)
//!     .map(|_| {
//!         std::thread::spawn(|| {
//!             let _scope = ESTIMATE.enter();
//!             for _ in 0..1000 {
//!                 *TOTAL.lock() += 1;
//!             }
//!         })
//!     })
//!     .collect();
//! for w in workers {
//!     w.join().unwrap();
//! }
//! assert_eq!(*TOTAL.lock(), 4000);
//! ```
//!
//! ## Design
//!
//! ### Waiting
//!
//! A contended acquisition spins up to the context's spin budget, then sleeps
//! for a duration that starts at 1 ms and grows by a random factor in `[1, 2]`
//! each time, wrapping back to 1 ms once it passes a second. After
//! [`NUM_DELAYS`] sleeps the lock is declared stuck.
//!
//! ### Spin budget
//!
//! A wait that never slept raises the budget by 100; a wait that slept lowers
//! it by 1. It settles at the maximum on multiprocessors and at the minimum on
//! uniprocessors.
//!
//! ### Stuck locks
//!
//! [`SpinContext::wait`] returns [`StuckLock`]; everything else turns it into
//! process termination through [`Platform::fatal`].
//!
//! ## Feature flags
//! - **`std`** (default): [`StdPlatform`], per-thread budgets, the lock types.
//!   Without it the crate is `no_std` and the caller supplies a [`Platform`].

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod backoff;
pub mod budget;
#[cfg(feature = "std")]
pub mod context;
mod error;
pub mod flag;
pub mod platform;
#[cfg(feature = "std")]
pub mod spinlock;
pub mod wait;

pub use backoff::{MAX_DELAY_MSEC, MIN_DELAY_MSEC, NUM_DELAYS};
pub use budget::{
    SharedSpinEstimate, SpinBudget, DEFAULT_SPINS_PER_DELAY, MAX_SPINS_PER_DELAY,
    MIN_SPINS_PER_DELAY,
};
pub use error::StuckLock;
pub use flag::{TasFlag, TestAndSet};
pub use platform::Platform;
#[cfg(feature = "std")]
pub use platform::{SelfTestPlatform, StdPlatform};
#[cfg(feature = "std")]
pub use spinlock::{Mutex, MutexGuard, RawSpinLock, SpinGuard, SpinLock};
pub use wait::{Acquired, SpinContext};
