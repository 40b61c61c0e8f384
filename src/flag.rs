//! # Test-and-set flag
//!
//! The single word of shared state behind every lock in this crate. The wait
//! loop only ever talks to it through [`TestAndSet`], so the way the atomic
//! swap is realized on a given CPU stays out of the algorithm.
//!
//! [`TasFlag`] is the implementation shipped with the crate. Which instruction
//! sequence it uses is chosen at build time from `target_arch`:
//!
//! - **x86 / x86_64**: a plain atomic swap (`xchg`), which is already a full
//!   barrier and cheap to retry.
//! - **everything else**: test-and-test-and-set. A relaxed load is tried first
//!   and the swap is only issued when the word looks free, so waiters do not
//!   keep stealing the cache line from the holder on LL/SC machines.
//!
//! ## Example
//! ```rust
//! use pgspin::{TasFlag, TestAndSet};
//!
//! let flag = TasFlag::new();
//! assert!(flag.is_free());
//! assert!(!flag.try_acquire()); // was free, now held by us
//! assert!(flag.try_acquire()); // already held
//! unsafe { flag.release() };
//! assert!(flag.is_free());
//! ```

use core::hint::spin_loop;
use core::sync::atomic::{
    AtomicBool,
    Ordering::{Acquire, Relaxed, Release},
};

/// The atomic capability the wait loop consumes.
///
/// # Safety
/// Implementors must guarantee that when `try_acquire` returns `false`, no other
/// caller can observe `false` from `try_acquire` until `release` is called, and
/// that `try_acquire`/`release` carry acquire/release ordering respectively.
pub unsafe trait TestAndSet {
    /// Atomically sets the flag. Returns `true` if it was **already held**, in
    /// which case the caller did not get it.
    fn try_acquire(&self) -> bool;

    /// Clears the flag unconditionally.
    ///
    /// # Safety
    /// The caller must be the current holder.
    unsafe fn release(&self);

    /// Non-atomic snapshot of the state, for assertions and diagnostics only.
    fn is_free(&self) -> bool;

    /// CPU-specific pause between two failed attempts.
    #[inline(always)]
    fn spin_delay(&self) {
        spin_loop();
    }
}

/// A test-and-set word, `false` = free, `true` = held.
#[repr(transparent)]
pub struct TasFlag {
    held: AtomicBool,
}

impl TasFlag {
    /// A free flag, usable in `const` and `static` contexts.
    #[allow(clippy::declare_interior_mutable_const)]
    pub const INIT: Self = Self::new();

    /// Creates a flag in the free state.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Address of the word, used to identify the lock in stuck-lock reports.
    #[inline]
    pub fn addr(&self) -> usize {
        &self.held as *const AtomicBool as usize
    }
}

impl Default for TasFlag {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl TestAndSet for TasFlag {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[inline(always)]
    fn try_acquire(&self) -> bool {
        self.held.swap(true, Acquire)
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    #[inline(always)]
    fn try_acquire(&self) -> bool {
        // only go for the swap when the word looks free
        self.held.load(Relaxed) || self.held.swap(true, Acquire)
    }

    #[inline(always)]
    unsafe fn release(&self) {
        self.held.store(false, Release);
    }

    #[inline(always)]
    fn is_free(&self) -> bool {
        !self.held.load(Relaxed)
    }
}

impl core::fmt::Debug for TasFlag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TasFlag")
            .field("held", &!self.is_free())
            .finish()
    }
}
