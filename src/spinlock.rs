//! # SpinLock
//!
//! Lock types built on [`TasFlag`] and the adaptive wait of
//! [`SpinContext`](crate::SpinContext), for critical sections of a few
//! instructions where a blocking mutex costs more than the work it protects.
//!
//! - [`RawSpinLock`] is the bare lock word. It implements
//!   [`lock_api::RawMutex`], so [`Mutex<T>`] comes for free.
//! - [`SpinLock<T>`] wraps data like the `lock_api` mutex, but records the
//!   caller of [`lock`](SpinLock::lock) so a stuck-lock report points at the
//!   line that tried to take it.
//!
//! Contended acquisitions use the calling thread's spin budget (see
//! [`context`](crate::context)), sleep when it is used up, and abort the
//! process after [`NUM_DELAYS`](crate::NUM_DELAYS) delay cycles.
//!
//! ## Caveats
//! - Not fair: any waiter can win, including the thread that just released.
//! - Not reentrant: locking twice from the same thread is reported as a stuck
//!   lock after a couple of minutes.
//! - Never hold it across blocking calls.
//!
//! ## Example
//! ```rust
//! use pgspin::SpinLock;
//!
//! static COUNTER: SpinLock<u32> = SpinLock::new(0);
//!
//! fn increment() {
//!     let mut guard = COUNTER.lock();
//!     *guard += 1;
//! }
//!
//! increment();
//! assert_eq!(*COUNTER.lock(), 1);
//! ```

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::panic::Location;

use lock_api::{GuardSend, RawMutex};

use crate::context;
use crate::flag::{TasFlag, TestAndSet};

/// A test-and-set lock word with adaptive waiting.
#[derive(Debug, Default)]
pub struct RawSpinLock {
    flag: TasFlag,
}

impl RawSpinLock {
    pub const fn new() -> Self {
        Self { flag: TasFlag::new() }
    }

    /// Acquires the lock, reporting the caller if it turns out to be stuck.
    #[track_caller]
    #[inline]
    pub fn acquire(&self) {
        if self.flag.try_acquire() {
            context::acquire_slow(&self.flag, Location::caller());
        }
    }

    /// Releases the lock.
    ///
    /// # Safety
    /// The calling thread must hold the lock.
    #[inline]
    pub unsafe fn release(&self) {
        self.flag.release();
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.flag.is_free()
    }

    /// The underlying flag, e.g. for waiting with a custom [`SpinContext`](crate::SpinContext).
    pub fn flag(&self) -> &TasFlag {
        &self.flag
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    #[track_caller]
    #[inline]
    fn lock(&self) {
        self.acquire();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.flag.try_acquire()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.release();
    }

    #[inline]
    fn is_locked(&self) -> bool {
        !self.flag.is_free()
    }
}

/// [`lock_api`] mutex over [`RawSpinLock`].
pub type Mutex<T> = lock_api::Mutex<RawSpinLock, T>;
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// A spinlock protecting a `T`.
pub struct SpinLock<T: ?Sized> {
    raw: RawSpinLock,
    data: UnsafeCell<T>,
}

/// Releases the [`SpinLock`] when dropped.
///
/// Shares like `&mut T`: the guard is only `Sync` when `T` is.
///
/// ```compile_fail
/// use pgspin::SpinGuard;
/// use std::cell::Cell;
///
/// fn assert_sync<S: Sync>() {}
/// assert_sync::<SpinGuard<'static, Cell<u32>>>();
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: ?Sized> SpinGuard<'a, T> {
    #[inline(always)]
    fn new(lock: &'a SpinLock<T>) -> Self {
        Self {
            lock,
            _marker: PhantomData,
        }
    }
}

impl<T> SpinLock<T> {
    /// Creates an unlocked [`SpinLock`] holding `data`.
    #[inline(always)]
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires the lock, waiting as long as it takes.
    ///
    /// Aborts the process with a stuck-lock report naming this call site if
    /// the lock is not released within [`NUM_DELAYS`](crate::NUM_DELAYS)
    /// delay cycles.
    #[track_caller]
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.raw.acquire();
        SpinGuard::new(self)
    }

    /// Takes the lock only if it is free right now.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(SpinGuard::new(self))
        } else {
            None
        }
    }

    /// Releases the lock without a guard.
    ///
    /// # Safety
    /// - Only call this if you own the lock, e.g. after `mem::forget` on a guard.
    #[inline]
    pub unsafe fn force_unlock(&self) {
        self.raw.release();
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        !self.raw.is_free()
    }

    /// Runs `f` with the lock held.
    #[track_caller]
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn raw(&self) -> &RawSpinLock {
        &self.raw
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.lock.raw.release() };
    }
}

// Safety: the flag gives one guard at a time exclusive access to the data.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_lock_unlock() {
        let lock = SpinLock::new(10);
        assert!(!lock.is_locked());

        {
            let mut guard = lock.lock();
            assert!(lock.is_locked());
            *guard += 5;
            assert_eq!(*guard, 15);
        }

        assert!(!lock.is_locked(), "Lock should be released after guard drop");
        assert_eq!(lock.into_inner(), 15);
    }

    #[test]
    fn test_try_lock_while_held() {
        let lock = SpinLock::new(42);

        let guard = lock.lock();
        assert!(lock.try_lock().is_none(), "Lock should not be acquirable while held");

        drop(guard);
        assert!(lock.try_lock().is_some(), "Lock should succeed after guard drop");
    }

    #[test]
    fn test_with_lock() {
        let lock = SpinLock::new(0i32);
        let out = lock.with_lock(|data| {
            *data += 1;
            *data * 2
        });
        assert_eq!(out, 2);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_force_unlock_after_forget() {
        let lock = SpinLock::new(());
        std::mem::forget(lock.lock());
        assert!(lock.is_locked());
        unsafe { lock.force_unlock() };
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_concurrent_access() {
        let lock = Arc::new(SpinLock::new(0usize));
        let mut handles = vec![];

        for _ in 0..8 {
            let lock_cloned = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    let mut guard = lock_cloned.lock();
                    *guard += 1;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.lock(), 8 * 10_000, "Counter should match total increments");
    }

    #[test]
    fn test_lock_api_mutex() {
        let m = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let m = m.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        m.lock().push(i * 100 + j);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut v = m.lock().clone();
        v.sort_unstable();
        assert_eq!(v, (0..400).collect::<Vec<_>>());
        assert!(!m.is_locked());
    }

    #[test]
    fn test_guard_sync_follows_data() {
        fn assert_sync<S: Sync>() {}
        fn assert_send<S: Send>() {}

        assert_sync::<SpinGuard<'static, u32>>();
        assert_sync::<SpinGuard<'static, std::sync::atomic::AtomicU32>>();
        // the lock itself is shareable for Send-only data, its guard is not
        assert_sync::<SpinLock<std::cell::Cell<u32>>>();
        assert_send::<SpinLock<std::cell::Cell<u32>>>();
    }

    #[test]
    fn test_raw_state_transitions() {
        let raw = RawSpinLock::INIT;
        assert!(raw.is_free());
        raw.lock();
        assert!(raw.is_locked());
        assert!(!raw.try_lock());
        unsafe { raw.unlock() };
        assert!(raw.is_free());
        assert!(raw.try_lock());
        unsafe { raw.unlock() };
    }
}
