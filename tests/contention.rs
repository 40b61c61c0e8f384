use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pgspin::{
    Platform, SharedSpinEstimate, SpinBudget, SpinContext, SpinLock, StdPlatform, StuckLock,
    TasFlag, TestAndSet, MAX_SPINS_PER_DELAY, MIN_SPINS_PER_DELAY,
};

/// Hands control to the holder on every sleep and waits until it answers.
struct Handoff {
    sleeping: mpsc::Sender<u32>,
    released: mpsc::Receiver<()>,
}

impl Platform for Handoff {
    fn sleep_ms(&mut self, ms: u32) {
        self.sleeping.send(ms).unwrap();
        self.released.recv().unwrap();
    }

    fn random_unit(&mut self) -> f64 {
        0.5
    }

    fn fatal(&mut self, err: &StuckLock) -> ! {
        panic!("{err}");
    }
}

#[test]
fn waiter_gets_lock_released_during_its_sleep() {
    let flag = Arc::new(TasFlag::new());
    assert!(!flag.try_acquire(), "A takes the free lock");

    let (sleep_tx, sleep_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let waiter = {
        let flag = flag.clone();
        thread::spawn(move || {
            let platform = Handoff {
                sleeping: sleep_tx,
                released: release_rx,
            };
            let mut ctx =
                SpinContext::with_budget(platform, SpinBudget::new(MIN_SPINS_PER_DELAY));
            let acquired = ctx.wait(&*flag);
            (acquired, ctx.budget())
        })
    };

    // B is in its first sleep; A lets go
    assert_eq!(sleep_rx.recv().unwrap(), 1);
    unsafe { flag.release() };
    release_tx.send(()).unwrap();

    let (acquired, budget) = waiter.join().unwrap();
    let acquired = acquired.expect("waiter must not report a stuck lock");
    assert_eq!(acquired.delays, 1, "first attempt after the sleep must win");
    assert_eq!(acquired.spins, MIN_SPINS_PER_DELAY);
    assert_eq!(budget.get(), MIN_SPINS_PER_DELAY);
    assert!(!flag.is_free(), "B holds the lock now");
}

#[test]
fn real_sleep_waiter_acquires_after_release() {
    let flag = Arc::new(TasFlag::new());
    flag.try_acquire();

    let waiter = {
        let flag = flag.clone();
        thread::spawn(move || {
            let mut ctx = SpinContext::new(StdPlatform);
            ctx.wait(&*flag)
        })
    };

    thread::sleep(Duration::from_millis(50));
    unsafe { flag.release() };

    let acquired = waiter.join().unwrap().expect("not stuck");
    assert!(acquired.slept(), "50ms of holding must push the waiter into sleeping");
}

#[test]
fn at_most_one_holder() {
    let lock = Arc::new(SpinLock::new(()));
    let inside = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (lock, inside, entries) = (lock.clone(), inside.clone(), entries.clone());
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let _guard = lock.lock();
                    assert!(!inside.swap(true, Ordering::Relaxed), "two holders at once");
                    entries.fetch_add(1, Ordering::Relaxed);
                    inside.store(false, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(entries.load(Ordering::Relaxed), 16_000);
    assert!(!lock.is_locked());
}

#[test]
fn shared_estimate_stays_in_range_under_contention() {
    let estimate = Arc::new(SharedSpinEstimate::new());
    let lock = Arc::new(SpinLock::new(0u64));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (estimate, lock) = (estimate.clone(), lock.clone());
            thread::spawn(move || {
                let _scope = estimate.enter();
                for _ in 0..5_000 {
                    *lock.lock() += 1;
                }
                let budget = pgspin::context::budget().get();
                assert!((MIN_SPINS_PER_DELAY..=MAX_SPINS_PER_DELAY).contains(&budget));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*lock.lock(), 20_000);
    let shared = estimate.load();
    assert!((MIN_SPINS_PER_DELAY..=MAX_SPINS_PER_DELAY).contains(&shared));
}
