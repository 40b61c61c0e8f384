//! Self-test for the spinlock on the current target.
//!
//! Checks that a [`TasFlag`] fits its slot and goes through the free / held /
//! free / held transitions, then waits on the held flag. A working port prints
//! `NUM_DELAYS` stars (about two minutes) and exits through the stuck-lock
//! report with status 1.

use std::io::Write;
use std::process::ExitCode;

use pgspin::{SelfTestPlatform, SpinContext, TasFlag, TestAndSet, NUM_DELAYS};

const PAD: u8 = 0x44;

/// The lock sandwiched between two canaries that must survive every operation.
#[repr(C)]
struct TestLock {
    pad1: u8,
    lock: TasFlag,
    pad2: u8,
}

fn check(test: &TestLock, ok: bool, what: &str) -> Result<(), String> {
    if test.pad1 != PAD || test.pad2 != PAD {
        return Err("declared datatype is wrong size".into());
    }
    if !ok {
        return Err(what.into());
    }
    Ok(())
}

fn run(test: &TestLock, ctx: &mut SpinContext<SelfTestPlatform>) -> Result<(), String> {
    check(test, test.lock.is_free(), "lock not initialized")?;

    ctx.acquire(&test.lock);
    check(test, !test.lock.is_free(), "lock not locked")?;

    unsafe { ctx.release(&test.lock) };
    check(test, test.lock.is_free(), "lock not unlocked")?;

    ctx.acquire(&test.lock);
    check(test, !test.lock.is_free(), "lock not re-locked")
}

fn main() -> ExitCode {
    let test = TestLock {
        pad1: PAD,
        lock: TasFlag::new(),
        pad2: PAD,
    };
    let mut ctx = SpinContext::new(SelfTestPlatform::new());

    if let Err(msg) = run(&test, &mut ctx) {
        println!("S_LOCK_TEST: failed, {msg}");
        return ExitCode::FAILURE;
    }

    println!("S_LOCK_TEST: this will print {NUM_DELAYS} stars and then");
    println!("             exit with a 'stuck spinlock' message");
    println!("             if the wait loop and test-and-set are working.");
    let _ = std::io::stdout().flush();

    // never returns when the lock is held
    ctx.acquire(&test.lock);

    println!("S_LOCK_TEST: failed, lock not locked");
    ExitCode::FAILURE
}
