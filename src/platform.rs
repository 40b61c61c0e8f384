//! Services the wait loop needs from its environment: a blocking sleep, a
//! jitter source and a way to die.
//!
//! [`StdPlatform`] is what the lock types use. [`SelfTestPlatform`] is the
//! noisy variant the `pgspin-selftest` binary runs with.

use crate::StuckLock;

/// Environment of a waiting context.
pub trait Platform {
    /// Suspends the calling context for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);

    /// A uniformly distributed value in `[0, 1)`.
    fn random_unit(&mut self) -> f64;

    /// Reports a stuck lock and terminates the calling context.
    fn fatal(&mut self, err: &StuckLock) -> !;
}

impl<P: Platform + ?Sized> Platform for &mut P {
    #[inline]
    fn sleep_ms(&mut self, ms: u32) {
        (**self).sleep_ms(ms)
    }

    #[inline]
    fn random_unit(&mut self) -> f64 {
        (**self).random_unit()
    }

    fn fatal(&mut self, err: &StuckLock) -> ! {
        (**self).fatal(err)
    }
}

/// Thread sleep, thread-local `rand` generator, abort on stuck locks.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPlatform;

#[cfg(feature = "std")]
impl Platform for StdPlatform {
    #[inline]
    fn sleep_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    #[inline]
    fn random_unit(&mut self) -> f64 {
        use rand::Rng;
        rand::rng().random::<f64>()
    }

    #[cold]
    fn fatal(&mut self, err: &StuckLock) -> ! {
        eprintln!("PANIC: {err}");
        std::process::abort()
    }
}

/// Prints a `*` after every sleep and exits with status 1 on a stuck lock.
///
/// Markers go to stdout unless another writer is supplied.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SelfTestPlatform<W = std::io::Stdout> {
    out: W,
}

#[cfg(feature = "std")]
impl SelfTestPlatform {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// The line printed before exiting on a stuck lock.
    pub fn stuck_report(err: &StuckLock) -> String {
        format!(
            "\nStuck spinlock ({:#x}) detected at {}:{}.",
            err.lock_addr(),
            err.site().file(),
            err.site().line()
        )
    }
}

#[cfg(feature = "std")]
impl Default for SelfTestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write> SelfTestPlatform<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_writer(self) -> W {
        self.out
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write> Platform for SelfTestPlatform<W> {
    fn sleep_ms(&mut self, ms: u32) {
        StdPlatform.sleep_ms(ms);
        // progress marker only, a closed stdout must not stop the wait
        let _ = self.out.write_all(b"*");
        let _ = self.out.flush();
    }

    fn random_unit(&mut self) -> f64 {
        StdPlatform.random_unit()
    }

    fn fatal(&mut self, err: &StuckLock) -> ! {
        let _ = self.out.flush();
        eprintln!("{}", <SelfTestPlatform>::stuck_report(err));
        std::process::exit(1)
    }
}
