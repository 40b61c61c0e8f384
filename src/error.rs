//! The one failure the wait loop can produce.

use core::fmt;
use core::panic::Location;

/// A wait that ran through every delay cycle without seeing the lock free.
///
/// This is never a transient condition: the holder crashed, deadlocked or
/// forgot to release. The lock types in this crate turn it into process
/// termination through [`Platform::fatal`](crate::Platform::fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckLock {
    lock: usize,
    site: &'static Location<'static>,
}

impl StuckLock {
    pub(crate) fn new(lock: usize, site: &'static Location<'static>) -> Self {
        Self { lock, site }
    }

    /// Address of the lock word.
    pub fn lock_addr(&self) -> usize {
        self.lock
    }

    /// Where the failed acquisition was requested.
    pub fn site(&self) -> &'static Location<'static> {
        self.site
    }
}

impl fmt::Display for StuckLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stuck spinlock ({:#x}) detected at {}:{}",
            self.lock,
            self.site.file(),
            self.site.line()
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StuckLock {}
