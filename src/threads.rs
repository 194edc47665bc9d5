//! Thread-count information handed to assembly and solve operations.

use crate::object::TacsObject;
use crate::types::MAX_NUM_THREADS;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Number of threads an operation should use.
///
/// Owned by the assembly coordinator and shared through
/// [`Ref`](crate::object::Ref).  The value is volatile: it may change between
/// any two calls, so read it once, right before sizing work, and never cache
/// it.  Out-of-range requests are clamped to `[1, MAX_NUM_THREADS]`.
#[derive(Debug)]
pub struct ThreadInfo {
    num_threads: AtomicUsize,
}

impl ThreadInfo {
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: AtomicUsize::new(clamp_threads(num_threads)),
        }
    }

    /// Set the active thread count; returns the value actually applied.
    pub fn set_num_threads(&self, num_threads: usize) -> usize {
        let n = clamp_threads(num_threads);
        self.num_threads.store(n, Ordering::Relaxed);
        n
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads.load(Ordering::Relaxed)
    }

    /// Split `0..len` into at most `num_threads()` contiguous chunks of
    /// near-equal size, reading the thread count exactly once.
    pub fn work_ranges(&self, len: usize) -> Vec<Range<usize>> {
        let n = self.num_threads().min(len.max(1));
        let base = len / n;
        let extra = len % n;
        let mut start = 0;
        (0..n)
            .map(|i| {
                let size = base + usize::from(i < extra);
                let r = start..start + size;
                start += size;
                r
            })
            .collect()
    }
}

impl Default for ThreadInfo {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TacsObject for ThreadInfo {
    fn object_name(&self) -> &str {
        "TACSThreadInfo"
    }
}

fn clamp_threads(n: usize) -> usize {
    let clamped = n.clamp(1, MAX_NUM_THREADS);
    if clamped != n {
        debug!(requested = n, applied = clamped, "thread count clamped");
    }
    clamped
}
