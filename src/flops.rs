//! Diagnostic floating-point operation counting.
//!
//! There is no shared process-wide counter.  Work either accumulates into an
//! explicit [`FlopCounter`] owned by its execution context, or into this
//! thread's local counter via [`add_flops`].  At a phase boundary each thread
//! drains its local count with [`take_local_flops`] and the results are
//! merged with [`FlopCounter::merge`].

use std::cell::Cell;

thread_local! {
    static LOCAL_FLOPS: Cell<f64> = const { Cell::new(0.0) };
}

/// Non-negative flop accumulator for one execution context.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlopCounter {
    count: f64,
}

impl FlopCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, flops: f64) {
        self.count += flops;
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn zero(&mut self) {
        self.count = 0.0;
    }

    pub fn merge(&mut self, other: &FlopCounter) {
        self.count += other.count;
    }
}

/// Record flops on this thread's counter.  Compiles to nothing unless the
/// `log-flops` feature is enabled.
#[inline]
pub fn add_flops(flops: f64) {
    #[cfg(feature = "log-flops")]
    LOCAL_FLOPS.with(|c| c.set(c.get() + flops));
    #[cfg(not(feature = "log-flops"))]
    let _ = flops;
}

/// Flops counted on this thread since the last reset.
pub fn get_num_flops() -> f64 {
    LOCAL_FLOPS.with(Cell::get)
}

/// Reset this thread's counter.
pub fn zero_num_flops() {
    LOCAL_FLOPS.with(|c| c.set(0.0));
}

/// Drain this thread's counter into a [`FlopCounter`] for merging.
pub fn take_local_flops() -> FlopCounter {
    FlopCounter {
        count: LOCAL_FLOPS.with(|c| c.replace(0.0)),
    }
}
