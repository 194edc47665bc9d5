//! Framework-wide static state: reduction operators registered with the
//! messaging substrate, plus accumulated flop counts.
//!
//! [`Environment`] is the scoped form: construction registers the min / max
//! reductions, `Drop` releases them.  [`initialize`], [`is_initialized`] and
//! [`finalize`] keep one `Environment` per process for callers that cannot
//! thread a handle through (the C ABI, mainly).

use crate::flops::FlopCounter;
use crate::scalar::Scalar;
use crate::types::TacsError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

// ─────────────────────────────────────────────────────────────
//  Substrate contract
// ─────────────────────────────────────────────────────────────

/// Commutative reductions the framework registers with the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOp {
    Min,
    Max,
}

/// Opaque handle issued by the substrate for a registered reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpHandle(pub u64);

/// The distributed messaging layer, seen only through the two hooks the
/// framework needs.
pub trait MessagingSubstrate: Send + fmt::Debug {
    fn register_reduction(&mut self, op: ReductionOp) -> Result<OpHandle, TacsError>;
    fn release_reduction(&mut self, handle: OpHandle);
}

/// Elementwise `inout[i] = min(inout[i], input[i])`, compared by real part.
pub fn reduce_min<S: Scalar>(inout: &mut [S], input: &[S]) {
    for (a, &b) in inout.iter_mut().zip(input) {
        if b.real_part() < a.real_part() {
            *a = b;
        }
    }
}

/// Elementwise `inout[i] = max(inout[i], input[i])`, compared by real part.
pub fn reduce_max<S: Scalar>(inout: &mut [S], input: &[S]) {
    for (a, &b) in inout.iter_mut().zip(input) {
        if b.real_part() > a.real_part() {
            *a = b;
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  In-process substrate
// ─────────────────────────────────────────────────────────────

/// Single-process substrate: keeps a registry of live reductions and applies
/// them to local buffers.
#[derive(Debug, Default)]
pub struct LocalSubstrate {
    next_handle: u64,
    live: HashMap<OpHandle, ReductionOp>,
}

impl LocalSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_live(&self) -> usize {
        self.live.len()
    }

    /// Combine `input` into `inout` with a registered reduction.
    pub fn reduce<S: Scalar>(
        &self,
        handle: OpHandle,
        inout: &mut [S],
        input: &[S],
    ) -> Result<(), TacsError> {
        if inout.len() != input.len() {
            return Err(TacsError::Shape(format!(
                "reduction buffers differ in length ({} vs {})",
                inout.len(),
                input.len()
            )));
        }
        match self.live.get(&handle) {
            Some(ReductionOp::Min) => reduce_min(inout, input),
            Some(ReductionOp::Max) => reduce_max(inout, input),
            None => {
                return Err(TacsError::Substrate(format!(
                    "reduction handle {} is not registered",
                    handle.0
                )))
            }
        }
        Ok(())
    }
}

impl MessagingSubstrate for LocalSubstrate {
    fn register_reduction(&mut self, op: ReductionOp) -> Result<OpHandle, TacsError> {
        let handle = OpHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, op);
        Ok(handle)
    }

    fn release_reduction(&mut self, handle: OpHandle) {
        self.live.remove(&handle);
    }
}

// ─────────────────────────────────────────────────────────────
//  Environment
// ─────────────────────────────────────────────────────────────

/// Registered substrate state for the lifetime of this value.
#[derive(Debug)]
pub struct Environment {
    substrate: Box<dyn MessagingSubstrate>,
    min_op: OpHandle,
    max_op: OpHandle,
    flops: FlopCounter,
}

impl Environment {
    /// Register the min and max reductions with `substrate`.
    pub fn new(mut substrate: Box<dyn MessagingSubstrate>) -> Result<Self, TacsError> {
        let min_op = substrate.register_reduction(ReductionOp::Min)?;
        let max_op = match substrate.register_reduction(ReductionOp::Max) {
            Ok(h) => h,
            Err(e) => {
                substrate.release_reduction(min_op);
                return Err(e);
            }
        };
        debug!(?min_op, ?max_op, "registered reduction operators");
        Ok(Self {
            substrate,
            min_op,
            max_op,
            flops: FlopCounter::new(),
        })
    }

    pub fn min_op(&self) -> OpHandle {
        self.min_op
    }

    pub fn max_op(&self) -> OpHandle {
        self.max_op
    }

    pub fn substrate(&self) -> &dyn MessagingSubstrate {
        self.substrate.as_ref()
    }

    /// Fold a phase's flop count into the environment total.
    pub fn record_flops(&mut self, counter: &FlopCounter) {
        self.flops.merge(counter);
    }

    pub fn total_flops(&self) -> f64 {
        self.flops.count()
    }

    pub fn zero_flops(&mut self) {
        self.flops.zero();
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.substrate.release_reduction(self.max_op);
        self.substrate.release_reduction(self.min_op);
        debug!("released reduction operators");
    }
}

// ─────────────────────────────────────────────────────────────
//  Process-wide guard
// ─────────────────────────────────────────────────────────────

static ENVIRONMENT: Mutex<Option<Environment>> = Mutex::new(None);

fn environment() -> MutexGuard<'static, Option<Environment>> {
    ENVIRONMENT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set up the process-wide environment on a [`LocalSubstrate`].
pub fn initialize() -> Result<(), TacsError> {
    initialize_with(|| Box::new(LocalSubstrate::new()))
}

/// Set up the process-wide environment on the substrate built by `factory`.
/// Does nothing (and does not call `factory`) when already initialised.
pub fn initialize_with<F>(factory: F) -> Result<(), TacsError>
where
    F: FnOnce() -> Box<dyn MessagingSubstrate>,
{
    let mut env = environment();
    if env.is_some() {
        trace!("initialize called on an initialised environment");
        return Ok(());
    }
    *env = Some(Environment::new(factory())?);
    Ok(())
}

pub fn is_initialized() -> bool {
    environment().is_some()
}

/// Tear down the process-wide environment, releasing substrate handles.
pub fn finalize() {
    let env = environment().take();
    if env.is_none() {
        trace!("finalize called without an environment");
    }
}

/// Run `f` against the process-wide environment, if there is one.
pub fn with_environment<R>(f: impl FnOnce(&mut Environment) -> R) -> Option<R> {
    environment().as_mut().map(f)
}
