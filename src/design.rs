//! Opt-in optimisation capabilities.
//!
//! An object that owns design variables implements [`DesignVars`]; an object
//! that also contributes rows to the global sparse constraint system
//! implements [`SparseConstraint`].  Every method has an empty default, so
//! an object that overrides nothing is a valid "contributes nothing" answer,
//! never an error.
//!
//! Objects are shared across the framework through
//! [`Ref`](crate::object::Ref), so every method takes `&self`; objects that
//! store design variables keep them behind interior mutability.

use crate::object::TacsObject;
use crate::scalar::{Scalar, TacsScalar};

// ─────────────────────────────────────────────────────────────
//  Design variables
// ─────────────────────────────────────────────────────────────

/// Objects exposing design variables to an external optimiser.
///
/// All slices span the whole global design vector; the optimiser owns the
/// numbering and each object touches only the slots it owns.  Slice lengths
/// must match the global size: partial writes are a caller contract
/// violation.
pub trait DesignVars<S: Scalar = TacsScalar>: TacsObject {
    /// Take new values for the owned slots of `dvs`.
    fn set_design_vars(&self, dvs: &[S]) {
        let _ = dvs;
    }

    /// Write current values into the owned slots of `dvs`.  Does not mutate
    /// the object.
    fn get_design_vars(&self, dvs: &mut [S]) {
        let _ = dvs;
    }

    /// Write object-intrinsic bounds for the owned slots.
    fn get_design_var_range(&self, lower: &mut [S], upper: &mut [S]) {
        let _ = (lower, upper);
    }
}

// ─────────────────────────────────────────────────────────────
//  Sparse constraints
// ─────────────────────────────────────────────────────────────

/// Objects contributing a block of rows to the global constraint matrix.
///
/// One assembly pass runs three phases, in order:
///
/// 1. **query**: [`is_linear`](Self::is_linear), [`num_con`](Self::num_con)
///    and [`con_csr_size`](Self::con_csr_size) size the global buffers;
/// 2. **pattern**: [`add_con_csr`](Self::add_con_csr) fills row pointers
///    and column indices at the assigned row offset;
/// 3. **evaluation**: [`eval_con`](Self::eval_con),
///    [`con_range`](Self::con_range) and
///    [`eval_con_dv_sens`](Self::eval_con_dv_sens) fill values, reusing the
///    phase-2 pattern unchanged.
///
/// An object with row offset `o` addresses rows `o .. o + num_con()` only.
/// The caller sets `rowp[o]` to the first free nonzero slot before phase 2.
/// Each method returns the number of entries it wrote.
pub trait SparseConstraint<S: Scalar = TacsScalar>: DesignVars<S> {
    fn is_linear(&self) -> bool {
        false
    }

    fn num_con(&self) -> usize {
        0
    }

    /// Number of structural nonzeros in this object's rows.
    fn con_csr_size(&self) -> usize {
        0
    }

    /// Write bounds for rows `offset .. offset + num_con()`.  Returning 0
    /// leaves those rows unbounded.
    fn con_range(&self, offset: usize, lb: &mut [S], ub: &mut [S]) -> usize {
        let _ = (offset, lb, ub);
        0
    }

    /// Write `rowp[offset + 1 ..= offset + num_con()]` and the matching
    /// column indices starting at `cols[rowp[offset]]`.
    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        let _ = (offset, rowp, cols);
        0
    }

    /// Write constraint values into `con[offset .. offset + num_con()]`.
    fn eval_con(&self, offset: usize, con: &mut [S]) -> usize {
        let _ = (offset, con);
        0
    }

    /// Write `d con / d x` into `a_col`, aligned entry for entry with the
    /// `cols` written by [`add_con_csr`](Self::add_con_csr).
    fn eval_con_dv_sens(
        &self,
        offset: usize,
        a_col: &mut [S],
        rowp: &[usize],
        cols: &[usize],
    ) -> usize {
        let _ = (offset, a_col, rowp, cols);
        0
    }
}

// ─────────────────────────────────────────────────────────────
//  Empty contributor
// ─────────────────────────────────────────────────────────────

/// An object that owns no design variables and no constraint rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDesignVars;

impl TacsObject for NoDesignVars {
    fn object_name(&self) -> &str {
        "NoDesignVars"
    }
}

impl<S: Scalar> DesignVars<S> for NoDesignVars {}

impl<S: Scalar> SparseConstraint<S> for NoDesignVars {}
