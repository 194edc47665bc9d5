//! Global design problem: gathers design variables from every registered
//! object and drives the three-phase sparse constraint protocol.
//!
//! This is the caller side of [`DesignVars`] / [`SparseConstraint`].  It
//! assigns row offsets in registration order, sizes the global buffers, and
//! checks that every object wrote exactly what it declared.  Evaluation takes
//! a [`ConstraintPattern`], so values can only be requested once the pattern
//! phase has run.

use crate::design::{DesignVars, SparseConstraint};
use crate::object::{Ref, TacsObject};
use crate::scalar::{Complex, Scalar, TacsScalar};
use crate::types::{Bounds, TacsError};
use ndarray::Array1;
use sprs::CsMat;
use std::fmt;
use std::ops::Range;
use tracing::{debug, warn};

/// Shared handle to a constraint-capable object.
pub type ConstraintRef<S = TacsScalar> = Ref<dyn SparseConstraint<S>>;

// ─────────────────────────────────────────────────────────────
//  Pattern  (output of the query + pattern phases)
// ─────────────────────────────────────────────────────────────

/// Global CSR structure of the constraint Jacobian.
///
/// Only [`DesignProblem::constraint_pattern`] builds one, so the row
/// pointers, columns and per-object counts always agree with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintPattern {
    num_con: usize,
    num_dvs: usize,
    offsets: Vec<usize>,
    counts: Vec<usize>,
    sizes: Vec<usize>,
    linear: Vec<bool>,
    rowp: Vec<usize>,
    cols: Vec<usize>,
}

impl ConstraintPattern {
    pub fn num_con(&self) -> usize {
        self.num_con
    }

    pub fn num_dvs(&self) -> usize {
        self.num_dvs
    }

    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    /// First global row of each object.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Rows declared by each object.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Nonzeros declared by each object.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn linear(&self) -> &[bool] {
        &self.linear
    }

    /// Row pointers, length `num_con() + 1`.
    pub fn rowp(&self) -> &[usize] {
        &self.rowp
    }

    /// Column indices, length `nnz()`.
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    /// Global rows owned by object `k`.
    pub fn object_rows(&self, k: usize) -> Range<usize> {
        self.offsets[k]..self.offsets[k] + self.counts[k]
    }

    /// True when every contributing object reported linear constraints.
    pub fn all_linear(&self) -> bool {
        self.linear.iter().all(|&l| l)
    }
}

// ─────────────────────────────────────────────────────────────
//  Design problem
// ─────────────────────────────────────────────────────────────

pub struct DesignProblem<S: Scalar = TacsScalar> {
    num_dvs: usize,
    objects: Vec<ConstraintRef<S>>,
}

impl<S: Scalar> fmt::Debug for DesignProblem<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.objects.iter().map(|o| o.object_name()).collect();
        f.debug_struct("DesignProblem")
            .field("num_dvs", &self.num_dvs)
            .field("objects", &names)
            .finish()
    }
}

impl<S: Scalar> DesignProblem<S> {
    pub fn new(num_dvs: usize) -> Self {
        Self {
            num_dvs,
            objects: Vec::new(),
        }
    }

    pub fn num_design_vars(&self) -> usize {
        self.num_dvs
    }

    /// Register an object.  The problem takes its own count on it.
    pub fn add_object(&mut self, object: &ConstraintRef<S>) {
        self.objects.push(object.clone());
    }

    /// Borrowed view of the registered objects.
    pub fn objects(&self) -> &[ConstraintRef<S>] {
        &self.objects
    }

    // ── Design variables ───────────────────────────────────

    /// Gather the global design vector.  Slots no object owns read zero.
    pub fn get_design_vars(&self) -> Array1<S> {
        let mut x = vec![S::zero(); self.num_dvs];
        for obj in &self.objects {
            obj.get_design_vars(&mut x);
        }
        Array1::from_vec(x)
    }

    /// Scatter the global design vector to every object.
    pub fn set_design_vars(&self, x: &[S]) -> Result<(), TacsError> {
        self.check_dv_len(x.len())?;
        for obj in &self.objects {
            obj.set_design_vars(x);
        }
        Ok(())
    }

    /// Gather bounds.  Slots no object owns are unbounded.
    pub fn design_var_range(&self) -> Bounds<S> {
        let mut bounds = Bounds::unbounded(self.num_dvs);
        for obj in &self.objects {
            obj.get_design_var_range(&mut bounds.lower, &mut bounds.upper);
        }
        bounds
    }

    fn check_dv_len(&self, len: usize) -> Result<(), TacsError> {
        if len != self.num_dvs {
            return Err(TacsError::Shape(format!(
                "design vector has {len} entries, problem has {}",
                self.num_dvs
            )));
        }
        Ok(())
    }

    // ── Constraint protocol ────────────────────────────────

    /// Query and pattern phases: size the system, assign offsets, and
    /// collect the CSR structure.
    pub fn constraint_pattern(&self) -> Result<ConstraintPattern, TacsError> {
        let counts: Vec<usize> = self.objects.iter().map(|o| o.num_con()).collect();
        let sizes: Vec<usize> = self.objects.iter().map(|o| o.con_csr_size()).collect();
        let linear: Vec<bool> = self.objects.iter().map(|o| o.is_linear()).collect();
        let num_con: usize = counts.iter().sum();
        let nnz: usize = sizes.iter().sum();

        let mut offsets = Vec::with_capacity(self.objects.len());
        let mut rowp = vec![0usize; num_con + 1];
        let mut cols = vec![0usize; nnz];

        let mut row = 0;
        for (k, obj) in self.objects.iter().enumerate() {
            let (ncon, size) = (counts[k], sizes[k]);
            offsets.push(row);
            let start = rowp[row];

            let written = obj.add_con_csr(row, &mut rowp, &mut cols);
            if written != size {
                return Err(mismatch(k, "add_con_csr", size, written));
            }
            if rowp[row..=row + ncon].windows(2).any(|w| w[1] < w[0]) {
                return Err(TacsError::Shape(format!(
                    "constraint object {k} wrote decreasing row pointers"
                )));
            }
            let end = rowp[row + ncon];
            if end - start != size {
                return Err(mismatch(k, "add_con_csr rows", size, end - start));
            }
            if let Some(&column) = cols[start..end].iter().find(|&&c| c >= self.num_dvs) {
                return Err(TacsError::ColumnOutOfRange {
                    object: k,
                    column,
                    num_dvs: self.num_dvs,
                });
            }
            row += ncon;
        }

        debug!(
            objects = self.objects.len(),
            num_con,
            nnz,
            "assembled constraint pattern"
        );
        Ok(ConstraintPattern {
            num_con,
            num_dvs: self.num_dvs,
            offsets,
            counts,
            sizes,
            linear,
            rowp,
            cols,
        })
    }

    /// A pattern is only reused against the problem that built it, with every
    /// object still declaring the same rows and nonzeros.
    fn check_pattern(&self, pattern: &ConstraintPattern) -> Result<(), TacsError> {
        if pattern.offsets.len() != self.objects.len() || pattern.num_dvs != self.num_dvs {
            return Err(TacsError::Shape(format!(
                "pattern built for {} objects / {} design variables, problem has {} / {}",
                pattern.offsets.len(),
                pattern.num_dvs,
                self.objects.len(),
                self.num_dvs
            )));
        }
        for (k, obj) in self.objects.iter().enumerate() {
            let (ncon, size) = (obj.num_con(), obj.con_csr_size());
            if ncon != pattern.counts[k] || size != pattern.sizes[k] {
                return Err(TacsError::Shape(format!(
                    "constraint object {k} now declares {ncon} rows / {size} nonzeros, \
                     pattern has {} / {}",
                    pattern.counts[k], pattern.sizes[k]
                )));
            }
        }
        Ok(())
    }

    /// Per-row constraint bounds.  Rows of an object that writes no range
    /// stay unbounded.
    pub fn constraint_range(&self, pattern: &ConstraintPattern) -> Result<Bounds<S>, TacsError> {
        self.check_pattern(pattern)?;
        let mut bounds = Bounds::unbounded(pattern.num_con);
        for (k, obj) in self.objects.iter().enumerate() {
            let written = obj.con_range(pattern.offsets[k], &mut bounds.lower, &mut bounds.upper);
            if written != 0 && written != pattern.counts[k] {
                return Err(mismatch(k, "con_range", pattern.counts[k], written));
            }
        }
        Ok(bounds)
    }

    /// Evaluation phase: constraint values.
    pub fn eval_constraints(&self, pattern: &ConstraintPattern) -> Result<Array1<S>, TacsError> {
        self.check_pattern(pattern)?;
        let mut con = vec![S::zero(); pattern.num_con];
        for (k, obj) in self.objects.iter().enumerate() {
            let written = obj.eval_con(pattern.offsets[k], &mut con);
            if written != pattern.counts[k] {
                return Err(mismatch(k, "eval_con", pattern.counts[k], written));
            }
        }
        Ok(Array1::from_vec(con))
    }

    /// Evaluation phase: constraint Jacobian with respect to the design
    /// variables, on the pattern's structure.
    pub fn eval_constraint_sens(&self, pattern: &ConstraintPattern) -> Result<CsMat<S>, TacsError> {
        self.check_pattern(pattern)?;
        let mut a = vec![S::zero(); pattern.nnz()];
        for (k, obj) in self.objects.iter().enumerate() {
            let written =
                obj.eval_con_dv_sens(pattern.offsets[k], &mut a, &pattern.rowp, &pattern.cols);
            if written != pattern.sizes[k] {
                return Err(mismatch(k, "eval_con_dv_sens", pattern.sizes[k], written));
            }
        }
        CsMat::new_from_unsorted(
            (pattern.num_con, pattern.num_dvs),
            pattern.rowp.clone(),
            pattern.cols.clone(),
            a,
        )
        .map_err(|(_, _, _, e)| TacsError::from(e))
    }
}

impl DesignProblem<Complex> {
    /// Gradient of `f` with respect to every design variable, by seeding each
    /// one in turn with imaginary part `h`.  The design vector is restored
    /// before returning.
    pub fn complex_step_gradient<F>(&self, h: f64, mut f: F) -> Result<Vec<f64>, TacsError>
    where
        F: FnMut(&Self) -> Complex,
    {
        let x0 = self.get_design_vars().to_vec();
        let mut x: Vec<Complex> = x0.iter().map(|v| Complex::from(v.re)).collect();
        let mut grad = Vec::with_capacity(self.num_dvs);
        for i in 0..self.num_dvs {
            x[i].im = h;
            self.set_design_vars(&x)?;
            grad.push(f(self).im / h);
            x[i].im = 0.0;
        }
        self.set_design_vars(&x0)?;
        Ok(grad)
    }
}

fn mismatch(object: usize, phase: &'static str, expected: usize, got: usize) -> TacsError {
    warn!(object, phase, expected, got, "constraint object broke its declared size");
    TacsError::PatternMismatch {
        object,
        phase,
        expected,
        got,
    }
}
