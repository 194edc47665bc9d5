//! Design-variable and sparse-constraint protocol tests.
//!
//! The test model has four design variables:
//!
//!   dv 0..3  three stacked ply thicknesses owned by `PlyStack`
//!   dv 3     a stiffener height owned by `Stiffener`
//!
//! `Stiffener` contributes one linear row on dv 3.  `PlyStack` contributes
//! three rows with five structural nonzeros:
//!
//!   row 0:  x0 − x1        (cols 0, 1)
//!   row 1:  x1 − x2        (cols 1, 2)
//!   row 2:  x2²            (col  2)
//!
//! Registered stiffener-first, the ply stack sits at row offset 1.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tacs_core::assembly::{ConstraintRef, DesignProblem};
use tacs_core::design::{DesignVars, NoDesignVars, SparseConstraint};
use tacs_core::object::{Ref, RefBox, TacsObject};
use tacs_core::scalar::{Complex, Scalar};
use tacs_core::types::TacsError;

// ─────────────────────────────────────────────────────────────
//  Test objects
// ─────────────────────────────────────────────────────────────

struct PlyStack<S> {
    dv_nums: [usize; 3],
    x: RefCell<[S; 3]>,
}

impl<S: Scalar> PlyStack<S> {
    fn new(dv_nums: [usize; 3], x: [f64; 3]) -> Self {
        Self {
            dv_nums,
            x: RefCell::new(x.map(S::from_real)),
        }
    }
}

impl<S> TacsObject for PlyStack<S> {
    fn object_name(&self) -> &str {
        "PlyStack"
    }
}

impl<S: Scalar> DesignVars<S> for PlyStack<S> {
    fn set_design_vars(&self, dvs: &[S]) {
        let mut x = self.x.borrow_mut();
        for (xi, &n) in x.iter_mut().zip(&self.dv_nums) {
            *xi = dvs[n];
        }
    }

    fn get_design_vars(&self, dvs: &mut [S]) {
        let x = self.x.borrow();
        for (&xi, &n) in x.iter().zip(&self.dv_nums) {
            dvs[n] = xi;
        }
    }

    fn get_design_var_range(&self, lower: &mut [S], upper: &mut [S]) {
        for &n in &self.dv_nums {
            lower[n] = S::from_real(0.001);
            upper[n] = S::from_real(0.05);
        }
    }
}

impl<S: Scalar> SparseConstraint<S> for PlyStack<S> {
    fn num_con(&self) -> usize {
        3
    }

    fn con_csr_size(&self) -> usize {
        5
    }

    fn con_range(&self, offset: usize, lb: &mut [S], ub: &mut [S]) -> usize {
        for i in 0..3 {
            lb[offset + i] = S::from_real(-0.01);
            ub[offset + i] = S::from_real(0.01);
        }
        3
    }

    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        let d = self.dv_nums;
        let rows: [&[usize]; 3] = [&[d[0], d[1]], &[d[1], d[2]], &[d[2]]];
        let start = rowp[offset];
        let mut k = start;
        for (i, row) in rows.iter().enumerate() {
            for &c in row.iter() {
                cols[k] = c;
                k += 1;
            }
            rowp[offset + i + 1] = k;
        }
        k - start
    }

    fn eval_con(&self, offset: usize, con: &mut [S]) -> usize {
        let x = self.x.borrow();
        con[offset] = x[0] - x[1];
        con[offset + 1] = x[1] - x[2];
        con[offset + 2] = x[2] * x[2];
        3
    }

    fn eval_con_dv_sens(
        &self,
        offset: usize,
        a_col: &mut [S],
        rowp: &[usize],
        _cols: &[usize],
    ) -> usize {
        let x = self.x.borrow();
        let vals = [S::one(), -S::one(), S::one(), -S::one(), S::from_real(2.0) * x[2]];
        let start = rowp[offset];
        a_col[start..start + vals.len()].copy_from_slice(&vals);
        vals.len()
    }
}

struct Stiffener<S> {
    dv_num: usize,
    height: RefCell<S>,
}

impl<S> TacsObject for Stiffener<S> {}

impl<S: Scalar> DesignVars<S> for Stiffener<S> {
    fn set_design_vars(&self, dvs: &[S]) {
        *self.height.borrow_mut() = dvs[self.dv_num];
    }

    fn get_design_vars(&self, dvs: &mut [S]) {
        dvs[self.dv_num] = *self.height.borrow();
    }

    fn get_design_var_range(&self, lower: &mut [S], upper: &mut [S]) {
        lower[self.dv_num] = S::from_real(0.01);
        upper[self.dv_num] = S::from_real(0.2);
    }
}

impl<S: Scalar> SparseConstraint<S> for Stiffener<S> {
    fn is_linear(&self) -> bool {
        true
    }

    fn num_con(&self) -> usize {
        1
    }

    fn con_csr_size(&self) -> usize {
        1
    }

    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        cols[rowp[offset]] = self.dv_num;
        rowp[offset + 1] = rowp[offset] + 1;
        1
    }

    fn eval_con(&self, offset: usize, con: &mut [S]) -> usize {
        con[offset] = *self.height.borrow();
        1
    }

    fn eval_con_dv_sens(&self, offset: usize, a_col: &mut [S], rowp: &[usize], _: &[usize]) -> usize {
        a_col[rowp[offset]] = S::one();
        1
    }
}

/// Declares two nonzeros but writes one.
struct Undercount;

impl TacsObject for Undercount {}
impl DesignVars<f64> for Undercount {}
impl SparseConstraint<f64> for Undercount {
    fn num_con(&self) -> usize {
        1
    }
    fn con_csr_size(&self) -> usize {
        2
    }
    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        cols[rowp[offset]] = 0;
        rowp[offset + 1] = rowp[offset] + 1;
        1
    }
}

/// Points at a column past the design vector.
struct StrayColumn;

impl TacsObject for StrayColumn {}
impl DesignVars<f64> for StrayColumn {}
impl SparseConstraint<f64> for StrayColumn {
    fn num_con(&self) -> usize {
        1
    }
    fn con_csr_size(&self) -> usize {
        1
    }
    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        cols[rowp[offset]] = 99;
        rowp[offset + 1] = rowp[offset] + 1;
        1
    }
}

/// One row per entry, all on column 0.  Keeps the default `con_range`
/// unless `range_rows` says otherwise.
struct Diagonal {
    rows: Rc<Cell<usize>>,
    range_rows: Option<usize>,
}

impl Diagonal {
    fn new(rows: usize, range_rows: Option<usize>) -> Self {
        Self {
            rows: Rc::new(Cell::new(rows)),
            range_rows,
        }
    }
}

impl TacsObject for Diagonal {}
impl DesignVars<f64> for Diagonal {}
impl SparseConstraint<f64> for Diagonal {
    fn num_con(&self) -> usize {
        self.rows.get()
    }
    fn con_csr_size(&self) -> usize {
        self.rows.get()
    }
    fn con_range(&self, offset: usize, lb: &mut [f64], ub: &mut [f64]) -> usize {
        let Some(n) = self.range_rows else {
            return 0;
        };
        for i in offset..offset + n {
            lb[i] = 0.0;
            ub[i] = 1.0;
        }
        n
    }
    fn add_con_csr(&self, offset: usize, rowp: &mut [usize], cols: &mut [usize]) -> usize {
        let n = self.rows.get();
        for i in 0..n {
            cols[rowp[offset] + i] = 0;
            rowp[offset + i + 1] = rowp[offset] + i + 1;
        }
        n
    }
    fn eval_con(&self, offset: usize, con: &mut [f64]) -> usize {
        let n = self.rows.get();
        con[offset..offset + n].fill(1.0);
        n
    }
}

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

const PLIES: [f64; 3] = [0.012, 0.010, 0.007];
const HEIGHT: f64 = 0.08;

fn ply_stack<S: Scalar>() -> ConstraintRef<S> {
    Ref::from_box(RefBox::new(PlyStack::<S>::new([0, 1, 2], PLIES)))
}

fn stiffener<S: Scalar>() -> ConstraintRef<S> {
    Ref::from_box(RefBox::new(Stiffener {
        dv_num: 3,
        height: RefCell::new(S::from_real(HEIGHT)),
    }))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn make_problem<S: Scalar>() -> DesignProblem<S> {
    init_tracing();
    let mut problem = DesignProblem::new(4);
    problem.add_object(&stiffener::<S>());
    problem.add_object(&ply_stack::<S>());
    let empty: ConstraintRef<S> = Ref::from_box(RefBox::new(NoDesignVars));
    problem.add_object(&empty);
    problem
}

// ─────────────────────────────────────────────────────────────
//  Design variables
// ─────────────────────────────────────────────────────────────

#[test]
fn get_set_get_round_trip_is_identical() {
    let problem = make_problem::<f64>();
    let first = problem.get_design_vars();
    assert_eq!(first.to_vec(), vec![0.012, 0.010, 0.007, 0.08]);

    problem.set_design_vars(first.as_slice().expect("contiguous")).unwrap();
    let second = problem.get_design_vars();
    assert_eq!(first, second);
}

#[test]
fn set_design_vars_reaches_every_owner() {
    let problem = make_problem::<f64>();
    problem.set_design_vars(&[0.02, 0.03, 0.04, 0.15]).unwrap();
    assert_eq!(problem.get_design_vars().to_vec(), vec![0.02, 0.03, 0.04, 0.15]);
}

#[test]
fn set_design_vars_rejects_wrong_length() {
    let problem = make_problem::<f64>();
    let err = problem.set_design_vars(&[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, TacsError::Shape(_)), "{err}");
}

#[test]
fn design_var_range_collects_owned_bounds() {
    let mut problem = make_problem::<f64>();
    let bounds = problem.design_var_range();
    assert_eq!(bounds.lower, vec![0.001, 0.001, 0.001, 0.01]);
    assert_eq!(bounds.upper, vec![0.05, 0.05, 0.05, 0.2]);
    for (i, &x) in problem.get_design_vars().iter().enumerate() {
        assert!(bounds.contains(i, x));
    }

    // A slot nobody owns stays unbounded.
    problem = DesignProblem::new(5);
    problem.add_object(&ply_stack::<f64>());
    let bounds = problem.design_var_range();
    assert_eq!(bounds.lower[4], f64::NEG_INFINITY);
    assert_eq!(bounds.upper[4], f64::INFINITY);
}

#[test]
fn empty_object_contributes_nothing() {
    let mut problem = DesignProblem::<f64>::new(2);
    let empty: ConstraintRef<f64> = Ref::from_box(RefBox::new(NoDesignVars));
    problem.add_object(&empty);

    assert_eq!(problem.get_design_vars().to_vec(), vec![0.0, 0.0]);
    problem.set_design_vars(&[1.0, 2.0]).unwrap();
    let pattern = problem.constraint_pattern().unwrap();
    assert_eq!(pattern.num_con(), 0);
    assert_eq!(pattern.nnz(), 0);
    assert_eq!(pattern.rowp(), &[0]);
    assert!(problem.eval_constraints(&pattern).unwrap().is_empty());
}

#[test]
fn problem_takes_its_own_reference() {
    let stack = ply_stack::<f64>();
    assert_eq!(Ref::refcount(&stack), 1);
    let mut problem = DesignProblem::new(3);
    problem.add_object(&stack);
    assert_eq!(Ref::refcount(&stack), 2);
    assert_eq!(format!("{problem:?}"), r#"DesignProblem { num_dvs: 3, objects: ["PlyStack"] }"#);
    drop(problem);
    assert_eq!(Ref::refcount(&stack), 1);
}

// ─────────────────────────────────────────────────────────────
//  Constraint protocol
// ─────────────────────────────────────────────────────────────

#[test]
fn pattern_assigns_offsets_and_sizes() {
    let problem = make_problem::<f64>();
    let pattern = problem.constraint_pattern().unwrap();

    assert_eq!(pattern.num_con(), 4);
    assert_eq!(pattern.offsets(), &[0, 1, 4]);
    assert_eq!(pattern.counts(), &[1, 3, 0]);
    assert_eq!(pattern.sizes(), &[1, 5, 0]);
    assert_eq!(pattern.linear(), &[true, false, false]);
    assert!(!pattern.all_linear());

    // Ply stack at offset o = 1: four row pointers, five columns.
    let o = pattern.offsets()[1];
    let rows = pattern.object_rows(1);
    assert_eq!(rows, 1..4);
    let rowp = &pattern.rowp()[o..=o + 3];
    assert_eq!(rowp.len(), 4);
    assert_eq!(rowp, &[1, 3, 5, 6]);
    assert_eq!(&pattern.cols()[rowp[0]..rowp[3]], &[0, 1, 1, 2, 2]);
    assert_eq!(pattern.rowp(), &[0, 1, 3, 5, 6]);
}

#[test]
fn object_writes_only_its_own_rows() {
    let stack = PlyStack::<f64>::new([0, 1, 2], PLIES);
    let o = 2;
    let mut rowp = vec![usize::MAX; 7];
    rowp[o] = 4;
    let mut cols = vec![usize::MAX; 12];
    let written = SparseConstraint::add_con_csr(&stack, o, &mut rowp, &mut cols);
    assert_eq!(written, 5);
    assert_eq!(&rowp[o..=o + 3], &[4, 6, 8, 9]);
    assert_eq!(rowp[..o], [usize::MAX; 2]);
    assert_eq!(rowp[o + 4..], [usize::MAX; 1]);
    assert!(cols[..4].iter().chain(&cols[9..]).all(|&c| c == usize::MAX));

    let mut con = vec![f64::NAN; 6];
    assert_eq!(SparseConstraint::eval_con(&stack, o, &mut con), 3);
    assert!(con[..o].iter().chain(&con[o + 3..]).all(|c| c.is_nan()));
    assert_eq!(&con[o..o + 3], &[0.012 - 0.010, 0.010 - 0.007, 0.007 * 0.007]);
}

#[test]
fn constraint_values_and_ranges() {
    let problem = make_problem::<f64>();
    let pattern = problem.constraint_pattern().unwrap();

    let con = problem.eval_constraints(&pattern).unwrap();
    assert_eq!(con.to_vec(), vec![HEIGHT, 0.012 - 0.010, 0.010 - 0.007, 0.007 * 0.007]);

    let range = problem.constraint_range(&pattern).unwrap();
    // The stiffener leaves its row unbounded.
    assert_eq!(range.lower[0], f64::NEG_INFINITY);
    assert_eq!(&range.lower[1..], &[-0.01; 3]);
    assert_eq!(&range.upper[1..], &[0.01; 3]);
}

#[test]
fn jacobian_follows_the_pattern() {
    let problem = make_problem::<f64>();
    let pattern = problem.constraint_pattern().unwrap();
    let jac = problem.eval_constraint_sens(&pattern).unwrap();

    assert_eq!(jac.shape(), (4, 4));
    assert_eq!(jac.nnz(), 6);
    assert_eq!(jac.get(0, 3), Some(&1.0));
    assert_eq!(jac.get(1, 0), Some(&1.0));
    assert_eq!(jac.get(1, 1), Some(&-1.0));
    assert_eq!(jac.get(3, 2), Some(&(2.0 * 0.007)));
    assert_eq!(jac.get(3, 0), None);
}

#[test]
fn jacobian_matches_complex_step() {
    let problem = make_problem::<Complex>();
    let pattern = problem.constraint_pattern().unwrap();
    let jac = problem.eval_constraint_sens(&pattern).unwrap();

    for &h in &[1e-10, 1e-20, 1e-30] {
        for row in 0..pattern.num_con() {
            let grad = problem
                .complex_step_gradient(h, |p| p.eval_constraints(&pattern).unwrap()[row])
                .unwrap();
            for (col, &g) in grad.iter().enumerate() {
                let analytic = jac.get(row, col).map_or(0.0, |v| v.re);
                assert!(
                    (g - analytic).abs() < 1e-12,
                    "row {row} col {col}: complex step {g:.6e} vs analytic {analytic:.6e}"
                );
            }
        }
    }

    // Seeding is undone afterwards.
    let x = problem.get_design_vars();
    assert!(x.iter().all(|z| z.im == 0.0));
}

#[test]
fn undercounting_object_is_reported() {
    let mut problem = DesignProblem::<f64>::new(1);
    let bad: ConstraintRef<f64> = Ref::from_box(RefBox::new(Undercount));
    problem.add_object(&bad);
    match problem.constraint_pattern() {
        Err(TacsError::PatternMismatch { object, expected, got, .. }) => {
            assert_eq!((object, expected, got), (0, 2, 1));
        }
        other => panic!("expected PatternMismatch, got {other:?}"),
    }
}

#[test]
fn stray_column_is_reported() {
    let mut problem = DesignProblem::<f64>::new(4);
    let bad: ConstraintRef<f64> = Ref::from_box(RefBox::new(StrayColumn));
    problem.add_object(&bad);
    let err = problem.constraint_pattern().unwrap_err();
    assert!(
        matches!(err, TacsError::ColumnOutOfRange { object: 0, column: 99, num_dvs: 4 }),
        "{err}"
    );
}

#[test]
fn pattern_from_another_problem_is_rejected() {
    let small = DesignProblem::<f64>::new(1);
    let pattern = small.constraint_pattern().unwrap();
    let problem = make_problem::<f64>();
    assert!(matches!(
        problem.eval_constraints(&pattern),
        Err(TacsError::Shape(_))
    ));
}

#[test]
fn default_con_range_leaves_rows_unbounded() {
    let mut problem = DesignProblem::<f64>::new(1);
    let bare: ConstraintRef<f64> = Ref::from_box(RefBox::new(Diagonal::new(2, None)));
    let bounded: ConstraintRef<f64> = Ref::from_box(RefBox::new(Diagonal::new(1, Some(1))));
    problem.add_object(&bare);
    problem.add_object(&bounded);

    let pattern = problem.constraint_pattern().unwrap();
    let range = problem.constraint_range(&pattern).unwrap();
    assert_eq!(range.lower, vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0]);
    assert_eq!(range.upper, vec![f64::INFINITY, f64::INFINITY, 1.0]);
}

#[test]
fn partial_con_range_is_reported() {
    let mut problem = DesignProblem::<f64>::new(1);
    let partial: ConstraintRef<f64> = Ref::from_box(RefBox::new(Diagonal::new(3, Some(2))));
    problem.add_object(&partial);
    let pattern = problem.constraint_pattern().unwrap();
    match problem.constraint_range(&pattern) {
        Err(TacsError::PatternMismatch { object, phase, expected, got }) => {
            assert_eq!((object, phase, expected, got), (0, "con_range", 3, 2));
        }
        other => panic!("expected PatternMismatch, got {other:?}"),
    }
}

#[test]
fn stale_pattern_is_rejected_after_resize() {
    let diagonal = Diagonal::new(1, None);
    let rows = diagonal.rows.clone();
    let mut problem = DesignProblem::<f64>::new(1);
    let object: ConstraintRef<f64> = Ref::from_box(RefBox::new(diagonal));
    problem.add_object(&object);

    let pattern = problem.constraint_pattern().unwrap();
    assert_eq!(problem.eval_constraints(&pattern).unwrap().to_vec(), vec![1.0]);

    rows.set(3);
    for err in [
        problem.eval_constraints(&pattern).map(|_| ()).unwrap_err(),
        problem.constraint_range(&pattern).map(|_| ()).unwrap_err(),
        problem.eval_constraint_sens(&pattern).map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err, TacsError::Shape(_)), "{err}");
    }

    // A fresh pattern picks up the new size.
    let pattern = problem.constraint_pattern().unwrap();
    assert_eq!(pattern.rowp(), &[0, 1, 2, 3]);
    assert_eq!(problem.eval_constraints(&pattern).unwrap().len(), 3);
}
