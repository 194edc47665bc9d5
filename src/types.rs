use crate::scalar::Scalar;
use std::fmt;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for the fallible layers of the crate.
///
/// The substrate itself (reference counts, scalars, capability traits)
/// never fails.  Errors come from the layers that *drive* it: global
/// constraint assembly, substrate registration and configuration.  The FFI
/// layer translates these into integer return codes + a thread-local error
/// message.
#[derive(Debug)]
pub enum TacsError {
    /// A constraint object wrote a different number of entries than it
    /// declared during the query phase.
    PatternMismatch {
        object: usize,
        phase: &'static str,
        expected: usize,
        got: usize,
    },
    /// A constraint object emitted a column outside the design vector.
    ColumnOutOfRange { object: usize, column: usize, num_dvs: usize },
    /// The assembled CSR structure was rejected by `sprs`.
    Structure(sprs::errors::StructureError),
    /// Buffer length mismatch in input data.
    Shape(String),
    /// The messaging substrate refused a registration or reduction.
    Substrate(String),
    /// Configuration could not be parsed or holds an invalid value.
    Config(String),
}

impl fmt::Display for TacsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatternMismatch { object, phase, expected, got } => write!(
                f,
                "constraint object {object} wrote {got} entries in {phase}, declared {expected}"
            ),
            Self::ColumnOutOfRange { object, column, num_dvs } => write!(
                f,
                "constraint object {object} references column {column} (design vector has {num_dvs})"
            ),
            Self::Structure(e) => write!(f, "invalid sparse structure: {e}"),
            Self::Shape(msg) => write!(f, "shape error: {msg}"),
            Self::Substrate(msg) => write!(f, "messaging substrate error: {msg}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for TacsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Structure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sprs::errors::StructureError> for TacsError {
    fn from(e: sprs::errors::StructureError) -> Self {
        Self::Structure(e)
    }
}

impl From<toml::de::Error> for TacsError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────

/// Diagnostic name reported by objects that do not override
/// [`TacsObject::object_name`](crate::object::TacsObject::object_name).
pub const DEFAULT_OBJECT_NAME: &str = "TACSObject";

/// Upper bound on [`ThreadInfo`](crate::threads::ThreadInfo) thread counts.
pub const MAX_NUM_THREADS: usize = 16;

/// Default imaginary seed magnitude for complex-step differentiation.
pub const DEFAULT_COMPLEX_STEP: f64 = 1e-30;

// ─────────────────────────────────────────────────────────────
//  Bounds
// ─────────────────────────────────────────────────────────────

/// Paired lower / upper arrays, used both for design-variable ranges and
/// for constraint-row ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<S> {
    pub lower: Vec<S>,
    pub upper: Vec<S>,
}

impl<S: Scalar> Bounds<S> {
    /// Unbounded in both directions.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![S::from_real(f64::NEG_INFINITY); n],
            upper: vec![S::from_real(f64::INFINITY); n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// True when `value` lies inside `[lower[i], upper[i]]` (real parts).
    pub fn contains(&self, i: usize, value: S) -> bool {
        let v = value.real_part();
        self.lower[i].real_part() <= v && v <= self.upper[i].real_part()
    }
}
