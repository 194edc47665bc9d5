//! **tacs-core**: object lifetime and scalar substrate for the TACS
//! finite-element and structural-optimisation framework.
//!
//! 1. **Objects** (`object`): intrusive reference counting with owned `Ref` handles.
//! 2. **Scalars** (`scalar`): one `Scalar` trait over `f64` and complex-step `Complex`.
//! 3. **Threads** (`threads`): volatile, clamped thread-count information.
//! 4. **Design** (`design`): opt-in design-variable and sparse-constraint capabilities.
//! 5. **Assembly** (`assembly`): global design vector and constraint Jacobian via `sprs`.
//! 6. **Runtime** (`runtime`, `flops`): substrate reductions, init/finalize, flop counts.
//! 7. **Config** (`config`): TOML / environment runtime settings.
//! 8. **FFI** (`ffi`): C-compatible API.

pub mod types;
pub mod scalar;
pub mod object;
pub mod threads;
pub mod design;
pub mod assembly;
pub mod flops;
pub mod runtime;
pub mod config;
pub mod ffi;

pub use object::{Ref, RefBox, TacsObject};
pub use scalar::{Complex, Scalar, TacsScalar};
pub use types::TacsError;
