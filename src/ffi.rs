//! C-compatible FFI.
//!
//! All functions are `#[no_mangle] extern "C"` so bindings in other languages
//! can drive the process-wide environment, the flop counter, and
//! reference-counted thread-info objects.
//!
//! Memory convention:
//!   - Caller allocates flat buffers and passes pointers + lengths.
//!   - `*_create` returns an **owned** pointer (count = 1); release it with
//!     the matching `*_decref`.  Every other function borrows.
//!   - Fallible calls return 0 on success, non-zero on error; the message is
//!     kept per thread and read back with `tacs_last_error`.

use crate::flops;
use crate::object::{Ref, RefBox};
use crate::runtime;
use crate::threads::ThreadInfo;
use crate::types::TacsError;
use std::cell::RefCell;
use std::os::raw::c_char;
use std::slice;

// ─────────────────────────────────────────────────────────────
//  Error reporting
// ─────────────────────────────────────────────────────────────

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

fn record_error(e: &TacsError) -> i32 {
    let msg = e.to_string();
    tracing::debug!(error = %msg, "ffi call failed");
    LAST_ERROR.with(|s| *s.borrow_mut() = msg);
    1
}

/// Copy the last error message on this thread into `buf` (NUL-terminated,
/// truncated to `len - 1` bytes).  Returns the full message length.
///
/// # Safety
/// `buf` must be valid for `len` bytes, or null with `len == 0`.
#[no_mangle]
pub unsafe extern "C" fn tacs_last_error(buf: *mut c_char, len: usize) -> usize {
    LAST_ERROR.with(|s| {
        let msg = s.borrow();
        if !buf.is_null() && len > 0 {
            let n = msg.len().min(len - 1);
            let out = slice::from_raw_parts_mut(buf as *mut u8, len);
            out[..n].copy_from_slice(&msg.as_bytes()[..n]);
            out[n] = 0;
        }
        msg.len()
    })
}

// ─────────────────────────────────────────────────────────────
//  Process-wide environment
// ─────────────────────────────────────────────────────────────

/// Initialise static state.  Safe to call more than once.
#[no_mangle]
pub extern "C" fn tacs_initialize() -> i32 {
    match runtime::initialize() {
        Ok(()) => 0,
        Err(e) => record_error(&e),
    }
}

/// 1 if `tacs_initialize` has run (and `tacs_finalize` has not), else 0.
#[no_mangle]
pub extern "C" fn tacs_is_initialized() -> i32 {
    i32::from(runtime::is_initialized())
}

#[no_mangle]
pub extern "C" fn tacs_finalize() {
    runtime::finalize();
}

// ─────────────────────────────────────────────────────────────
//  Flop counter
// ─────────────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn tacs_zero_num_flops() {
    flops::zero_num_flops();
}

#[no_mangle]
pub extern "C" fn tacs_get_num_flops() -> f64 {
    flops::get_num_flops()
}

// ─────────────────────────────────────────────────────────────
//  Thread info handles
// ─────────────────────────────────────────────────────────────

/// Create a thread-info object.  The caller owns the returned reference.
#[no_mangle]
pub extern "C" fn tacs_thread_info_create(num_threads: i32) -> *const RefBox<ThreadInfo> {
    let n = usize::try_from(num_threads).unwrap_or(0);
    Ref::into_raw(Ref::new(ThreadInfo::new(n)))
}

/// # Safety
/// `info` must be a live pointer from `tacs_thread_info_create`.
#[no_mangle]
pub unsafe extern "C" fn tacs_thread_info_incref(info: *const RefBox<ThreadInfo>) {
    if !info.is_null() {
        Ref::incref_raw(info);
    }
}

/// Release one reference; the object is destroyed when none remain.
///
/// # Safety
/// `info` must be a live pointer on which the caller holds a reference.
#[no_mangle]
pub unsafe extern "C" fn tacs_thread_info_decref(info: *const RefBox<ThreadInfo>) {
    if !info.is_null() {
        Ref::decref_raw(info);
    }
}

/// # Safety
/// `info` must be a live pointer or null.
#[no_mangle]
pub unsafe extern "C" fn tacs_thread_info_refcount(info: *const RefBox<ThreadInfo>) -> i32 {
    match info.as_ref() {
        Some(b) => i32::try_from(b.refcount()).unwrap_or(i32::MAX),
        None => 0,
    }
}

/// Set the thread count (clamped); returns the applied value, or -1 for a
/// null handle.
///
/// # Safety
/// `info` must be a live pointer or null.
#[no_mangle]
pub unsafe extern "C" fn tacs_thread_info_set_num_threads(
    info: *const RefBox<ThreadInfo>,
    num_threads: i32,
) -> i32 {
    match info.as_ref() {
        Some(b) => {
            let n = usize::try_from(num_threads).unwrap_or(0);
            b.get().set_num_threads(n) as i32
        }
        None => -1,
    }
}

/// # Safety
/// `info` must be a live pointer or null.
#[no_mangle]
pub unsafe extern "C" fn tacs_thread_info_get_num_threads(info: *const RefBox<ThreadInfo>) -> i32 {
    match info.as_ref() {
        Some(b) => b.get().num_threads() as i32,
        None => -1,
    }
}
