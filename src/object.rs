//! Intrusive reference counting for long-lived framework objects.
//!
//! The count lives in the same allocation as the value ([`RefBox`]).  The
//! ownership rules are carried by the types:
//!
//! - constructors ([`Ref::new`], [`Ref::from_box`]) return an **owned**
//!   [`Ref`], with the count already at one;
//! - everything else hands out **borrowed** access (`&Ref<T>` / `&T`);
//!   clone the `Ref` to keep it past the current scope.
//!
//! Passing a `&Ref<T>` never changes the count.  The value is dropped exactly
//! once, on the decrement that takes the count from one to zero.

use crate::types::DEFAULT_OBJECT_NAME;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicUsize, Ordering};

// ─────────────────────────────────────────────────────────────
//  Object trait
// ─────────────────────────────────────────────────────────────

/// Base capability of every framework object.
pub trait TacsObject {
    /// Human-readable type tag for diagnostics.
    fn object_name(&self) -> &str {
        DEFAULT_OBJECT_NAME
    }
}

// ─────────────────────────────────────────────────────────────
//  Counted allocation
// ─────────────────────────────────────────────────────────────

/// A value together with its reference count.
///
/// A freshly built `RefBox` has count zero ("not yet owned").  It only
/// becomes shared once it is handed to [`Ref::from_box`].
pub struct RefBox<T: ?Sized> {
    count: AtomicUsize,
    value: T,
}

impl<T> RefBox<T> {
    pub fn new(value: T) -> Box<Self> {
        Box::new(Self {
            count: AtomicUsize::new(0),
            value,
        })
    }
}

impl<T: ?Sized> RefBox<T> {
    /// Add one owner.
    #[inline]
    pub fn incref(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one owner.  Returns `true` when this call took the count to
    /// zero; the caller is then responsible for destroying the box.
    ///
    /// Decrementing a zero count is a contract violation (checked in debug
    /// builds only).
    #[inline]
    #[must_use]
    pub fn decref(&self) -> bool {
        let prev = self.count.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "decref on an object with no owners");
        if prev == 1 {
            atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn refcount(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RefBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefBox")
            .field("count", &self.refcount())
            .field("value", &&self.value)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────
//  Owned handle
// ─────────────────────────────────────────────────────────────

/// Owned handle to a reference-counted object.
///
/// `Clone` increments, `Drop` decrements.  Trait objects are built through
/// [`Ref::from_box`], which accepts an unsized `Box<RefBox<dyn Trait>>`:
///
/// ```
/// use tacs_core::object::{Ref, RefBox, TacsObject};
///
/// struct Plate;
/// impl TacsObject for Plate {}
///
/// let obj: Ref<dyn TacsObject> = Ref::from_box(RefBox::new(Plate));
/// assert_eq!(Ref::refcount(&obj), 1);
/// assert_eq!(obj.object_name(), "TACSObject");
/// ```
pub struct Ref<T: ?Sized> {
    ptr: NonNull<RefBox<T>>,
    _owns: PhantomData<RefBox<T>>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Ref<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Ref<T> {}

impl<T> Ref<T> {
    pub fn new(value: T) -> Self {
        Self::from_box(RefBox::new(value))
    }
}

impl<T: ?Sized> Ref<T> {
    /// Take ownership of an unowned box.  The count goes 0 → 1.
    pub fn from_box(boxed: Box<RefBox<T>>) -> Self {
        boxed.incref();
        Self {
            ptr: NonNull::from(Box::leak(boxed)),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn inner(&self) -> &RefBox<T> {
        // SAFETY: the box stays alive while this handle holds a count.
        unsafe { self.ptr.as_ref() }
    }

    #[inline]
    pub fn refcount(this: &Self) -> usize {
        this.inner().refcount()
    }

    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        std::ptr::addr_eq(a.ptr.as_ptr(), b.ptr.as_ptr())
    }

    /// Mutable access when this handle is the only owner.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.inner().refcount() == 1 {
            // SAFETY: unique owner, and `&mut self` excludes other borrows.
            Some(unsafe { &mut this.ptr.as_mut().value })
        } else {
            None
        }
    }

    /// Release the handle without decrementing.  The returned pointer carries
    /// the ownership this handle held.
    pub fn into_raw(this: Self) -> *const RefBox<T> {
        let this = ManuallyDrop::new(this);
        this.ptr.as_ptr()
    }

    /// Re-adopt a pointer produced by [`Ref::into_raw`] (one owned count).
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and its count must not have been
    /// released since.
    pub unsafe fn from_raw(ptr: *const RefBox<T>) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr as *mut RefBox<T>),
            _owns: PhantomData,
        }
    }

    /// Explicit increment on a raw pointer.
    ///
    /// # Safety
    /// `ptr` must point to a live box obtained from [`Ref::into_raw`].
    pub unsafe fn incref_raw(ptr: *const RefBox<T>) {
        (*ptr).incref();
    }

    /// Explicit decrement on a raw pointer; destroys the object when the
    /// count reaches zero.
    ///
    /// # Safety
    /// `ptr` must point to a live box and the caller must own one count.
    pub unsafe fn decref_raw(ptr: *const RefBox<T>) {
        drop(Self::from_raw(ptr));
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    #[inline]
    fn clone(&self) -> Self {
        self.inner().incref();
        Self {
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Ref<T> {
    fn drop(&mut self) {
        if self.inner().decref() {
            // SAFETY: the last owner is gone; the box came from `Box::leak`.
            unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        }
    }
}

impl<T: ?Sized> Deref for Ref<T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        &self.inner().value
    }
}

impl<T: ?Sized> AsRef<T> for Ref<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner(), f)
    }
}
