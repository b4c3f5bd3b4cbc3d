use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

/// Releases a resource owned by a smart pointer.
///
/// A deletion policy is stored inside the pointer that owns a resource (or inside the
/// [`ControlBlock`][crate::ControlBlock] of a shared resource) and is invoked exactly once per
/// resource, at the moment the last owner gives the resource up.
///
/// The policy is selected statically through the `D` type parameter of [`Exclusive`],
/// [`Shared`] and [`Weak`], so the default path ([`DefaultDelete`]) costs nothing beyond
/// the release itself.
///
/// [`Exclusive`]: crate::Exclusive
/// [`Shared`]: crate::Shared
/// [`Weak`]: crate::Weak
pub trait DeletionPolicy<T: ?Sized> {
    /// Releases the resource at `resource`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that:
    ///
    /// 1. `resource` is owned by the caller and was allocated in a way compatible with this
    ///    policy (for [`DefaultDelete`], by `Box::<T>::into_raw`).
    /// 2. The resource is not accessed again after this call returns.
    /// 3. This is the only release of `resource`.
    unsafe fn release(&self, resource: NonNull<T>);
}

/// The default deletion policy: reclaims a boxed allocation.
///
/// For a scalar pointee `T` this is the scalar release (the `Box<T>` is reconstructed and
/// dropped). For a sequence pointee `[T]` this is the sequence release: the whole
/// `Box<[T]>` is reconstructed and dropped, which drops every element and frees the single
/// allocation once.
///
/// # Example
///
/// ```rust
/// use owning_ptr::{Exclusive, make_exclusive_slice};
///
/// // The sequence release covers all elements at once.
/// let numbers: Exclusive<[u32]> = make_exclusive_slice(4);
/// assert_eq!(numbers.len(), 4);
/// drop(numbers);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DefaultDelete;

impl<T> DeletionPolicy<T> for DefaultDelete {
    #[inline]
    unsafe fn release(&self, resource: NonNull<T>) {
        // SAFETY: Forwarding guarantees from the caller - the resource came from a `Box<T>`.
        drop(unsafe { Box::from_raw(resource.as_ptr()) });
    }
}

impl<T> DeletionPolicy<[T]> for DefaultDelete {
    #[inline]
    unsafe fn release(&self, resource: NonNull<[T]>) {
        // SAFETY: Forwarding guarantees from the caller - the resource came from a `Box<[T]>`.
        drop(unsafe { Box::from_raw(resource.as_ptr()) });
    }
}

/// A caller-supplied deletion policy.
///
/// Wraps a closure (`Fn(NonNull<T>)`) that receives the raw reference of the resource being
/// released. The closure is responsible for whatever "release" means for that resource, be it
/// returning it to a pool or reclaiming a box.
///
/// The closure is dropped together with the owner of the policy (the exclusive pointer or
/// the control block), which makes anything captured by it live exactly as long as that
/// bookkeeping.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::ptr::NonNull;
/// use std::rc::Rc;
///
/// use owning_ptr::{CustomDelete, Exclusive};
///
/// let released = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&released);
///
/// let policy = CustomDelete::new(move |resource: NonNull<String>| {
///     counter.set(counter.get() + 1);
///     // SAFETY: The resource was created by `Box::into_raw` below.
///     drop(unsafe { Box::from_raw(resource.as_ptr()) });
/// });
///
/// let raw = NonNull::from(Box::leak(Box::new("hello".to_string())));
///
/// // SAFETY: The resource is a leaked box, matching what the policy releases.
/// let text = unsafe { Exclusive::from_raw_with_policy(raw, policy) };
/// drop(text);
///
/// assert_eq!(released.get(), 1);
/// ```
pub struct CustomDelete<F> {
    release_fn: F,
}

impl<F> CustomDelete<F> {
    /// Wraps `release_fn` as a deletion policy.
    #[must_use]
    pub const fn new(release_fn: F) -> Self {
        Self { release_fn }
    }

    /// Unwraps the policy, returning the closure.
    #[must_use]
    pub fn into_inner(self) -> F {
        self.release_fn
    }
}

impl<T: ?Sized, F> DeletionPolicy<T> for CustomDelete<F>
where
    F: Fn(NonNull<T>),
{
    #[inline]
    unsafe fn release(&self, resource: NonNull<T>) {
        (self.release_fn)(resource);
    }
}

impl<F> fmt::Debug for CustomDelete<F> {
    #[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish_non_exhaustive()
    }
}
