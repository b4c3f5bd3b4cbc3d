use std::any::type_name;
use std::borrow::{Borrow, BorrowMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use tracing::trace;

use crate::{DefaultDelete, DeletionPolicy};

pub(crate) const ERR_EMPTY_DEREF: &str = "dereferenced a pointer that holds no resource";

/// Sole owner of one resource.
///
/// An `Exclusive<T>` holds zero or one owning raw reference to a `T` and releases it through
/// its deletion policy `D` when dropped. The pointee may be a scalar `T` or a sequence `[T]`
/// allocated as one contiguous block; the [`DefaultDelete`] policy picks the matching release.
///
/// At most one exclusive owner exists per resource. The type is not [`Clone`], so an attempt to
/// copy it is rejected at compile time:
///
/// ```compile_fail
/// use owning_ptr::{Exclusive, make_exclusive};
///
/// let first = make_exclusive(42);
/// let second: Exclusive<i32> = Clone::clone(&first);
/// ```
///
/// Ownership moves with the value, after which the source can no longer be used:
///
/// ```compile_fail
/// use owning_ptr::make_exclusive;
///
/// let first = make_exclusive(42);
/// let second = first;
/// assert_eq!(*first, 42);
/// ```
///
/// Use [`take()`](Self::take) to move the resource out while keeping an (empty) source around.
///
/// # Raw references
///
/// [`get()`](Self::get) exposes the owned raw reference. It is a borrow: the caller must not
/// release it while the `Exclusive` still owns it, or the resource is released twice.
/// [`release()`](Self::release) is the way to take ownership of the raw reference.
///
/// # Example
///
/// ```rust
/// use owning_ptr::make_exclusive;
///
/// let mut answer = make_exclusive(42);
/// assert_eq!(*answer, 42);
///
/// answer.reset();
/// assert!(!answer.has_resource());
/// ```
pub struct Exclusive<T: ?Sized, D: DeletionPolicy<T> = DefaultDelete> {
    resource: Option<NonNull<T>>,
    policy: D,

    // We own a `T`, for the purposes of drop checking.
    _owns: PhantomData<T>,
}

impl<T: ?Sized> Exclusive<T, DefaultDelete>
where
    DefaultDelete: DeletionPolicy<T>,
{
    /// Takes ownership of a boxed resource.
    #[must_use]
    pub fn from_box(resource: Box<T>) -> Self {
        // SAFETY: A leaked box is exactly what `DefaultDelete` releases.
        unsafe { Self::from_raw_with_policy(NonNull::from(Box::leak(resource)), DefaultDelete) }
    }

    /// Gives up ownership of the resource as a [`Box`], without releasing it.
    ///
    /// Returns `None` if the pointer holds no resource.
    #[must_use]
    pub fn into_box(mut self) -> Option<Box<T>> {
        self.release().map(|resource| {
            // SAFETY: Resources owned under `DefaultDelete` are leaked boxes and we have just
            // taken ownership of this one.
            unsafe { Box::from_raw(resource.as_ptr()) }
        })
    }
}

impl<T> Exclusive<T, DefaultDelete> {
    /// Allocates `value` on the heap and takes ownership of it.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Exclusive<T, D> {
    /// Creates a pointer that holds no resource.
    #[must_use]
    pub fn empty() -> Self
    where
        D: Default,
    {
        Self::empty_with_policy(D::default())
    }

    /// Creates a pointer that holds no resource but will use `policy` for resources it adopts
    /// later via [`reset_to()`](Self::reset_to).
    #[must_use]
    pub fn empty_with_policy(policy: D) -> Self {
        Self {
            resource: None,
            policy,
            _owns: PhantomData,
        }
    }

    /// Takes ownership of a raw resource, to be released with a default-constructed policy.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `resource` is valid for reads and writes, is owned by the
    /// caller (who hands that ownership over), and can be released by `D`.
    #[must_use]
    pub unsafe fn from_raw(resource: NonNull<T>) -> Self
    where
        D: Default,
    {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { Self::from_raw_with_policy(resource, D::default()) }
    }

    /// Takes ownership of a raw resource, to be released with `policy`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `resource` is valid for reads and writes, is owned by the
    /// caller (who hands that ownership over), and can be released by `policy`.
    #[must_use]
    pub unsafe fn from_raw_with_policy(resource: NonNull<T>, policy: D) -> Self {
        Self {
            resource: Some(resource),
            policy,
            _owns: PhantomData,
        }
    }

    /// Whether the pointer currently owns a resource.
    #[must_use]
    #[inline]
    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    /// Returns the owned raw reference without giving up ownership.
    ///
    /// The returned pointer is a borrow: it must not be released by the caller and must not
    /// be used after the resource is released through this `Exclusive`.
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.resource
    }

    /// Returns a shared reference to the resource, if there is one.
    #[must_use]
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: We exclusively own the resource, so handing out a reference tied to a shared
        // borrow of `self` cannot alias with any mutable access.
        self.resource.map(|resource| unsafe { resource.as_ref() })
    }

    /// Returns an exclusive reference to the resource, if there is one.
    #[must_use]
    #[inline]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        // SAFETY: We exclusively own the resource and hold an exclusive borrow of `self`.
        self.resource.map(|mut resource| unsafe { resource.as_mut() })
    }

    /// The policy used to release the resource.
    #[must_use]
    #[inline]
    pub fn deletion_policy(&self) -> &D {
        &self.policy
    }

    /// The policy used to release the resource.
    #[must_use]
    #[inline]
    pub fn deletion_policy_mut(&mut self) -> &mut D {
        &mut self.policy
    }

    /// Gives up ownership of the resource without releasing it.
    ///
    /// The caller becomes responsible for releasing the returned raw reference. The pointer is
    /// left empty, so the policy will never be invoked for this resource.
    #[must_use = "the released resource is leaked unless the caller releases it"]
    #[inline]
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.resource.take()
    }

    /// Releases the owned resource (if any) and leaves the pointer empty.
    pub fn reset(&mut self) {
        // SAFETY: Adopting "no resource" has no requirements.
        unsafe {
            self.reset_to(None);
        }
    }

    /// Replaces the owned resource with `resource`.
    ///
    /// If `resource` is the resource already owned (same address), nothing happens. Otherwise
    /// the current resource (if any) is released through the policy and `resource` is adopted.
    ///
    /// Zero-sized resources all share one dangling address, so they are never considered the
    /// same resource: the current one is always released.
    ///
    /// # Safety
    ///
    /// If `resource` is `Some` and differs from the owned resource, the caller must guarantee
    /// what [`from_raw_with_policy()`](Self::from_raw_with_policy) requires of it, with the
    /// policy already stored in this pointer.
    pub unsafe fn reset_to(&mut self, resource: Option<NonNull<T>>) {
        let unchanged = match (self.resource, resource) {
            (Some(current), Some(new)) => {
                // SAFETY: We own `current`, so it is alive.
                let current_size = mem::size_of_val(unsafe { current.as_ref() });

                current_size != 0 && ptr::addr_eq(current.as_ptr(), new.as_ptr())
            }
            (None, None) => true,
            _ => false,
        };

        if unchanged {
            return;
        }

        if let Some(previous) = mem::replace(&mut self.resource, resource) {
            // SAFETY: We owned `previous` and have just stopped referencing it.
            unsafe {
                self.release_owned(previous);
            }
        }
    }

    /// Exchanges the resources (and policies) of two pointers.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Moves the resource and policy out, leaving this pointer empty with a default policy.
    ///
    /// Nothing is released: ownership transfers to the returned pointer.
    #[must_use]
    #[inline]
    pub fn take(&mut self) -> Self
    where
        D: Default,
    {
        mem::take(self)
    }

    /// Splits the pointer into its resource and policy without releasing anything.
    ///
    /// The caller takes over ownership of the resource.
    #[must_use]
    pub(crate) fn into_parts(self) -> (Option<NonNull<T>>, D) {
        let this = ManuallyDrop::new(self);

        // SAFETY: `this` is never dropped, so the policy is moved out exactly once and
        // the destructor that would release the resource never runs.
        let policy = unsafe { ptr::read(&this.policy) };

        (this.resource, policy)
    }

    /// # Safety
    ///
    /// `resource` must be owned by `self` (and no longer referenced by it).
    unsafe fn release_owned(&self, resource: NonNull<T>) {
        trace!(
            resource = type_name::<T>(),
            "exclusive owner releasing resource"
        );

        // SAFETY: Forwarding guarantees from the caller; the resource was adopted under the
        // safety contract of the constructor or `reset_to()`.
        unsafe {
            self.policy.release(resource);
        }
    }
}

impl<E, D: DeletionPolicy<[E]>> Exclusive<[E], D> {
    /// Number of elements in the owned sequence, or 0 if there is no resource.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.resource.map_or(0, NonNull::len)
    }

    /// Whether the pointer owns no elements (no resource, or an empty sequence).
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the element at `index` without any checks.
    ///
    /// Safe indexing is available through [`Deref`] to `[E]`, which is bounds-checked.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the pointer owns a resource and that `index` is less
    /// than its length. Anything else is undefined behavior.
    #[must_use]
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &E {
        // SAFETY: The caller guarantees there is a resource.
        let resource = unsafe { self.resource.unwrap_unchecked() };

        // SAFETY: The caller guarantees `index` is in bounds of the allocation.
        let element = unsafe { resource.cast::<E>().add(index) };

        // SAFETY: The element is in bounds and initialized; we own it exclusively.
        unsafe { element.as_ref() }
    }

    /// Returns an exclusive reference to the element at `index` without any checks.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the pointer owns a resource and that `index` is less
    /// than its length. Anything else is undefined behavior.
    #[must_use]
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut E {
        // SAFETY: The caller guarantees there is a resource.
        let resource = unsafe { self.resource.unwrap_unchecked() };

        // SAFETY: The caller guarantees `index` is in bounds of the allocation.
        let mut element = unsafe { resource.cast::<E>().add(index) };

        // SAFETY: The element is in bounds and initialized; we own it and hold `&mut self`.
        unsafe { element.as_mut() }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Drop for Exclusive<T, D> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            // SAFETY: We owned the resource and no longer reference it.
            unsafe {
                self.release_owned(resource);
            }
        }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T> + Default> Default for Exclusive<T, D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Deref for Exclusive<T, D> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the pointer holds no resource.
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.as_ref().expect(ERR_EMPTY_DEREF)
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> DerefMut for Exclusive<T, D> {
    /// # Panics
    ///
    /// Panics if the pointer holds no resource.
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut().expect(ERR_EMPTY_DEREF)
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Borrow<T> for Exclusive<T, D> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn borrow(&self) -> &T {
        self
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> BorrowMut<T> for Exclusive<T, D> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn borrow_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: ?Sized> From<Box<T>> for Exclusive<T, DefaultDelete>
where
    DefaultDelete: DeletionPolicy<T>,
{
    #[inline]
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

// SAFETY: We own the resource like a `Box<T>` does, so we can move between threads under the
// same conditions, provided the policy can come along.
unsafe impl<T: ?Sized + Send, D: DeletionPolicy<T> + Send> Send for Exclusive<T, D> {}

// SAFETY: Shared access to us only gives shared access to the resource and the policy.
unsafe impl<T: ?Sized + Sync, D: DeletionPolicy<T> + Sync> Sync for Exclusive<T, D> {}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl<T: ?Sized, D: DeletionPolicy<T> + fmt::Debug> fmt::Debug for Exclusive<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("resource", &self.resource)
            .field("policy", &self.policy)
            .finish()
    }
}
