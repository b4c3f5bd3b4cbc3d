use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;

use negative_impl::negative_impl;

use crate::exclusive::ERR_EMPTY_DEREF;
use crate::{ControlBlock, DefaultDelete, DeletionPolicy, Exclusive, OwnerIdentity, Weak};

/// The resource and control block a non-empty [`Shared`] or [`Weak`] refers to.
pub(crate) struct Link<T: ?Sized, D> {
    pub(crate) resource: NonNull<T>,
    pub(crate) block: NonNull<ControlBlock<T, D>>,
}

impl<T: ?Sized, D> Clone for Link<T, D> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized, D> Copy for Link<T, D> {}

impl<T: ?Sized, D: DeletionPolicy<T>> Link<T, D> {
    /// The control block of the link.
    ///
    /// # Safety
    ///
    /// The caller must hold a strong or weak registration on the control block for the
    /// lifetime of the returned reference.
    #[inline]
    pub(crate) unsafe fn block<'a>(self) -> &'a ControlBlock<T, D> {
        // SAFETY: The caller guarantees the block is kept alive by a registration.
        unsafe { self.block.as_ref() }
    }

    #[inline]
    pub(crate) fn owner_address(self) -> usize {
        self.block.as_ptr().addr()
    }
}

/// One of possibly many owners of a reference-counted resource.
///
/// Every non-empty `Shared` holds a strong registration on the [`ControlBlock`] of its resource.
/// Cloning registers another owner; dropping (or [`reset()`](Self::reset)) unregisters one. The
/// resource is released through the deletion policy exactly once, when the last owner lets go,
/// no matter how many owners existed. The control block itself stays around for as long as any
/// [`Weak`] observer still refers to it.
///
/// # Thread safety
///
/// This type is single-threaded. Reference counts are not atomic, so a `Shared` cannot be sent
/// to or shared with another thread:
///
/// ```compile_fail
/// use owning_ptr::Shared;
///
/// let value = Shared::new(42);
/// std::thread::spawn(move || drop(value));
/// ```
///
/// # Example
///
/// ```rust
/// use owning_ptr::Shared;
///
/// let mut a = Shared::new(String::from("shared"));
/// let mut b = a.clone();
/// assert_eq!(a.use_count(), 2);
///
/// a.reset();
/// assert_eq!(b.use_count(), 1);
/// assert_eq!(*b, "shared");
///
/// b.reset();
/// assert_eq!(b.use_count(), 0);
/// ```
pub struct Shared<T: ?Sized, D: DeletionPolicy<T> = DefaultDelete> {
    link: Option<Link<T, D>>,

    // We (partially) own a `T`, for the purposes of drop checking.
    _owns: PhantomData<T>,
}

impl<T> Shared<T, DefaultDelete> {
    /// Allocates `value` on the heap as a new shared resource with a single owner.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized> Shared<T, DefaultDelete>
where
    DefaultDelete: DeletionPolicy<T>,
{
    /// Takes ownership of a boxed resource, making it shared with a single owner.
    #[must_use]
    pub fn from_box(resource: Box<T>) -> Self {
        // SAFETY: A leaked box is exactly what `DefaultDelete` releases.
        unsafe { Self::from_raw_with_policy(NonNull::from(Box::leak(resource)), DefaultDelete) }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Shared<T, D> {
    /// Creates a pointer that owns nothing and has no control block.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            link: None,
            _owns: PhantomData,
        }
    }

    /// Takes ownership of a raw resource with a new control block and a default-constructed
    /// deletion policy.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `resource` is valid for reads, is owned by the caller
    /// (who hands that ownership over) and can be released by `D`.
    #[must_use]
    pub unsafe fn from_raw(resource: NonNull<T>) -> Self
    where
        D: Default,
    {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { Self::from_raw_with_policy(resource, D::default()) }
    }

    /// Takes ownership of a raw resource with a new control block that releases it
    /// through `policy`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `resource` is valid for reads, is owned by the caller
    /// (who hands that ownership over) and can be released by `policy`.
    #[must_use]
    pub unsafe fn from_raw_with_policy(resource: NonNull<T>, policy: D) -> Self {
        let block = ControlBlock::allocate(policy);

        Self {
            link: Some(Link { resource, block }),
            _owns: PhantomData,
        }
    }

    /// Wraps a link on which the caller has already registered a strong owner.
    ///
    /// # Safety
    ///
    /// The caller must transfer one strong registration on the link's control block.
    #[must_use]
    pub(crate) unsafe fn from_registered_link(link: Link<T, D>) -> Self {
        Self {
            link: Some(link),
            _owns: PhantomData,
        }
    }

    #[must_use]
    #[inline]
    pub(crate) fn link(&self) -> Option<Link<T, D>> {
        self.link
    }

    /// Whether the pointer owns (a share of) a resource.
    #[must_use]
    #[inline]
    pub fn has_resource(&self) -> bool {
        self.link.is_some()
    }

    /// Returns the raw reference of the resource without affecting ownership.
    ///
    /// The returned pointer is a borrow: it must not be released by the caller and must not be
    /// used after the last owner is gone.
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.link.map(|link| link.resource)
    }

    /// Returns a reference to the resource, if there is one.
    #[must_use]
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: We hold a strong registration, so the resource is alive for as long as we
        // are borrowed. Owners only ever hand out shared references.
        self.link.map(|link| unsafe { link.resource.as_ref() })
    }

    /// The control block of the resource, if there is one.
    #[must_use]
    #[inline]
    pub fn control_block(&self) -> Option<&ControlBlock<T, D>> {
        // SAFETY: We hold a strong registration for as long as we are borrowed.
        self.link.map(|link| unsafe { link.block() })
    }

    /// The deletion policy that will release the resource, if there is one.
    #[must_use]
    #[inline]
    pub fn deletion_policy(&self) -> Option<&D> {
        self.control_block().map(ControlBlock::deletion_policy)
    }

    /// Number of owners of the resource, or 0 if the pointer is empty.
    #[must_use]
    #[inline]
    pub fn use_count(&self) -> usize {
        self.control_block().map_or(0, ControlBlock::strong_count)
    }

    /// Number of weak observers of the resource, or 0 if the pointer is empty.
    #[must_use]
    #[inline]
    pub fn weak_count(&self) -> usize {
        self.control_block().map_or(0, ControlBlock::weak_count)
    }

    /// Whether this is the one and only owner of the resource.
    ///
    /// An empty pointer is not unique.
    #[must_use]
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }

    /// Whether both pointers share the same control block (or are both empty).
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.owner_address() == other.owner_address()
    }

    /// Creates a [`Weak`] observer of the resource.
    #[must_use]
    #[inline]
    pub fn downgrade(&self) -> Weak<T, D> {
        Weak::from(self)
    }

    /// Gives up this share of the resource, leaving the pointer empty.
    ///
    /// If this was the last owner, the resource is released immediately. The control block is
    /// freed as well unless weak observers still refer to it. Resetting an empty pointer does
    /// nothing.
    pub fn reset(&mut self) {
        if let Some(link) = self.link.take() {
            // SAFETY: We held a strong registration on the link and no longer reference it.
            unsafe {
                ControlBlock::decrement_strong(link.block, link.resource);
            }
        }
    }

    /// Gives up this share of the current resource (as [`reset()`](Self::reset) does) and
    /// takes ownership of `resource` with a new control block.
    ///
    /// # Safety
    ///
    /// The caller must guarantee what [`from_raw()`](Self::from_raw) requires of `resource`.
    /// In particular, `resource` must not be owned by any other pointer, this one included.
    pub unsafe fn reset_to(&mut self, resource: NonNull<T>)
    where
        D: Default,
    {
        self.reset();

        // SAFETY: Forwarding guarantees from the caller.
        *self = unsafe { Self::from_raw(resource) };
    }

    /// Moves this share out, leaving the pointer empty. Counts are unchanged.
    #[must_use]
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Clone for Shared<T, D> {
    /// Creates another owner of the same resource.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.control_block() {
            block.increment_strong();
        }

        Self {
            link: self.link,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Drop for Shared<T, D> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Default for Shared<T, D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Deref for Shared<T, D> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the pointer is empty.
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.as_ref().expect(ERR_EMPTY_DEREF)
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> OwnerIdentity for Shared<T, D> {
    #[inline]
    fn owner_address(&self) -> usize {
        self.link.map_or(0, Link::owner_address)
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> From<Exclusive<T, D>> for Shared<T, D> {
    /// Moves the resource and deletion policy of an exclusive owner into a new control block.
    ///
    /// An empty exclusive pointer converts into an empty shared pointer.
    fn from(value: Exclusive<T, D>) -> Self {
        match value.into_parts() {
            // SAFETY: The exclusive owner adopted the resource under the same contract we
            // require and has handed its ownership over to us, together with the policy.
            (Some(resource), policy) => unsafe { Self::from_raw_with_policy(resource, policy) },
            (None, _) => Self::empty(),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T, DefaultDelete>
where
    DefaultDelete: DeletionPolicy<T>,
{
    #[inline]
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

#[negative_impl]
impl<T: ?Sized, D: DeletionPolicy<T>> !Send for Shared<T, D> {}
#[negative_impl]
impl<T: ?Sized, D: DeletionPolicy<T>> !Sync for Shared<T, D> {}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl<T: ?Sized, D: DeletionPolicy<T>> fmt::Debug for Shared<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("resource", &self.get())
            .field("use_count", &self.use_count())
            .field("weak_count", &self.weak_count())
            .finish()
    }
}
