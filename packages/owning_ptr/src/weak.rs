use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

use negative_impl::negative_impl;

use crate::shared::Link;
use crate::{ControlBlock, DefaultDelete, DeletionPolicy, OwnerIdentity, Shared};

/// Non-owning observer of a resource owned by [`Shared`] pointers.
///
/// A `Weak` registers with the [`ControlBlock`] of the resource as a weak observer. It never
/// keeps the resource alive; it only keeps the control block alive, so that it can always tell
/// whether the resource still exists ([`expired()`](Self::expired)) and, if it does, become an
/// owner again ([`lock()`](Self::lock)).
///
/// A `Weak` can only be created from a [`Shared`] of the same pointee and deletion policy
/// type (or by cloning another `Weak`), so it never creates a control block of its own.
///
/// # Thread safety
///
/// This type is single-threaded, like [`Shared`].
///
/// # Example
///
/// ```rust
/// use owning_ptr::{Shared, Weak};
///
/// let owner = Shared::new(42);
/// let observer = Weak::from(&owner);
///
/// assert!(!observer.expired());
/// assert_eq!(*observer.lock(), 42);
///
/// drop(owner);
///
/// assert!(observer.expired());
/// assert_eq!(observer.lock().use_count(), 0);
/// ```
pub struct Weak<T: ?Sized, D: DeletionPolicy<T> = DefaultDelete> {
    link: Option<Link<T, D>>,
}

impl<T: ?Sized, D: DeletionPolicy<T>> Weak<T, D> {
    /// Creates an observer that observes nothing. It is always expired.
    #[must_use]
    pub const fn new() -> Self {
        Self { link: None }
    }

    /// The control block of the observed resource, if there is one.
    ///
    /// The control block outlives the resource for as long as observers exist, so this
    /// returns `Some` even after the resource has been released.
    #[must_use]
    #[inline]
    pub fn control_block(&self) -> Option<&ControlBlock<T, D>> {
        // SAFETY: We hold a weak registration for as long as we are borrowed.
        self.link.map(|link| unsafe { link.block() })
    }

    /// Whether the observed resource is gone (or nothing was ever observed).
    #[must_use]
    #[inline]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Whether the observed resource is still alive.
    #[must_use]
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.expired()
    }

    /// Number of owners of the observed resource.
    #[must_use]
    #[inline]
    pub fn use_count(&self) -> usize {
        self.control_block().map_or(0, ControlBlock::strong_count)
    }

    /// Number of observers of the resource, this one included.
    #[must_use]
    #[inline]
    pub fn weak_count(&self) -> usize {
        self.control_block().map_or(0, ControlBlock::weak_count)
    }

    /// Returns the raw reference of the observed resource.
    ///
    /// The address is retained after the resource has been released; it must only be
    /// dereferenced while an owner is known to exist (e.g. while holding the result of
    /// [`lock()`](Self::lock)).
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.link.map(|link| link.resource)
    }

    /// Attempts to become an owner of the observed resource.
    ///
    /// Returns a new [`Shared`] owner if the resource is still alive, or an empty [`Shared`]
    /// if it has been released.
    #[must_use]
    pub fn lock(&self) -> Shared<T, D> {
        let Some(link) = self.link else {
            return Shared::empty();
        };

        // SAFETY: We hold a weak registration, so the block is alive.
        let block = unsafe { link.block() };

        if block.strong_count() == 0 {
            return Shared::empty();
        }

        block.increment_strong();

        // SAFETY: We just registered the strong owner we are handing over.
        unsafe { Shared::from_registered_link(link) }
    }

    /// Stops observing, leaving this observer empty.
    ///
    /// If this was the last observer of an already released resource, the control block is
    /// freed.
    pub fn reset(&mut self) {
        if let Some(link) = self.link.take() {
            // SAFETY: We held a weak registration on the link and no longer reference it.
            unsafe {
                ControlBlock::decrement_weak(link.block);
            }
        }
    }

    /// Whether both observers share the same control block (or are both empty).
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.owner_address() == other.owner_address()
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> From<&Shared<T, D>> for Weak<T, D> {
    /// Starts observing the resource of `owner`.
    ///
    /// Observing an empty owner gives an empty observer.
    fn from(owner: &Shared<T, D>) -> Self {
        let link = owner.link();

        if let Some(link) = link {
            // SAFETY: `owner` holds a strong registration, so the block is alive.
            unsafe { link.block() }.increment_weak();
        }

        Self { link }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Clone for Weak<T, D> {
    /// Creates another observer of the same resource.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.control_block() {
            block.increment_weak();
        }

        Self { link: self.link }
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Drop for Weak<T, D> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> Default for Weak<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, D: DeletionPolicy<T>> OwnerIdentity for Weak<T, D> {
    #[inline]
    fn owner_address(&self) -> usize {
        self.link.map_or(0, Link::owner_address)
    }
}

#[negative_impl]
impl<T: ?Sized, D: DeletionPolicy<T>> !Send for Weak<T, D> {}
#[negative_impl]
impl<T: ?Sized, D: DeletionPolicy<T>> !Sync for Weak<T, D> {}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl<T: ?Sized, D: DeletionPolicy<T>> fmt::Debug for Weak<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("resource", &self.get())
            .field("use_count", &self.use_count())
            .field("weak_count", &self.weak_count())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::DropLog;

    use super::*;
    use crate::CustomDelete;

    assert_not_impl_any!(Weak<u32>: Send, Sync);
    assert_impl_all!(Weak<u32>: Clone, Default, Drop);

    #[test]
    fn default_is_expired_and_locks_to_empty() {
        let observer: Weak<u32> = Weak::new();

        assert!(observer.expired());
        assert!(!observer.is_alive());
        assert_eq!(observer.use_count(), 0);
        assert_eq!(observer.weak_count(), 0);
        assert!(!observer.lock().has_resource());
    }

    #[test]
    fn from_shared_registers_weak_only() {
        let owner = Shared::new(1);
        let observer = Weak::from(&owner);

        assert_eq!(owner.use_count(), 1);
        assert_eq!(owner.weak_count(), 1);
        assert_eq!(observer.use_count(), 1);
        assert!(observer.is_alive());
    }

    #[test]
    fn from_empty_shared_is_empty() {
        let owner: Shared<u32> = Shared::empty();
        let observer = owner.downgrade();

        assert!(observer.expired());
        assert!(observer.control_block().is_none());
    }

    #[test]
    fn clone_and_drop_adjust_weak_count() {
        let owner = Shared::new(1);
        let a = owner.downgrade();
        let b = a.clone();
        assert_eq!(owner.weak_count(), 2);
        assert!(a.ptr_eq(&b));

        drop(a);
        assert_eq!(owner.weak_count(), 1);

        let mut b = b;
        b.reset();
        assert_eq!(owner.weak_count(), 0);

        // Resetting again is harmless.
        b.reset();
        assert_eq!(owner.weak_count(), 0);
    }

    #[test]
    fn lock_while_alive_adds_owner() {
        let owner = Shared::new(String::from("alive"));
        let observer = owner.downgrade();

        let locked = observer.lock();
        assert_eq!(*locked, "alive");
        assert_eq!(owner.use_count(), 2);
        assert!(locked.ptr_eq(&owner));
    }

    #[test]
    fn expires_exactly_when_last_owner_drops() {
        let log = DropLog::new();
        let a = Shared::new(log.tracked(()));
        let b = a.clone();
        let observer = a.downgrade();

        drop(a);
        assert!(!observer.expired());

        drop(b);
        assert!(observer.expired());
        assert_eq!(log.dropped(), 1);

        let locked = observer.lock();
        assert!(!locked.has_resource());
        assert_eq!(locked.use_count(), 0);
    }

    #[test]
    fn control_block_outlives_resource_until_last_observer() {
        let blocks = DropLog::new();
        let block_token = blocks.tracked(());

        let policy = CustomDelete::new(move |resource: NonNull<u32>| {
            let _keep_alive = &block_token;
            // SAFETY: The resource is a leaked box.
            drop(unsafe { Box::from_raw(resource.as_ptr()) });
        });

        let raw = NonNull::from(Box::leak(Box::new(7_u32)));

        // SAFETY: The leaked box matches the policy.
        let owner = unsafe { Shared::from_raw_with_policy(raw, policy) };
        let observer = owner.downgrade();
        let second_observer = observer.clone();

        drop(owner);

        // Resource released, block still held by observers.
        assert!(observer.expired());
        assert_eq!(observer.weak_count(), 2);
        assert_eq!(blocks.dropped(), 0);

        drop(observer);
        assert_eq!(blocks.dropped(), 0);

        assert!(!second_observer.lock().has_resource());

        drop(second_observer);
        assert_eq!(blocks.dropped(), 1);
    }

    #[test]
    fn resource_dropping_last_observer_of_itself_is_sound() {
        struct Node {
            this: RefCell<Weak<Node>>,
            dropped: Rc<Cell<bool>>,
        }

        impl Drop for Node {
            fn drop(&mut self) {
                self.dropped.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let owner = Shared::new(Node {
            this: RefCell::new(Weak::new()),
            dropped: Rc::clone(&dropped),
        });

        // The resource holds the only observer of its own control block.
        *owner.this.borrow_mut() = owner.downgrade();
        assert_eq!(owner.weak_count(), 1);

        // Releasing the resource drops that observer while the release is in progress.
        drop(owner);
        assert!(dropped.get());
    }
}
