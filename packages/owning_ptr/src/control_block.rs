use std::any::type_name;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use negative_impl::negative_impl;
use tracing::trace;

use crate::{DefaultDelete, DeletionPolicy};

const ERR_COUNT_OVERFLOW: &str = "reference count overflow";
const ERR_STRONG_UNDERFLOW: &str = "strong count released more times than it was acquired";
const ERR_WEAK_UNDERFLOW: &str = "weak count released more times than it was acquired";

/// Bookkeeping shared by every [`Shared`] and [`Weak`] pointer of one resource.
///
/// The control block lives on the heap and tracks:
///
/// * the strong count - the number of [`Shared`] owners keeping the resource alive;
/// * the weak count - the number of [`Weak`] observers keeping the control block alive;
/// * the deletion policy used to release the resource.
///
/// A control block starts with a strong count of 1 and a weak count of 0. It releases the
/// resource (through its deletion policy) the instant the strong count reaches zero,
/// regardless of the weak count, and frees itself the instant both counts are zero. These
/// are the only two transitions that do anything besides counting:
///
/// | Event | Before | Effect | Resulting state |
/// |---|---|---|---|
/// | strong release | strong > 1 | strong - 1 | alive |
/// | strong release | strong = 1, weak = 0 | release resource, free block | destroyed |
/// | strong release | strong = 1, weak > 0 | release resource | resource released |
/// | weak release | strong > 0 or weak > 1 | weak - 1 | unchanged |
/// | weak release | strong = 0, weak = 1 | free block | destroyed |
///
/// # Thread safety
///
/// This type is single-threaded. The counters are plain [`Cell`]s; no atomics and no locks
/// are involved, so neither the block nor the pointers referencing it may cross threads.
///
/// [`Shared`]: crate::Shared
/// [`Weak`]: crate::Weak
pub struct ControlBlock<T: ?Sized, D = DefaultDelete> {
    strong: Cell<usize>,
    weak: Cell<usize>,
    policy: D,

    _resource: PhantomData<NonNull<T>>,
}

/// Where a resource and its control block are in their shared lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Lifecycle {
    /// The strong count is above zero; the resource is alive.
    Alive,

    /// The resource has been released but weak observers keep the control block alive.
    ResourceReleased,

    /// The resource has been released and the control block has been freed.
    Destroyed,
}

impl<T: ?Sized, D> ControlBlock<T, D>
where
    D: DeletionPolicy<T>,
{
    /// Allocates a new control block owned by a single strong owner.
    #[must_use]
    pub(crate) fn allocate(policy: D) -> NonNull<Self> {
        let block = Box::new(Self {
            strong: Cell::new(1),
            weak: Cell::new(0),
            policy,
            _resource: PhantomData,
        });

        NonNull::from(Box::leak(block))
    }

    /// Number of strong owners of the resource.
    #[must_use]
    #[inline]
    pub fn strong_count(&self) -> usize {
        self.strong.get()
    }

    /// Number of weak observers of the resource.
    #[must_use]
    #[inline]
    pub fn weak_count(&self) -> usize {
        self.weak.get()
    }

    /// The policy that releases (or released) the resource.
    #[must_use]
    #[inline]
    pub fn deletion_policy(&self) -> &D {
        &self.policy
    }

    /// Registers one more strong owner.
    ///
    /// # Panics
    ///
    /// Panics if the count overflows.
    #[inline]
    pub(crate) fn increment_strong(&self) {
        let strong = self.strong.get().checked_add(1).expect(ERR_COUNT_OVERFLOW);
        self.strong.set(strong);
    }

    /// Registers one more weak observer.
    ///
    /// # Panics
    ///
    /// Panics if the count overflows.
    #[inline]
    pub(crate) fn increment_weak(&self) {
        let weak = self.weak.get().checked_add(1).expect(ERR_COUNT_OVERFLOW);
        self.weak.set(weak);
    }

    /// Unregisters a strong owner.
    ///
    /// If this was the last strong owner, `resource` is released through the deletion policy
    /// and, if no weak observers remain either, the control block is freed.
    ///
    /// # Panics
    ///
    /// A panic from the deletion policy (or from dropping the resource) is propagated after the
    /// control block bookkeeping has been completed, so the block is still freed once no weak
    /// observers remain.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that:
    ///
    /// 1. `block` points to a live control block on which the caller holds a strong
    ///    registration, which this call consumes.
    /// 2. `resource` is the resource managed by that control block.
    /// 3. Neither `block` nor `resource` is used by the caller after this call.
    pub(crate) unsafe fn decrement_strong(block: NonNull<Self>, resource: NonNull<T>) -> Lifecycle {
        // SAFETY: The caller guarantees the block is alive.
        let this = unsafe { block.as_ref() };

        let strong = this
            .strong
            .get()
            .checked_sub(1)
            .expect(ERR_STRONG_UNDERFLOW);
        this.strong.set(strong);

        if strong > 0 {
            return Lifecycle::Alive;
        }

        // The resource may own the last weak observer of its own control block, so the block
        // is pinned with a temporary weak registration until the policy has returned.
        this.increment_weak();

        trace!(
            resource = type_name::<T>(),
            weak = this.weak.get().wrapping_sub(1),
            "strong count reached zero, releasing resource"
        );

        // Unpins the block if the policy panics.
        let pin_guard = scopeguard::guard(block, |block| {
            // SAFETY: We hold the temporary weak registration made above.
            unsafe {
                Self::decrement_weak(block);
            }
        });

        // SAFETY: The strong count just reached zero, so no other owner can observe the
        // resource any more and this is the only release it will ever get. The caller
        // guarantees the resource belongs to this block, so it matches the policy.
        unsafe {
            this.policy.release(resource);
        }

        let block = scopeguard::ScopeGuard::into_inner(pin_guard);

        // SAFETY: We hold the temporary weak registration made above.
        unsafe { Self::decrement_weak(block) }
    }

    /// Unregisters a weak observer.
    ///
    /// If this was the last weak observer and the resource has already been released, the
    /// control block is freed.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `block` points to a live control block on which the
    /// caller holds a weak registration, which this call consumes, and that `block` is not used
    /// by the caller after this call.
    pub(crate) unsafe fn decrement_weak(block: NonNull<Self>) -> Lifecycle {
        // SAFETY: The caller guarantees the block is alive.
        let this = unsafe { block.as_ref() };

        let weak = this.weak.get().checked_sub(1).expect(ERR_WEAK_UNDERFLOW);
        this.weak.set(weak);

        if this.strong.get() > 0 {
            return Lifecycle::Alive;
        }

        if weak > 0 {
            return Lifecycle::ResourceReleased;
        }

        trace!(resource = type_name::<T>(), "freeing control block");

        // SAFETY: Both counts are zero, so nobody else holds a reference to the block. It was
        // allocated as a `Box` in `allocate()`.
        drop(unsafe { Box::from_raw(block.as_ptr()) });

        Lifecycle::Destroyed
    }
}

#[negative_impl]
impl<T: ?Sized, D> !Send for ControlBlock<T, D> {}
#[negative_impl]
impl<T: ?Sized, D> !Sync for ControlBlock<T, D> {}

impl<T: ?Sized, D: fmt::Debug> fmt::Debug for ControlBlock<T, D> {
    #[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("strong", &self.strong.get())
            .field("weak", &self.weak.get())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;
    use testing::DropLog;

    use super::*;
    use crate::CustomDelete;

    assert_not_impl_any!(ControlBlock<u32>: Send, Sync, Clone);

    /// Builds a policy that counts releases and carries a tracked token, so that tests can
    /// tell when the control block (which owns the policy) has been freed.
    fn counting_policy(
        releases: &Rc<Cell<usize>>,
        blocks: &DropLog,
    ) -> CustomDelete<impl Fn(NonNull<u32>)> {
        let releases = Rc::clone(releases);
        let token = blocks.tracked(());

        CustomDelete::new(move |resource: NonNull<u32>| {
            let _keep_alive = &token;
            releases.set(releases.get().wrapping_add(1));
            // SAFETY: Test resources are leaked boxes.
            drop(unsafe { Box::from_raw(resource.as_ptr()) });
        })
    }

    fn new_resource() -> NonNull<u32> {
        NonNull::from(Box::leak(Box::new(5_u32)))
    }

    #[test]
    fn allocate_starts_with_one_strong_and_no_weak() {
        let block = ControlBlock::<u32>::allocate(DefaultDelete);

        // SAFETY: Just allocated, still alive.
        let this = unsafe { block.as_ref() };
        assert_eq!((this.strong_count(), this.weak_count()), (1, 0));

        // SAFETY: We hold the initial strong registration and release it here.
        let state = unsafe { ControlBlock::decrement_strong(block, new_resource()) };
        assert_eq!(state, Lifecycle::Destroyed);
    }

    #[test]
    fn last_strong_release_without_weak_destroys_everything() {
        let releases = Rc::new(Cell::new(0));
        let blocks = DropLog::new();
        let block = ControlBlock::allocate(counting_policy(&releases, &blocks));
        let resource = new_resource();

        // SAFETY: Block is alive; we add a second strong registration.
        unsafe { block.as_ref() }.increment_strong();

        // SAFETY: We hold two strong registrations and release one.
        let state = unsafe { ControlBlock::decrement_strong(block, resource) };
        assert_eq!(state, Lifecycle::Alive);
        assert_eq!(releases.get(), 0);

        // SAFETY: We release the last strong registration.
        let state = unsafe { ControlBlock::decrement_strong(block, resource) };
        assert_eq!(state, Lifecycle::Destroyed);
        assert_eq!(releases.get(), 1);
        assert_eq!(blocks.dropped(), 1);
    }

    #[test]
    fn weak_observer_keeps_block_after_resource_release() {
        let releases = Rc::new(Cell::new(0));
        let blocks = DropLog::new();
        let block = ControlBlock::allocate(counting_policy(&releases, &blocks));

        // SAFETY: Block is alive.
        unsafe { block.as_ref() }.increment_weak();

        // SAFETY: We release the only strong registration.
        let state = unsafe { ControlBlock::decrement_strong(block, new_resource()) };
        assert_eq!(state, Lifecycle::ResourceReleased);
        assert_eq!(releases.get(), 1);
        assert_eq!(blocks.dropped(), 0);

        // SAFETY: The weak registration keeps the block alive.
        let this = unsafe { block.as_ref() };
        assert_eq!((this.strong_count(), this.weak_count()), (0, 1));

        // SAFETY: We release the only weak registration.
        let state = unsafe { ControlBlock::decrement_weak(block) };
        assert_eq!(state, Lifecycle::Destroyed);
        assert_eq!(releases.get(), 1);
        assert_eq!(blocks.dropped(), 1);
    }

    #[test]
    fn weak_release_while_alive_changes_only_weak_count() {
        let block = ControlBlock::<u32>::allocate(DefaultDelete);

        // SAFETY: Block is alive.
        unsafe { block.as_ref() }.increment_weak();
        // SAFETY: Block is alive.
        unsafe { block.as_ref() }.increment_weak();

        // SAFETY: We hold two weak registrations and release one.
        let state = unsafe { ControlBlock::decrement_weak(block) };
        assert_eq!(state, Lifecycle::Alive);

        // SAFETY: Block is alive.
        let this = unsafe { block.as_ref() };
        assert_eq!((this.strong_count(), this.weak_count()), (1, 1));

        // SAFETY: We hold one weak registration and release it.
        let state = unsafe { ControlBlock::decrement_weak(block) };
        assert_eq!(state, Lifecycle::Alive);

        // SAFETY: We release the last strong registration.
        let state = unsafe { ControlBlock::decrement_strong(block, new_resource()) };
        assert_eq!(state, Lifecycle::Destroyed);
    }

    #[test]
    fn deletion_policy_is_accessible() {
        let block = ControlBlock::<u32>::allocate(DefaultDelete);

        // SAFETY: Block is alive.
        assert_eq!(*unsafe { block.as_ref() }.deletion_policy(), DefaultDelete);

        // SAFETY: We release the only strong registration.
        unsafe {
            ControlBlock::decrement_strong(block, new_resource());
        }
    }

    #[test]
    fn panicking_policy_still_frees_block() {
        let blocks = DropLog::new();
        let token = blocks.tracked(());

        let policy = CustomDelete::new(move |resource: NonNull<u32>| {
            let _keep_alive = &token;
            // SAFETY: Test resources are leaked boxes.
            drop(unsafe { Box::from_raw(resource.as_ptr()) });
            panic!("release failed");
        });

        let block = ControlBlock::allocate(policy);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: We release the only strong registration.
            unsafe {
                ControlBlock::decrement_strong(block, new_resource());
            }
        }));

        assert!(result.is_err());
        assert_eq!(blocks.dropped(), 1);
    }

    #[test]
    fn panicking_policy_leaves_block_to_remaining_observers() {
        let blocks = DropLog::new();
        let token = blocks.tracked(());

        let policy = CustomDelete::new(move |resource: NonNull<u32>| {
            let _keep_alive = &token;
            // SAFETY: Test resources are leaked boxes.
            drop(unsafe { Box::from_raw(resource.as_ptr()) });
            panic!("release failed");
        });

        let block = ControlBlock::allocate(policy);

        // SAFETY: Block is alive.
        unsafe { block.as_ref() }.increment_weak();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: We release the only strong registration.
            unsafe {
                ControlBlock::decrement_strong(block, new_resource());
            }
        }));
        assert!(result.is_err());

        // SAFETY: The remaining weak registration keeps the block alive.
        let this = unsafe { block.as_ref() };
        assert_eq!((this.strong_count(), this.weak_count()), (0, 1));
        assert_eq!(blocks.dropped(), 0);

        // SAFETY: We release the only weak registration.
        let state = unsafe { ControlBlock::decrement_weak(block) };
        assert_eq!(state, Lifecycle::Destroyed);
        assert_eq!(blocks.dropped(), 1);
    }

    #[test]
    #[should_panic(expected = "weak count released more times")]
    #[cfg_attr(miri, ignore)] // The block is deliberately leaked by the panic.
    fn weak_underflow_panics() {
        let block = ControlBlock::<u32>::allocate(DefaultDelete);

        // SAFETY: Deliberately violating the registration contract to hit the guard; the
        // block is alive and the panic happens before anything is freed.
        unsafe {
            ControlBlock::decrement_weak(block);
        }
    }
}
