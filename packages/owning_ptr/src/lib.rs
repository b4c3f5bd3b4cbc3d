#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Ownership primitives with explicit deletion policies: exclusive owners, reference-counted
//! shared owners and weak observers.
//!
//! This crate provides:
//!
//! * [`Exclusive<T>`] - sole, move-only ownership of a resource (a scalar `T` or a sequence
//!   `[T]`), released through a [`DeletionPolicy`] when the owner is dropped or reset.
//! * [`Shared<T>`] - clonable, reference-counted ownership. The resource is released exactly
//!   once, when the last owner lets go.
//! * [`Weak<T>`] - a non-owning observer of a [`Shared`] resource that can tell whether the
//!   resource is still alive and upgrade to an owner while it is.
//! * [`ControlBlock<T>`] - the bookkeeping shared by the [`Shared`] owners and [`Weak`]
//!   observers of one resource: strong count, weak count and deletion policy.
//! * [`make_exclusive()`], [`make_exclusive_slice()`] and [`make_shared()`] factories.
//!
//! # Lifecycle of a shared resource
//!
//! A resource and its control block move through these states:
//!
//! 1. **Alive** - created together with the first [`Shared`] owner (strong count 1). Cloning an
//!    owner or creating an observer only adjusts the counts.
//! 2. **Resource released** - the strong count reached zero while observers remain. The
//!    deletion policy has released the resource; the control block remains so observers can
//!    see that the resource is gone.
//! 3. **Destroyed** - both counts are zero and the control block has been freed. This follows
//!    directly from "alive" if there were no observers when the last owner let go.
//!
//! # Deletion policies
//!
//! Every pointer type takes a deletion policy type parameter `D`, defaulting to
//! [`DefaultDelete`], which reclaims a boxed scalar or a boxed sequence. A caller-supplied
//! policy can be used via [`CustomDelete`] or by implementing [`DeletionPolicy`].
//!
//! # Raw references
//!
//! All pointers expose the raw reference they manage via `get()`. This is a borrow: releasing
//! such a reference while a pointer still owns it results in a double release.
//!
//! # Thread safety
//!
//! [`Shared`], [`Weak`] and [`ControlBlock`] are single-threaded: reference counts are plain
//! integers, so these types are neither [`Send`] nor [`Sync`]. [`Exclusive`] is thread-mobile
//! under the same conditions as a [`Box`].
//!
//! # Example
//!
//! ```rust
//! use owning_ptr::{Shared, Weak, make_exclusive};
//!
//! // Exclusive ownership.
//! let mut answer = make_exclusive(42);
//! assert_eq!(*answer, 42);
//! answer.reset();
//! assert!(!answer.has_resource());
//!
//! // Shared ownership with a weak observer.
//! let a = Shared::new(String::from("hello"));
//! let b = a.clone();
//! let observer = Weak::from(&a);
//! assert_eq!(a.use_count(), 2);
//!
//! drop(a);
//! assert_eq!(b.use_count(), 1);
//! assert!(!observer.expired());
//!
//! drop(b);
//! assert!(observer.expired());
//! assert!(!observer.lock().has_resource());
//! ```

mod control_block;
mod deletion_policy;
mod exclusive;
mod factory;
mod owner;
mod shared;
mod weak;

pub use control_block::ControlBlock;
pub use deletion_policy::*;
pub use exclusive::Exclusive;
pub use factory::*;
pub use owner::*;
pub use shared::Shared;
pub use weak::Weak;
