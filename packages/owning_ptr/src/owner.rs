use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Identifies the owner group (control block) a pointer belongs to.
///
/// Implemented by [`Shared`] and [`Weak`]. All pointers sharing one control block have the same
/// identity, whatever their pointee type; empty pointers share the "no owner" identity, which
/// orders before every real owner.
///
/// [`Shared`]: crate::Shared
/// [`Weak`]: crate::Weak
pub trait OwnerIdentity {
    /// Address of the control block, or 0 if the pointer is empty.
    ///
    /// Only meaningful for comparison with other owner addresses while the control blocks
    /// involved are alive.
    #[must_use]
    fn owner_address(&self) -> usize;

    /// Orders pointers by owner identity.
    ///
    /// This is a total order over distinct owners, suitable for keying associative containers.
    /// It compares identity, not the number of owners.
    #[must_use]
    fn owner_cmp<P: OwnerIdentity + ?Sized>(&self, other: &P) -> Ordering {
        self.owner_address().cmp(&other.owner_address())
    }

    /// Whether `self` orders strictly before `other` by owner identity.
    #[must_use]
    fn owner_before<P: OwnerIdentity + ?Sized>(&self, other: &P) -> bool {
        self.owner_cmp(other) == Ordering::Less
    }
}

/// Wraps a [`Shared`] or [`Weak`] so that it compares, orders and hashes by owner identity.
///
/// This makes owning pointers usable as keys of ordered and hashed containers regardless of
/// whether the pointee itself is comparable.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeSet;
///
/// use owning_ptr::{ByOwner, Shared};
///
/// let a = Shared::new(1);
/// let b = Shared::new(1);
///
/// let mut owners = BTreeSet::new();
/// owners.insert(ByOwner(a.clone()));
/// owners.insert(ByOwner(a));
/// owners.insert(ByOwner(b));
///
/// // Equal values, but two distinct owners.
/// assert_eq!(owners.len(), 2);
/// ```
///
/// [`Shared`]: crate::Shared
/// [`Weak`]: crate::Weak
#[derive(Clone, Debug, Default)]
pub struct ByOwner<P>(pub P);

impl<P> ByOwner<P> {
    /// Unwraps the pointer.
    #[must_use]
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P: OwnerIdentity> PartialEq for ByOwner<P> {
    fn eq(&self, other: &Self) -> bool {
        self.0.owner_address() == other.0.owner_address()
    }
}

impl<P: OwnerIdentity> Eq for ByOwner<P> {}

impl<P: OwnerIdentity> PartialOrd for ByOwner<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: OwnerIdentity> Ord for ByOwner<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.owner_cmp(&other.0)
    }
}

impl<P: OwnerIdentity> Hash for ByOwner<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.owner_address().hash(state);
    }
}

impl<P> From<P> for ByOwner<P> {
    fn from(value: P) -> Self {
        Self(value)
    }
}
