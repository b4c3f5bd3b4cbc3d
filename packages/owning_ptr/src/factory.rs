use std::iter;

use crate::{Exclusive, Shared};

/// Allocates `value` on the heap and wraps it in an [`Exclusive`] owner.
///
/// # Example
///
/// ```rust
/// use owning_ptr::make_exclusive;
///
/// let mut value = make_exclusive(42);
/// assert_eq!(*value, 42);
///
/// value.reset();
/// assert!(!value.has_resource());
/// ```
#[must_use]
#[inline]
pub fn make_exclusive<T>(value: T) -> Exclusive<T> {
    Exclusive::new(value)
}

/// Allocates a sequence of `len` default-initialized elements as one contiguous block and wraps
/// it in an [`Exclusive`] owner.
///
/// The whole sequence is released at once, dropping every element.
///
/// # Example
///
/// ```rust
/// use owning_ptr::make_exclusive_slice;
///
/// let mut values = make_exclusive_slice::<u8>(3);
/// values[1] = 7;
///
/// assert_eq!(&*values, &[0, 7, 0]);
/// ```
#[must_use]
pub fn make_exclusive_slice<T: Default>(len: usize) -> Exclusive<[T]> {
    let elements: Box<[T]> = iter::repeat_with(T::default).take(len).collect();
    Exclusive::from_box(elements)
}

/// Allocates `value` on the heap as a new [`Shared`] resource with a single owner.
///
/// # Example
///
/// ```rust
/// use owning_ptr::make_shared;
///
/// let value = make_shared(42);
/// assert_eq!(value.use_count(), 1);
/// ```
#[must_use]
#[inline]
pub fn make_shared<T>(value: T) -> Shared<T> {
    Shared::new(value)
}
