#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the ownership packages.
//!
//! Ownership bugs show up as a value being dropped the wrong number of times (double free,
//! leak) or at the wrong moment (use-after-free). The helpers here make drops observable:
//!
//! * [`DropLog`] hands out [`Tracked`] values that record their own drop in a shared log.
//! * [`Counted`] is a `Default`-constructible value that records construction and drop in
//!   thread-local counters, for code paths that create values on their own (e.g. factories
//!   that default-initialize a sequence).

use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Shared record of how many [`Tracked`] values were created and dropped.
///
/// Cloning the log gives another handle to the same record.
///
/// # Example
///
/// ```rust
/// use testing::DropLog;
///
/// let log = DropLog::new();
/// let value = log.tracked(42);
///
/// assert_eq!(*value, 42);
/// assert_eq!(log.alive(), 1);
///
/// drop(value);
/// assert_eq!(log.dropped(), 1);
/// ```
#[derive(Clone, Default)]
pub struct DropLog {
    inner: Rc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    created: Cell<usize>,
    dropped: Cell<usize>,
}

impl DropLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `value` so that its drop is recorded in this log.
    #[must_use]
    pub fn tracked<T>(&self, value: T) -> Tracked<T> {
        self.inner
            .created
            .set(self.inner.created.get().wrapping_add(1));

        Tracked {
            value,
            log: self.clone(),
        }
    }

    /// Number of values created through this log.
    #[must_use]
    pub fn created(&self) -> usize {
        self.inner.created.get()
    }

    /// Number of values created through this log that have since been dropped.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.inner.dropped.get()
    }

    /// Number of values created through this log that are still alive.
    #[must_use]
    pub fn alive(&self) -> usize {
        self.created().wrapping_sub(self.dropped())
    }
}

impl fmt::Debug for DropLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropLog")
            .field("created", &self.created())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// A value whose drop is recorded in the [`DropLog`] that created it.
pub struct Tracked<T = ()> {
    value: T,
    log: DropLog,
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        let dropped = &self.log.inner.dropped;
        dropped.set(dropped.get().wrapping_add(1));
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.value)
            .field("log", &self.log)
            .finish()
    }
}

thread_local! {
    static COUNTED_CREATED: Cell<usize> = const { Cell::new(0) };
    static COUNTED_DROPPED: Cell<usize> = const { Cell::new(0) };
}

/// A value that counts its constructions and drops in thread-local counters.
///
/// Each test runs on its own thread, so tests observe only their own values. Call
/// [`Counted::reset_counters()`] at the start of a test that may share a thread with
/// another one (e.g. under a single-threaded test runner).
#[derive(Debug)]
pub struct Counted {
    _private: (),
}

impl Counted {
    /// Resets both counters of the current thread to zero.
    pub fn reset_counters() {
        COUNTED_CREATED.with(|c| c.set(0));
        COUNTED_DROPPED.with(|c| c.set(0));
    }

    /// Number of `Counted` values created on the current thread.
    #[must_use]
    pub fn created() -> usize {
        COUNTED_CREATED.with(Cell::get)
    }

    /// Number of `Counted` values dropped on the current thread.
    #[must_use]
    pub fn dropped() -> usize {
        COUNTED_DROPPED.with(Cell::get)
    }
}

impl Default for Counted {
    fn default() -> Self {
        COUNTED_CREATED.with(|c| c.set(c.get().wrapping_add(1)));
        Self { _private: () }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        COUNTED_DROPPED.with(|c| c.set(c.get().wrapping_add(1)));
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn drop_log_counts_each_value_once() {
        let log = DropLog::new();

        let a = log.tracked(1);
        let b = log.tracked(2);
        assert_eq!(log.created(), 2);
        assert_eq!(log.alive(), 2);

        drop(a);
        assert_eq!(log.dropped(), 1);

        drop(b);
        assert_eq!(log.dropped(), 2);
        assert_eq!(log.alive(), 0);
    }

    #[test]
    fn counted_tracks_default_construction() {
        Counted::reset_counters();

        let values: Vec<Counted> = (0..3).map(|_| Counted::default()).collect();
        assert_eq!(Counted::created(), 3);
        assert_eq!(Counted::dropped(), 0);

        drop(values);
        assert_eq!(Counted::dropped(), 3);
    }
}
