#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A small widget hierarchy built on the `owning_ptr` ownership primitives.
//!
//! Every widget exclusively owns its children and observes its parent through a weak
//! back-reference. The root of a tree is owned by a [`Shared`] pointer, which is what the
//! back-references of its children observe.
//!
//! Dropping the last owner of the root drops the whole tree. The back-references never keep
//! a parent alive: they only register with the weak count of the parent's control block.
//!
//! # Example
//!
//! ```rust
//! use widget_tree::{Widget, WidgetKind};
//!
//! let root = Widget::root(WidgetKind::Root);
//! Widget::attach(&root, WidgetKind::Tab);
//! Widget::attach(&root, WidgetKind::Calendar);
//!
//! assert_eq!(root.child_count(), 2);
//! assert_eq!(root.use_count(), 1);
//! assert_eq!(root.weak_count(), 2);
//!
//! let parent_type = root
//!     .with_child(1, |calendar| calendar.parent().lock().type_name())
//!     .unwrap();
//! assert_eq!(parent_type, "RootWidget");
//! ```

use std::cell::RefCell;

use derive_more::derive::Display;
use owning_ptr::{Exclusive, Shared, Weak};

/// What a [`Widget`] is. Determines the type name it reports.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum WidgetKind {
    /// The top of a widget tree.
    #[display("RootWidget")]
    Root,

    /// A tab, typically hosting further content.
    #[display("TabWidget")]
    Tab,

    /// A calendar.
    #[display("CalendarWidget")]
    Calendar,
}

/// A node in a widget tree.
///
/// Children are owned exclusively by their parent and are dropped together with it. Each
/// child holds a [`Weak`] back-reference to its parent.
#[derive(Debug)]
pub struct Widget {
    kind: WidgetKind,
    parent: Weak<Self>,
    children: RefCell<Vec<Exclusive<Self>>>,
}

impl Widget {
    /// Creates a widget without a parent, owned by a new [`Shared`] pointer.
    #[must_use]
    pub fn root(kind: WidgetKind) -> Shared<Self> {
        Shared::new(Self {
            kind,
            parent: Weak::new(),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Creates a child widget of `parent` and hands ownership of it to `parent`.
    ///
    /// Returns the index of the new child among the children of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not own a widget.
    pub fn attach(parent: &Shared<Self>, kind: WidgetKind) -> usize {
        let child = Exclusive::new(Self {
            kind,
            parent: parent.downgrade(),
            children: RefCell::new(Vec::new()),
        });

        let mut children = parent.children.borrow_mut();
        let index = children.len();
        children.push(child);

        tracing::trace!(
            parent = %parent.kind,
            child = %kind,
            index,
            "attached child widget"
        );

        index
    }

    /// The weak back-reference to the parent of this widget.
    ///
    /// A root widget has an empty (always expired) back-reference.
    #[must_use]
    pub fn parent(&self) -> &Weak<Self> {
        &self.parent
    }

    /// What kind of widget this is.
    #[must_use]
    pub fn kind(&self) -> WidgetKind {
        self.kind
    }

    /// The type name of the widget, e.g. `"TabWidget"`.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.kind.to_string()
    }

    /// Number of children owned by this widget.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// The kinds of the children of this widget, in attachment order.
    #[must_use]
    pub fn child_kinds(&self) -> Vec<WidgetKind> {
        self.children
            .borrow()
            .iter()
            .map(|child| child.kind)
            .collect()
    }

    /// Calls `f` with the child at `index`, returning its result.
    ///
    /// Returns `None` if there is no child at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `f` attaches a child to this same widget.
    pub fn with_child<R>(&self, index: usize, f: impl FnOnce(&Self) -> R) -> Option<R> {
        let children = self.children.borrow();
        children.get(index).map(|child| f(child))
    }
}
