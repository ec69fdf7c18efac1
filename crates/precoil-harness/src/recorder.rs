#![forbid(unsafe_code)]

//! Passive observers that remember what they were told.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use precoil_core::{Atom, Subscription};

/// Shared log of values, fed by callbacks.
pub struct Recorder<T> {
    seen: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            seen: Rc::clone(&self.seen),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Recorder").field(&self.seen.borrow()).finish()
    }
}

impl<T: Clone + 'static> Recorder<T> {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that appends every value it receives.
    pub fn callback(&self) -> impl Fn(&T) + 'static {
        let seen = Rc::clone(&self.seen);
        move |value: &T| seen.borrow_mut().push(value.clone())
    }

    /// Register as an observer of `atom`.
    pub fn observe(&self, atom: &Atom<T>) -> Subscription {
        atom.subscribe(self.callback())
    }

    /// Everything recorded, oldest first.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.seen.borrow().clone()
    }

    /// Most recent value, if any.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.seen.borrow().last().cloned()
    }

    /// Number of values recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Whether nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }

    /// Forget everything recorded so far. Registered callbacks keep
    /// recording.
    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }
}
