#![forbid(unsafe_code)]

//! Identity-keyed subscriber collection.
//!
//! # Design
//!
//! [`Registry<F>`] stores callbacks as strong `Rc<F>` entries tagged with a
//! monotonically increasing [`SubscriberId`]. An atom owns three of them
//! (value, dispatch, observer). Identity is the `Rc` allocation: inserting
//! the same `Rc` twice returns the id of the existing entry instead of
//! registering a duplicate.
//!
//! # Invariants
//!
//! 1. Each callback allocation appears at most once.
//! 2. Entries are kept in registration order; broadcast follows that order.
//! 3. Ids are never reused, not even after [`clear()`](Registry::clear), so a
//!    stale id can only ever miss.
//! 4. [`snapshot()`](Registry::snapshot) is detached from the registry:
//!    inserting or removing while iterating a snapshot does not affect it.

use std::fmt;
use std::rc::Rc;

/// One of the three registries an atom owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Value-subscribers (state bindings).
    Value,
    /// Dispatch-subscribers (reducer bindings).
    Dispatch,
    /// Passive observers.
    Observer,
}

impl Channel {
    /// Stable lowercase name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Dispatch => "dispatch",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle for one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric id (diagnostics only).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of callbacks keyed by allocation identity.
pub struct Registry<F: ?Sized> {
    entries: Vec<(SubscriberId, Rc<F>)>,
    next_id: u64,
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<F: ?Sized> Registry<F> {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a callback.
    ///
    /// If this exact allocation is already registered, the existing id is
    /// returned and nothing is added.
    pub fn insert(&mut self, callback: Rc<F>) -> SubscriberId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| std::ptr::addr_eq(Rc::as_ptr(existing), Rc::as_ptr(&callback)))
        {
            return *id;
        }
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    /// Remove the entry with the given id. Returns `false` if it was not
    /// present (already removed, or cleared).
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        match self.entries.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether an entry with this id is currently registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Copy of the current callbacks, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries.iter().map(|(_, cb)| Rc::clone(cb)).collect()
    }

    /// Drop every entry. Ids keep counting from where they were.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
