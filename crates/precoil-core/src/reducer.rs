#![forbid(unsafe_code)]

//! Reducer reconciliation.
//!
//! A reducer binding keeps its own copy of the state and re-derives it from
//! the actions it is sent. Values set directly on the atom never went through
//! any reducer, so the store tells dispatch-subscribers about them with a
//! [`Reconcile::Sync`] event instead. [`ReducerAdapter`] folds both kinds of
//! event into the local copy:
//!
//! | Event | Local state becomes | User reducer called |
//! |-------|---------------------|---------------------|
//! | `Sync(v)` | `v` | no |
//! | `Action(a)`, `a: A` | `reducer(local, a)` | yes |
//! | `Action(a)`, other action type | unchanged, then the committed value via a follow-up `Sync` | no |
//!
//! Actions are forwarded before the dispatching site computes its commit, so
//! a site that cannot interpret an action calls [`Dispatched::defer`] and
//! receives the committed value as a `Sync` once it is known.
//!
//! `Reconcile` values can only be built inside this crate, so user code can
//! neither forge a sync event nor have one reach its reducer.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::atom::{Atom, Subscription};
use crate::binding::LocalSlot;

/// Event delivered to dispatch-subscribers.
pub enum Reconcile<'a, T> {
    /// An action dispatched through some reducer binding.
    Action(Dispatched<'a>),
    /// A value written with [`Atom::set`], or the commit of a dispatch for
    /// sites that deferred or fell behind a nested update.
    Sync(Synced<'a, T>),
}

impl<'a, T> Reconcile<'a, T> {
    pub(crate) fn action(action: &'a dyn Any, defer: &'a Cell<bool>) -> Self {
        Self::Action(Dispatched { action, defer })
    }

    pub(crate) fn sync(value: &'a T) -> Self {
        Self::Sync(Synced { value })
    }

    /// The carried value, for sync events.
    #[must_use]
    pub fn value(&self) -> Option<&'a T> {
        match self {
            Self::Action(_) => None,
            Self::Sync(synced) => Some(synced.value),
        }
    }

    /// Whether this is a sync event.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for Reconcile<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(d) => f.debug_tuple("Action").field(d).finish(),
            Self::Sync(s) => f.debug_tuple("Sync").field(s).finish(),
        }
    }
}

/// Payload of [`Reconcile::Action`].
pub struct Dispatched<'a> {
    action: &'a dyn Any,
    defer: &'a Cell<bool>,
}

impl<'a> Dispatched<'a> {
    /// The action, if it is an `A`.
    #[must_use]
    pub fn action<A: 'static>(&self) -> Option<&'a A> {
        let action: &'a dyn Any = self.action;
        action.downcast_ref::<A>()
    }

    /// Ask for the value this dispatch commits. It arrives as a follow-up
    /// [`Reconcile::Sync`] before any value-subscriber is notified.
    pub fn defer(&self) {
        self.defer.set(true);
    }
}

impl fmt::Debug for Dispatched<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("deferred", &self.defer.get())
            .finish_non_exhaustive()
    }
}

/// Payload of [`Reconcile::Sync`].
pub struct Synced<'a, T> {
    value: &'a T,
}

impl<'a, T> Synced<'a, T> {
    /// The externally set value.
    #[must_use]
    pub fn value(&self) -> &'a T {
        self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Synced<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synced").field("value", self.value).finish()
    }
}

/// Shared reducer function.
pub type Reducer<T, A> = dyn Fn(&T, &A) -> T;

/// A user reducer wrapped for one binding site.
pub struct ReducerAdapter<T, A> {
    reducer: Rc<Reducer<T, A>>,
}

impl<T, A> Clone for ReducerAdapter<T, A> {
    fn clone(&self) -> Self {
        Self {
            reducer: Rc::clone(&self.reducer),
        }
    }
}

impl<T, A> fmt::Debug for ReducerAdapter<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerAdapter")
            .field("action", &std::any::type_name::<A>())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static, A: 'static> ReducerAdapter<T, A> {
    /// Wrap `reducer`.
    pub fn new(reducer: impl Fn(&T, &A) -> T + 'static) -> Self {
        Self::from_rc(Rc::new(reducer))
    }

    /// Wrap an already shared reducer.
    #[must_use]
    pub fn from_rc(reducer: Rc<Reducer<T, A>>) -> Self {
        Self { reducer }
    }

    /// Run the user reducer directly.
    pub fn reduce(&self, state: &T, action: &A) -> T {
        (self.reducer)(state, action)
    }

    /// Fold a reconciliation event into `local`.
    ///
    /// Returns `None` for an action of another type; the event is deferred
    /// and the committed value follows as a sync event.
    pub fn reconcile(&self, local: &T, event: &Reconcile<'_, T>) -> Option<T> {
        match event {
            Reconcile::Sync(synced) => Some(synced.value().clone()),
            Reconcile::Action(dispatched) => match dispatched.action::<A>() {
                Some(action) => Some(self.reduce(local, action)),
                None => {
                    dispatched.defer();
                    None
                }
            },
        }
    }

    /// Forward `action` to the atom's dispatch-subscribers, then apply it to
    /// the committed value with this reducer and broadcast the result.
    pub fn dispatch(&self, atom: &Atom<T>, action: A) {
        atom.dispatch_with(|state, action| self.reduce(state, action), action);
    }

    /// Keep `slot` reconciled with `atom` through this reducer.
    pub fn subscribe(&self, atom: &Atom<T>, slot: Rc<dyn LocalSlot<T>>) -> Subscription {
        let adapter = self.clone();
        atom.subscribe_dispatch(move |event| {
            if let Some(next) = adapter.reconcile(&slot.get(), event) {
                slot.set(next);
            }
        })
    }
}

/// Dispatcher handle for one reducer binding site.
pub struct Dispatch<T, A> {
    atom: Atom<T>,
    adapter: ReducerAdapter<T, A>,
}

impl<T, A> Clone for Dispatch<T, A> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            adapter: self.adapter.clone(),
        }
    }
}

impl<T: fmt::Debug, A> fmt::Debug for Dispatch<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("atom", &self.atom)
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl<T: Clone + 'static, A: 'static> Dispatch<T, A> {
    /// Pair `atom` with a site's adapter.
    #[must_use]
    pub fn new(atom: Atom<T>, adapter: ReducerAdapter<T, A>) -> Self {
        Self { atom, adapter }
    }

    /// Dispatch `action` through this site's reducer.
    pub fn dispatch(&self, action: A) {
        self.adapter.dispatch(&self.atom, action);
    }

    /// Target atom.
    #[must_use]
    pub fn atom(&self) -> &Atom<T> {
        &self.atom
    }

    /// This site's adapter.
    #[must_use]
    pub fn adapter(&self) -> &ReducerAdapter<T, A> {
        &self.adapter
    }
}

impl<T: Clone + 'static> Atom<T> {
    /// Dispatcher for `reducer`, without any view binding.
    pub fn reducer<A: 'static>(&self, reducer: impl Fn(&T, &A) -> T + 'static) -> Dispatch<T, A> {
        Dispatch::new(self.clone(), ReducerAdapter::new(reducer))
    }
}
