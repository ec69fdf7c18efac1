#![forbid(unsafe_code)]

//! View binding: the contract between atoms and a host UI runtime.
//!
//! A host provides two capabilities:
//!
//! - [`ViewHost::use_local_slot`]: a re-renderable slot of memory, created on
//!   first entry into a scope and returned again on every re-entry.
//!   Overwriting it schedules a re-render of the owning scope.
//! - [`ViewHost::on_mount`]: run a setup once, when the scope is first
//!   entered, and its [`Teardown`] exactly once when the scope exits.
//!
//! [`Atom::bind_state`] and [`Atom::bind_reducer`] combine the two into a
//! scoped subscription: the slot is seeded with the committed value, the
//! mount setup subscribes a callback that overwrites the slot, and the
//! teardown releases that subscription.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::atom::{Atom, SetStateAction, Subscription};
use crate::reducer::{Dispatch, ReducerAdapter};

/// Cleanup registered by a mount setup.
pub type Teardown = Box<dyn FnOnce()>;

/// A host-owned slot holding a bound view's local copy.
pub trait LocalSlot<T> {
    /// Current local value.
    fn get(&self) -> T;
    /// Overwrite the local value (and, for real hosts, request a re-render).
    fn set(&self, value: T);
}

impl<T: Clone> LocalSlot<T> for RefCell<T> {
    fn get(&self) -> T {
        self.borrow().clone()
    }

    fn set(&self, value: T) {
        self.replace(value);
    }
}

/// The two capabilities a UI runtime lends to bindings.
pub trait ViewHost {
    /// Slot for the current scope; `init` runs only on first entry.
    fn use_local_slot<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Rc<dyn LocalSlot<T>>;

    /// Run `setup` once when the scope mounts; run its teardown exactly once
    /// when the scope exits. Ignored on re-entry.
    fn on_mount(&mut self, setup: Box<dyn FnOnce() -> Teardown>);
}

/// Setter handle returned by [`Atom::bind_state`].
pub struct SetState<T> {
    atom: Atom<T>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState").field("atom", &self.atom).finish()
    }
}

impl<T: Clone + 'static> SetState<T> {
    /// Setter for `atom`.
    #[must_use]
    pub fn new(atom: Atom<T>) -> Self {
        Self { atom }
    }

    /// Same as [`Atom::set`].
    pub fn set(&self, next: impl Into<SetStateAction<T>>) {
        self.atom.set(next);
    }

    /// Same as [`Atom::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.atom.update(f);
    }

    /// Target atom.
    #[must_use]
    pub fn atom(&self) -> &Atom<T> {
        &self.atom
    }
}

fn release(mut subscription: Subscription) -> Teardown {
    Box::new(move || subscription.unsubscribe())
}

impl<T: Clone + 'static> Atom<T> {
    /// Keep `slot` equal to every value this atom commits, via the
    /// value-subscriber registry.
    pub fn subscribe_slot(&self, slot: Rc<dyn LocalSlot<T>>) -> Subscription {
        self.subscribe_value(move |value| slot.set(value.clone()))
    }

    /// Bind the current scope through the value pathway.
    ///
    /// Returns the scope's local copy and a setter.
    pub fn bind_state<H: ViewHost>(&self, host: &mut H) -> (T, SetState<T>) {
        let seen = self.version();
        let seed = self.clone();
        let slot = host.use_local_slot(move || seed.get());

        let atom = self.clone();
        let mount_slot = Rc::clone(&slot);
        host.on_mount(Box::new(move || {
            if atom.version() != seen {
                mount_slot.set(atom.get());
            }
            release(atom.subscribe_slot(mount_slot))
        }));

        (slot.get(), SetState::new(self.clone()))
    }

    /// Bind the current scope through the dispatch pathway with `reducer`.
    ///
    /// Returns the scope's local state and a dispatcher. The reducer captured
    /// on mount keeps the local state reconciled; the dispatcher uses the
    /// reducer passed on this entry.
    pub fn bind_reducer<H: ViewHost, A: 'static>(
        &self,
        host: &mut H,
        reducer: impl Fn(&T, &A) -> T + 'static,
    ) -> (T, Dispatch<T, A>) {
        let seen = self.version();
        let seed = self.clone();
        let slot = host.use_local_slot(move || seed.get());
        let adapter = ReducerAdapter::new(reducer);

        let atom = self.clone();
        let mount_slot = Rc::clone(&slot);
        let mount_adapter = adapter.clone();
        host.on_mount(Box::new(move || {
            if atom.version() != seen {
                mount_slot.set(atom.get());
            }
            release(mount_adapter.subscribe(&atom, mount_slot))
        }));

        (slot.get(), Dispatch::new(self.clone(), adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;

    /// Single-scope host: one slot per hook index, mount setups run on
    /// demand.
    #[derive(Default)]
    struct ScopeHost {
        slots: Vec<Rc<dyn std::any::Any>>,
        cursor: usize,
        pending: Vec<Box<dyn FnOnce() -> Teardown>>,
        teardowns: Vec<Teardown>,
        mounted: bool,
    }

    impl ScopeHost {
        fn enter(&mut self) {
            self.cursor = 0;
        }

        fn mount(&mut self) {
            for setup in self.pending.drain(..) {
                self.teardowns.push(setup());
            }
            self.mounted = true;
        }

        fn exit(&mut self) {
            for teardown in self.teardowns.drain(..) {
                teardown();
            }
        }
    }

    impl ViewHost for ScopeHost {
        fn use_local_slot<T: Clone + 'static>(
            &mut self,
            init: impl FnOnce() -> T,
        ) -> Rc<dyn LocalSlot<T>> {
            let index = self.cursor;
            self.cursor += 1;
            if index == self.slots.len() {
                self.slots.push(Rc::new(Rc::new(RefCell::new(init()))));
            }
            let cell = self.slots[index]
                .downcast_ref::<Rc<RefCell<T>>>()
                .expect("hook order changed between entries");
            Rc::clone(cell) as Rc<dyn LocalSlot<T>>
        }

        fn on_mount(&mut self, setup: Box<dyn FnOnce() -> Teardown>) {
            if !self.mounted {
                self.pending.push(setup);
            }
        }
    }

    #[test]
    fn bind_state_tracks_updates_until_exit() {
        let a = atom(1);
        let mut host = ScopeHost::default();

        host.enter();
        let (value, set) = a.bind_state(&mut host);
        assert_eq!(value, 1);
        host.mount();
        assert_eq!(a.subscriber_counts().value, 1);

        set.set(2);
        host.enter();
        let (value, _) = a.bind_state(&mut host);
        assert_eq!(value, 2);
        assert_eq!(a.subscriber_counts().value, 1, "re-entry does not resubscribe");

        host.exit();
        assert_eq!(a.subscriber_counts().total(), 0);
        set.set(3);
        host.enter();
        let (value, _) = a.bind_state(&mut host);
        assert_eq!(value, 2);
    }

    #[test]
    fn mount_refreshes_slot_after_missed_update() {
        let a = atom(1);
        let mut host = ScopeHost::default();
        host.enter();
        let (value, _) = a.bind_state(&mut host);
        assert_eq!(value, 1);

        a.set(5);
        host.mount();
        host.enter();
        let (value, _) = a.bind_state(&mut host);
        assert_eq!(value, 5);
    }

    #[test]
    fn bind_reducer_reconciles_external_set() {
        let a = atom(0);
        let mut host = ScopeHost::default();
        host.enter();
        let (_, dispatch) = a.bind_reducer(&mut host, |s: &i32, n: &i32| s + n);
        host.mount();

        dispatch.dispatch(4);
        a.set(10);
        dispatch.dispatch(1);

        host.enter();
        let (value, _) = a.bind_reducer(&mut host, |s: &i32, n: &i32| s + n);
        assert_eq!(value, 11);
        assert_eq!(a.get(), 11);
        host.exit();
        assert_eq!(a.subscriber_counts().dispatch, 0);
    }

    #[test]
    fn refcell_slot() {
        let slot = RefCell::new(String::from("a"));
        LocalSlot::set(&slot, String::from("b"));
        assert_eq!(LocalSlot::get(&slot), "b");
    }

    #[test]
    fn subscribe_slot_copies_values() {
        let a = atom(0);
        let slot = Rc::new(RefCell::new(0));
        let _sub = a.subscribe_slot(slot.clone());
        a.set(8);
        assert_eq!(*slot.borrow(), 8);
    }
}
