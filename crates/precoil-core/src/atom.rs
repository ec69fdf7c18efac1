#![forbid(unsafe_code)]

//! The atom store: one shared value, three subscriber registries.
//!
//! # Design
//!
//! [`Atom<T>`] keeps its value and registries in shared, reference-counted
//! storage (`Rc<..>` around a `RefCell`). Cloning a handle shares the same
//! state; the allocation itself is the atom's identity.
//!
//! Every update runs one synchronous *cycle*. For [`set()`](Atom::set):
//!
//! ```text
//!  value-subscribers ──▶ dispatch-subscribers (Sync) ──▶ commit ──▶ observers
//! ```
//!
//! For [`dispatch_with()`](Atom::dispatch_with):
//!
//! ```text
//!  dispatch-subscribers (Action) ──▶ reducer ──▶ deferred sites (Sync)
//!      ──▶ value-subscribers ──▶ commit ──▶ observers
//! ```
//!
//! All three registries are snapshotted when the cycle starts. No borrow of
//! the inner state is held while user code runs, so callbacks may read,
//! update, subscribe, unsubscribe or destroy re-entrantly. A nested update
//! runs its own full cycle before the outer one resumes over its snapshot.
//! Subscribers the nested cycle reached after they had already seen the
//! outer value get the outer value again right after the outer commit.
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 per committed update, including
//!    updates made after [`destroy()`](Atom::destroy).
//! 2. Every subscriber in the snapshot is called in registration order on
//!    each pass of a cycle.
//! 3. An updater that panics leaves the atom untouched and notifies nobody.
//!    A reducer that panics leaves the atom untouched; dispatch-subscribers
//!    that already saw the action get the committed value back.
//! 4. A panicking subscriber never stops the cycle (see [`FaultPolicy`]).
//! 5. Once the outermost cycle returns, every value-subscriber and
//!    dispatch-subscriber of its snapshot last saw the committed value.
//!
//! # Performance
//!
//! | Operation     | Complexity                         |
//! |---------------|------------------------------------|
//! | `get()`       | O(1) + clone of `T`                |
//! | `set()`       | O(S) where S = all subscribers     |
//! | `subscribe()` | O(S) (identity check)              |
//! | `unsubscribe` | O(S)                               |

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::config::{AtomConfig, FaultPolicy};
use crate::error::SubscriberFault;
use crate::reducer::Reconcile;
use crate::registry::{Channel, Registry, SubscriberId};

/// Callback receiving the raw next value.
pub type ValueCallback<T> = dyn Fn(&T);

/// Callback receiving reconciliation events.
pub type DispatchCallback<T> = dyn Fn(&Reconcile<'_, T>);

/// Argument to [`Atom::set`]: a replacement value or a function of the
/// current value.
pub enum SetStateAction<T> {
    /// Replace the value.
    Value(T),
    /// Compute the next value from the current committed one.
    Update(Box<dyn FnOnce(&T) -> T>),
}

impl<T> SetStateAction<T> {
    /// Wrap an updater function.
    pub fn with(f: impl FnOnce(&T) -> T + 'static) -> Self {
        Self::Update(Box::new(f))
    }
}

impl<T> From<T> for SetStateAction<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SetStateAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Update(_) => f.write_str("Update(..)"),
        }
    }
}

/// Registry sizes at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberCounts {
    /// Value-subscribers.
    pub value: usize,
    /// Dispatch-subscribers.
    pub dispatch: usize,
    /// Passive observers.
    pub observer: usize,
}

impl SubscriberCounts {
    /// Sum over all three registries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.value + self.dispatch + self.observer
    }
}

struct AtomState<T> {
    value: T,
    version: u64,
    values: Registry<ValueCallback<T>>,
    dispatches: Registry<DispatchCallback<T>>,
    observers: Registry<ValueCallback<T>>,
    faults: u64,
    last_fault: Option<SubscriberFault>,
}

impl<T> AtomState<T> {
    fn counts(&self) -> SubscriberCounts {
        SubscriberCounts {
            value: self.values.len(),
            dispatch: self.dispatches.len(),
            observer: self.observers.len(),
        }
    }
}

struct AtomShared<T> {
    config: AtomConfig,
    state: RefCell<AtomState<T>>,
}

/// Type-erased removal, so [`Subscription`] does not carry `T`.
trait Detach {
    fn remove(&self, channel: Channel, id: SubscriberId) -> bool;
    fn contains(&self, channel: Channel, id: SubscriberId) -> bool;
}

impl<T> Detach for AtomShared<T> {
    fn remove(&self, channel: Channel, id: SubscriberId) -> bool {
        let mut state = self.state.borrow_mut();
        match channel {
            Channel::Value => state.values.remove(id),
            Channel::Dispatch => state.dispatches.remove(id),
            Channel::Observer => state.observers.remove(id),
        }
    }

    fn contains(&self, channel: Channel, id: SubscriberId) -> bool {
        let state = self.state.borrow();
        match channel {
            Channel::Value => state.values.contains(id),
            Channel::Dispatch => state.dispatches.contains(id),
            Channel::Observer => state.observers.contains(id),
        }
    }
}

/// Frozen registries for one cycle.
struct Snapshot<T> {
    values: Vec<Rc<ValueCallback<T>>>,
    dispatches: Vec<Rc<DispatchCallback<T>>>,
    observers: Vec<Rc<ValueCallback<T>>>,
}

/// Faults collected during one cycle.
struct FaultLog {
    policy: FaultPolicy,
    first: Option<Box<dyn Any + Send>>,
}

impl FaultLog {
    fn new(policy: FaultPolicy) -> Self {
        Self {
            policy,
            first: None,
        }
    }

    fn record(&mut self, payload: Box<dyn Any + Send>) {
        if self.policy == FaultPolicy::Propagate && self.first.is_none() {
            self.first = Some(payload);
        }
    }

    fn finish(self) {
        if let Some(payload) = self.first {
            panic::resume_unwind(payload);
        }
    }
}

/// Which update pathway started a cycle.
#[derive(Clone, Copy)]
enum Pathway {
    Set,
    Dispatch,
}

impl Pathway {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Dispatch => "dispatch",
        }
    }
}

/// Bookkeeping for one update cycle. Indices refer to snapshot positions.
struct Cycle<T> {
    snapshot: Snapshot<T>,
    faults: FaultLog,
    /// Version as of the last check for nested commits.
    seen: u64,
    delivered_values: Vec<usize>,
    delivered_dispatches: Vec<usize>,
    stale_values: Vec<usize>,
    stale_dispatches: Vec<usize>,
}

/// A shared unit of state with value, dispatch and observer subscribers.
///
/// Cloning an `Atom` creates a new handle to the **same** state.
///
/// # Invariants
///
/// 1. At any quiescent point every bound value-subscriber and every bound
///    reducer-subscriber holds the committed value.
/// 2. The value outlives [`destroy()`](Self::destroy); only subscriptions
///    are dropped.
pub struct Atom<T> {
    inner: Rc<AtomShared<T>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Atom")
            .field("label", &self.inner.config.label)
            .field("value", &state.value)
            .field("version", &state.version)
            .field("subscribers", &state.counts())
            .finish()
    }
}

impl<T: Clone + Default + 'static> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Create an atom holding `initial`.
#[must_use]
pub fn atom<T: Clone + 'static>(initial: T) -> Atom<T> {
    Atom::new(initial)
}

/// Create an atom holding `T::default()`.
#[must_use]
pub fn atom_default<T: Clone + Default + 'static>() -> Atom<T> {
    Atom::default()
}

/// Create an atom with no initial value.
#[must_use]
pub fn atom_empty<T: Clone + 'static>() -> Atom<Option<T>> {
    Atom::new(None)
}

impl<T: Clone + 'static> Atom<T> {
    /// Create an atom with the default configuration.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(value, AtomConfig::default())
    }

    /// Create an atom with an explicit configuration.
    #[must_use]
    pub fn with_config(value: T, config: AtomConfig) -> Self {
        Self {
            inner: Rc::new(AtomShared {
                config,
                state: RefCell::new(AtomState {
                    value,
                    version: 0,
                    values: Registry::new(),
                    dispatches: Registry::new(),
                    observers: Registry::new(),
                    faults: 0,
                    last_fault: None,
                }),
            }),
        }
    }

    /// Clone of the committed value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.state.borrow().value.clone()
    }

    /// Access the committed value by reference.
    ///
    /// # Panics
    ///
    /// Panics if `f` updates this atom.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow().value)
    }

    /// Replace the value, or derive it from the committed one.
    ///
    /// An updater is evaluated against the shared committed value before any
    /// notification; if it panics the panic reaches the caller and nothing
    /// changes.
    pub fn set(&self, next: impl Into<SetStateAction<T>>) {
        let next = match next.into() {
            SetStateAction::Value(value) => value,
            SetStateAction::Update(f) => {
                let current = self.get();
                f(&current)
            }
        };
        self.run_set(next);
    }

    /// Derive the next value from the committed one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get();
        let next = f(&current);
        self.run_set(next);
    }

    /// Like [`update()`](Self::update) with a fallible updater. On `Err`
    /// the atom is untouched and nobody is notified.
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> Result<T, E>) -> Result<(), E> {
        let current = self.get();
        let next = f(&current)?;
        self.run_set(next);
        Ok(())
    }

    /// Forward `action` to every dispatch-subscriber, then apply it through
    /// `reducer` to the value committed at that point and broadcast the
    /// result.
    ///
    /// Reducer bindings run the action through their own reducer. Those that
    /// [defer](crate::Dispatched::defer) it, or whose copy a nested update
    /// overwrote meanwhile, get the reduced value as a follow-up sync event.
    /// Value-subscribers and observers receive the reduced value.
    ///
    /// If `reducer` panics, nothing is committed: dispatch-subscribers get a
    /// sync event with the committed value and the panic reaches the caller.
    pub fn dispatch_with<A: 'static>(&self, reducer: impl FnOnce(&T, &A) -> T, action: A) {
        let mut cycle = self.begin_cycle();
        let defer = Cell::new(false);
        let mut deferred = Vec::new();
        {
            let event = Reconcile::action(&action, &defer);
            for index in 0..cycle.snapshot.dispatches.len() {
                defer.set(false);
                self.send_dispatch(&mut cycle, index, &event);
                if defer.get() {
                    deferred.push(index);
                }
            }
        }

        let current = self.get();
        let next = match panic::catch_unwind(AssertUnwindSafe(|| reducer(&current, &action))) {
            Ok(next) => next,
            Err(payload) => {
                let event = Reconcile::sync(&current);
                for cb in &cycle.snapshot.dispatches {
                    self.deliver(Channel::Dispatch, &mut cycle.faults, || cb(&event));
                }
                panic::resume_unwind(payload);
            }
        };
        drop(current);
        self.check_nested(&mut cycle);

        deferred.append(&mut cycle.stale_dispatches);
        deferred.sort_unstable();
        deferred.dedup();
        let event = Reconcile::sync(&next);
        for index in deferred {
            self.send_dispatch(&mut cycle, index, &event);
        }
        for index in 0..cycle.snapshot.values.len() {
            self.send_value(&mut cycle, index, &next);
        }
        self.finish_cycle(next, Pathway::Dispatch, cycle);
    }

    /// Register a passive observer, notified after every commit.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_rc(Rc::new(callback))
    }

    /// [`subscribe()`](Self::subscribe) with a shared callback.
    ///
    /// Registering the same `Rc` again reuses the existing entry: both
    /// guards carry the same id, and releasing either one removes the
    /// callback for both.
    pub fn subscribe_rc(&self, callback: Rc<ValueCallback<T>>) -> Subscription {
        let id = self.inner.state.borrow_mut().observers.insert(callback);
        self.subscription(Channel::Observer, id)
    }

    /// Register a value-subscriber, notified with each next value before it
    /// is committed.
    pub fn subscribe_value(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe_value_rc(Rc::new(callback))
    }

    /// [`subscribe_value()`](Self::subscribe_value) with a shared callback.
    /// Duplicates share one entry, as in [`subscribe_rc()`](Self::subscribe_rc).
    pub fn subscribe_value_rc(&self, callback: Rc<ValueCallback<T>>) -> Subscription {
        let id = self.inner.state.borrow_mut().values.insert(callback);
        self.subscription(Channel::Value, id)
    }

    /// Register a dispatch-subscriber, notified with every dispatched action
    /// and with a sync event for every externally set value.
    pub fn subscribe_dispatch(
        &self,
        callback: impl Fn(&Reconcile<'_, T>) + 'static,
    ) -> Subscription {
        self.subscribe_dispatch_rc(Rc::new(callback))
    }

    /// [`subscribe_dispatch()`](Self::subscribe_dispatch) with a shared
    /// callback. Duplicates share one entry, as in
    /// [`subscribe_rc()`](Self::subscribe_rc).
    pub fn subscribe_dispatch_rc(&self, callback: Rc<DispatchCallback<T>>) -> Subscription {
        let id = self.inner.state.borrow_mut().dispatches.insert(callback);
        self.subscription(Channel::Dispatch, id)
    }

    /// Drop every subscription. The value stays readable and writable;
    /// later updates simply notify nobody. Idempotent.
    pub fn destroy(&self) {
        let cleared = {
            let mut state = self.inner.state.borrow_mut();
            let counts = state.counts();
            state.values.clear();
            state.dispatches.clear();
            state.observers.clear();
            counts
        };
        debug!(
            atom = self.label(),
            value = cleared.value,
            dispatch = cleared.dispatch,
            observer = cleared.observer,
            "atom destroyed"
        );
    }

    /// Number of committed updates so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.borrow().version
    }

    /// Current registry sizes.
    #[must_use]
    pub fn subscriber_counts(&self) -> SubscriberCounts {
        self.inner.state.borrow().counts()
    }

    /// Number of subscriber panics isolated so far.
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.inner.state.borrow().faults
    }

    /// Most recent isolated subscriber panic.
    #[must_use]
    pub fn last_fault(&self) -> Option<SubscriberFault> {
        self.inner.state.borrow().last_fault.clone()
    }

    /// Configured label, or `"atom"`.
    #[must_use]
    pub fn label(&self) -> &str {
        self.inner.config.label.as_deref().unwrap_or("atom")
    }

    /// Configuration this atom was created with.
    #[must_use]
    pub fn config(&self) -> &AtomConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same atom.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn subscription(&self, channel: Channel, id: SubscriberId) -> Subscription {
        trace!(atom = self.label(), channel = channel.as_str(), id = id.get(), "subscribe");
        let weak: Weak<AtomShared<T>> = Rc::downgrade(&self.inner);
        let weak: Weak<dyn Detach> = weak;
        Subscription {
            atom: Some(weak),
            channel,
            id,
        }
    }

    fn begin_cycle(&self) -> Cycle<T> {
        let state = self.inner.state.borrow();
        Cycle {
            snapshot: Snapshot {
                values: state.values.snapshot(),
                dispatches: state.dispatches.snapshot(),
                observers: state.observers.snapshot(),
            },
            faults: FaultLog::new(self.inner.config.fault_policy),
            seen: state.version,
            delivered_values: Vec::new(),
            delivered_dispatches: Vec::new(),
            stale_values: Vec::new(),
            stale_dispatches: Vec::new(),
        }
    }

    fn run_set(&self, next: T) {
        let mut cycle = self.begin_cycle();
        for index in 0..cycle.snapshot.values.len() {
            self.send_value(&mut cycle, index, &next);
        }
        let event = Reconcile::sync(&next);
        for index in 0..cycle.snapshot.dispatches.len() {
            self.send_dispatch(&mut cycle, index, &event);
        }
        self.finish_cycle(next, Pathway::Set, cycle);
    }

    fn send_value(&self, cycle: &mut Cycle<T>, index: usize, next: &T) {
        let cb = Rc::clone(&cycle.snapshot.values[index]);
        self.deliver(Channel::Value, &mut cycle.faults, || cb(next));
        cycle.delivered_values.push(index);
        self.check_nested(cycle);
    }

    fn send_dispatch(&self, cycle: &mut Cycle<T>, index: usize, event: &Reconcile<'_, T>) {
        let cb = Rc::clone(&cycle.snapshot.dispatches[index]);
        self.deliver(Channel::Dispatch, &mut cycle.faults, || cb(event));
        cycle.delivered_dispatches.push(index);
        self.check_nested(cycle);
    }

    /// Everyone notified before a nested commit now holds that commit's
    /// value instead of this cycle's.
    fn check_nested(&self, cycle: &mut Cycle<T>) {
        let version = self.version();
        if version != cycle.seen {
            cycle.seen = version;
            cycle.stale_values.append(&mut cycle.delivered_values);
            cycle.stale_dispatches.append(&mut cycle.delivered_dispatches);
        }
    }

    fn finish_cycle(&self, next: T, pathway: Pathway, mut cycle: Cycle<T>) {
        let version = {
            let mut state = self.inner.state.borrow_mut();
            state.value = next.clone();
            state.version += 1;
            state.version
        };
        cycle.seen = version;
        debug!(
            atom = self.label(),
            version,
            pathway = pathway.as_str(),
            value = cycle.snapshot.values.len(),
            dispatch = cycle.snapshot.dispatches.len(),
            observer = cycle.snapshot.observers.len(),
            "atom commit"
        );

        self.resync(&next, version, &mut cycle);
        for cb in &cycle.snapshot.observers {
            self.deliver(Channel::Observer, &mut cycle.faults, || cb(&next));
        }
        cycle.faults.finish();
    }

    /// Re-deliver `next` to subscribers a nested commit overwrote, unless a
    /// later commit has superseded it in turn.
    fn resync(&self, next: &T, version: u64, cycle: &mut Cycle<T>) {
        let mut values = std::mem::take(&mut cycle.stale_values);
        let mut dispatches = std::mem::take(&mut cycle.stale_dispatches);
        if values.is_empty() && dispatches.is_empty() {
            return;
        }
        values.sort_unstable();
        values.dedup();
        dispatches.sort_unstable();
        dispatches.dedup();
        debug!(
            atom = self.label(),
            version,
            value = values.len(),
            dispatch = dispatches.len(),
            "atom resync after nested commit"
        );

        for index in values {
            if self.version() != version {
                return;
            }
            let cb = Rc::clone(&cycle.snapshot.values[index]);
            self.deliver(Channel::Value, &mut cycle.faults, || cb(next));
        }
        let event = Reconcile::sync(next);
        for index in dispatches {
            if self.version() != version {
                return;
            }
            let cb = Rc::clone(&cycle.snapshot.dispatches[index]);
            self.deliver(Channel::Dispatch, &mut cycle.faults, || cb(&event));
        }
    }

    fn deliver(&self, channel: Channel, faults: &mut FaultLog, f: impl FnOnce()) {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) else {
            return;
        };
        let fault = {
            let mut state = self.inner.state.borrow_mut();
            let fault = SubscriberFault::from_panic(channel, state.version, payload.as_ref());
            state.faults += 1;
            state.last_fault = Some(fault.clone());
            fault
        };
        warn!(
            atom = self.label(),
            channel = channel.as_str(),
            version = fault.version,
            panic = %fault.message,
            "subscriber panicked; continuing broadcast"
        );
        faults.record(payload);
    }
}

/// Handle to one registered callback.
///
/// Dropping the handle unsubscribes. [`unsubscribe()`](Self::unsubscribe)
/// does the same explicitly and may be called any number of times;
/// [`detach()`](Self::detach) gives the registration up to the atom, which
/// keeps it until [`Atom::destroy`].
///
/// The handle only holds a weak reference: it never keeps the atom alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    atom: Option<Weak<dyn Detach>>,
    channel: Channel,
    id: SubscriberId,
}

impl Subscription {
    /// Remove the callback. Later calls, and calls after the atom was
    /// destroyed or dropped, are no-ops.
    pub fn unsubscribe(&mut self) {
        let Some(weak) = self.atom.take() else {
            return;
        };
        if let Some(atom) = weak.upgrade() {
            let removed = atom.remove(self.channel, self.id);
            trace!(
                channel = self.channel.as_str(),
                id = self.id.get(),
                removed,
                "unsubscribe"
            );
        }
    }

    /// Keep the callback registered for the rest of the atom's life.
    pub fn detach(mut self) {
        self.atom = None;
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.atom
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|atom| atom.contains(self.channel, self.id))
    }

    /// Registry this subscription lives in.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Entry id within that registry.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("attached", &self.atom.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
