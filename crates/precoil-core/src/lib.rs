#![forbid(unsafe_code)]

//! Core: observable atoms with two converging update pathways.
//!
//! # Role in precoil
//! `precoil-core` owns shared state. An [`Atom`] is one value plus three
//! subscriber registries; views bind to it either through the value pathway
//! ([`Atom::bind_state`]) or the reducer pathway ([`Atom::bind_reducer`]),
//! and every bound view ends each update holding the same committed value.
//!
//! # Primary responsibilities
//! - **Registry**: identity-keyed, order-preserving subscriber sets with
//!   snapshot iteration.
//! - **Atom store**: `set` / `dispatch_with` / `subscribe*` / `destroy`, with
//!   a fixed broadcast order and per-callback fault isolation.
//! - **Reducer reconciliation**: folds externally set values into reducer
//!   bindings without running user reducers on them.
//! - **View binding**: the slot + mount-scope contract a host UI runtime
//!   implements, and the scoped subscriptions built on it.
//!
//! # Example
//!
//! ```
//! use precoil_core::atom;
//!
//! let count = atom(0);
//! let seen = std::rc::Rc::new(std::cell::Cell::new(0));
//! let sink = seen.clone();
//! let _sub = count.subscribe(move |v| sink.set(*v));
//!
//! count.set(5);
//! count.update(|v| v + 1);
//! assert_eq!(seen.get(), 6);
//!
//! let dispatch = count.reducer(|v: &i32, delta: &i32| v + delta);
//! dispatch.dispatch(4);
//! assert_eq!(count.get(), 10);
//! ```
//!
//! # Concurrency
//! Everything is single-threaded (`Rc`/`RefCell`). Updates run to completion
//! synchronously; callbacks may update the same atom re-entrantly.

pub mod atom;
pub mod binding;
pub mod config;
pub mod error;
pub mod reducer;
pub mod registry;

pub use atom::{
    Atom, DispatchCallback, SetStateAction, SubscriberCounts, Subscription, ValueCallback, atom,
    atom_default, atom_empty,
};
pub use binding::{LocalSlot, SetState, Teardown, ViewHost};
pub use config::{AtomConfig, FaultPolicy};
pub use error::SubscriberFault;
pub use reducer::{Dispatch, Dispatched, Reconcile, Reducer, ReducerAdapter, Synced};
pub use registry::{Channel, Registry, SubscriberId};
