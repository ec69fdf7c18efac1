#![forbid(unsafe_code)]

//! Test harness for precoil bindings.
//!
//! # Role
//! `precoil-harness` stands in for a UI runtime. It implements
//! [`precoil_core::ViewHost`] with call-order hook slots and mount/unmount
//! scopes, so binding behavior can be driven and asserted on without a real
//! renderer.
//!
//! # Contents
//! - [`Component`] / [`Scope`]: a render function plus its hook state.
//!   Writing a slot marks the component dirty; [`Component::view`]
//!   re-renders lazily.
//! - [`Recorder`]: a passive observer that logs every value it is sent.
//! - [`LogCapture`]: a `tracing` layer that stores events, for asserting on
//!   fault reports and lifecycle logging.
//!
//! # Example
//!
//! ```
//! use precoil_core::atom;
//! use precoil_harness::Component;
//!
//! let count = atom(0);
//! let bound = count.clone();
//! let mut view = Component::mount("Counter", move |scope| bound.bind_state(scope));
//!
//! view.view().1.update(|c| c + 1);
//! assert_eq!(view.view().0, 1);
//! ```

pub mod component;
pub mod logs;
pub mod recorder;

pub use component::{Component, Scope};
pub use logs::{CapturedEvent, LogCapture};
pub use recorder::Recorder;
