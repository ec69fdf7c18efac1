#![forbid(unsafe_code)]

//! Fault reporting for subscriber callbacks.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Updater panic | `set(SetStateAction::Update(f))` where `f` panics | Propagates to caller; no mutation, no broadcast |
//! | Reducer panic | reducer passed to `dispatch_with` panics | Propagates to caller; no mutation, dispatch-subscribers re-synced to the committed value |
//! | Subscriber panic | callback panics during broadcast | Caught, logged, counted; broadcast continues |
//! | Post-destroy update | `set`/`dispatch` after `destroy()` | Value committed; nobody notified |
//! | Stale unsubscribe | id already removed or cleared | No-op |

use std::any::Any;
use std::fmt;

use crate::registry::Channel;

/// A subscriber callback panicked during broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFault {
    /// Registry the callback was notified through.
    pub channel: Channel,
    /// Atom version observed when the fault was caught.
    pub version: u64,
    /// Panic message, or `"unknown panic"` for non-string payloads.
    pub message: String,
}

impl SubscriberFault {
    pub(crate) fn from_panic(
        channel: Channel,
        version: u64,
        payload: &(dyn Any + Send),
    ) -> Self {
        Self {
            channel,
            version,
            message: panic_message(payload),
        }
    }
}

impl fmt::Display for SubscriberFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriber panicked at version {}: {}",
            self.channel, self.version, self.message
        )
    }
}

impl std::error::Error for SubscriberFault {}

/// Best-effort extraction of a panic message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
