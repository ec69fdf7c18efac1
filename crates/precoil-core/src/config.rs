#![forbid(unsafe_code)]

//! Per-atom configuration.

use std::borrow::Cow;

/// What to do once a broadcast has isolated a panicking subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log and count the fault, then carry on. The caller never sees it.
    #[default]
    Isolate,
    /// Log and count every fault, finish the whole update cycle (commit and
    /// passive observers included), then resume the first panic in the
    /// caller.
    Propagate,
}

/// Configuration for an [`Atom`](crate::Atom).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomConfig {
    /// Name used in log fields and `Debug` output.
    pub label: Option<Cow<'static, str>>,
    /// Subscriber fault handling.
    pub fault_policy: FaultPolicy,
}

impl AtomConfig {
    /// Default configuration: unlabelled, faults isolated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the fault policy.
    #[must_use]
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}
