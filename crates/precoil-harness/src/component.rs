#![forbid(unsafe_code)]

//! Deterministic components for driving bindings in tests.
//!
//! A [`Component`] owns a render function and the hook state that function
//! builds up through [`Scope`], the harness's [`ViewHost`]. Hooks are keyed
//! by call order, as in hook-based UI runtimes: the n-th
//! `use_local_slot` call of every render gets the n-th slot.
//!
//! ```text
//! mount ──▶ render #1 ──▶ run mount setups ──▶ (slot written ⇒ dirty)
//!                                                │
//!            view() ◀── render #n ◀──────────────┘
//!
//! unmount / drop ──▶ run every teardown exactly once
//! ```
//!
//! # Invariants
//!
//! 1. Mount setups run once, right after the first render.
//! 2. Teardowns run exactly once, on [`Component::unmount`] or on drop,
//!    whichever comes first (including drops during unwinding).
//! 3. `view()` re-renders only if a slot was written since the last render.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use precoil_core::{LocalSlot, Teardown, ViewHost};
use tracing::{debug, trace};

/// Slot that marks its component dirty when written.
struct SlotCell<T> {
    value: RefCell<T>,
    dirty: Rc<Cell<bool>>,
}

impl<T: Clone> LocalSlot<T> for SlotCell<T> {
    fn get(&self) -> T {
        self.value.borrow().clone()
    }

    fn set(&self, value: T) {
        self.value.replace(value);
        self.dirty.set(true);
    }
}

#[derive(Default)]
struct Hooks {
    slots: Vec<Rc<dyn Any>>,
    pending: Vec<Box<dyn FnOnce() -> Teardown>>,
    teardowns: Vec<Teardown>,
}

/// Host handed to a component's render function.
pub struct Scope<'a> {
    hooks: &'a mut Hooks,
    dirty: &'a Rc<Cell<bool>>,
    cursor: usize,
    mounting: bool,
}

impl Scope<'_> {
    /// Whether this is the first render.
    #[must_use]
    pub fn is_mounting(&self) -> bool {
        self.mounting
    }
}

impl ViewHost for Scope<'_> {
    fn use_local_slot<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Rc<dyn LocalSlot<T>> {
        let index = self.cursor;
        self.cursor += 1;
        if index == self.hooks.slots.len() {
            let slot: Rc<SlotCell<T>> = Rc::new(SlotCell {
                value: RefCell::new(init()),
                dirty: Rc::clone(self.dirty),
            });
            self.hooks.slots.push(slot);
        }
        match Rc::clone(&self.hooks.slots[index]).downcast::<SlotCell<T>>() {
            Ok(slot) => slot,
            Err(_) => panic!("hook {index} changed type between renders"),
        }
    }

    fn on_mount(&mut self, setup: Box<dyn FnOnce() -> Teardown>) {
        if self.mounting {
            self.hooks.pending.push(setup);
        }
    }
}

/// A mounted render function with its own hook state.
pub struct Component<V> {
    name: String,
    hooks: Hooks,
    render: Box<dyn FnMut(&mut Scope<'_>) -> V>,
    output: V,
    dirty: Rc<Cell<bool>>,
    renders: u64,
    mounted: bool,
}

impl<V: fmt::Debug> fmt::Debug for Component<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("output", &self.output)
            .field("renders", &self.renders)
            .field("mounted", &self.mounted)
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

impl<V> Component<V> {
    /// Render once, then run the mount setups collected by that render.
    pub fn mount(
        name: impl Into<String>,
        mut render: impl FnMut(&mut Scope<'_>) -> V + 'static,
    ) -> Self {
        let name = name.into();
        let mut hooks = Hooks::default();
        let dirty = Rc::new(Cell::new(false));
        let output = render(&mut Scope {
            hooks: &mut hooks,
            dirty: &dirty,
            cursor: 0,
            mounting: true,
        });

        let mut component = Self {
            name,
            hooks,
            render: Box::new(render),
            output,
            dirty,
            renders: 1,
            mounted: true,
        };
        let setups = std::mem::take(&mut component.hooks.pending);
        let count = setups.len();
        for setup in setups {
            component.hooks.teardowns.push(setup());
        }
        debug!(component = %component.name, setups = count, "mount");
        component
    }

    /// Latest output, re-rendering first if a slot was written.
    pub fn view(&mut self) -> &V {
        if self.mounted && self.dirty.get() {
            self.rerender();
        }
        &self.output
    }

    /// Output of the last render, without re-rendering.
    #[must_use]
    pub fn last_output(&self) -> &V {
        &self.output
    }

    /// Render unconditionally.
    pub fn rerender(&mut self) -> &V {
        self.dirty.set(false);
        self.output = (self.render)(&mut Scope {
            hooks: &mut self.hooks,
            dirty: &self.dirty,
            cursor: 0,
            mounting: false,
        });
        self.renders += 1;
        trace!(component = %self.name, renders = self.renders, "render");
        &self.output
    }

    /// Run every teardown. Later calls are no-ops.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        let teardowns = std::mem::take(&mut self.hooks.teardowns);
        let count = teardowns.len();
        for teardown in teardowns {
            teardown();
        }
        debug!(component = %self.name, teardowns = count, "unmount");
    }

    /// Whether a slot was written since the last render.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Whether teardowns are still pending.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Number of renders so far.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V> Drop for Component<V> {
    fn drop(&mut self) {
        self.unmount();
    }
}
