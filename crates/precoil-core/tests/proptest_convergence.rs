//! Property-based tests for atom convergence.
//!
//! **Atom store:**
//! 1. Every value-subscriber and every reducer-subscriber ends each sequence
//!    holding the committed value.
//! 2. Updaters issued back to back each see the previous commit.
//! 3. A subscription released before any update never fires.
//! 4. User reducers never run for externally set values.
//! 5. After destroy, updates keep committing but reach no old subscriber.
//! 6. Every subscriber sees every commit exactly once, in commit order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use precoil_core::{Atom, ReducerAdapter, SetStateAction, Subscription, atom};
use proptest::prelude::*;

// ── Model ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Add(i64),
    Increment,
    Reset,
}

fn reduce(state: &i64, action: &Action) -> i64 {
    match action {
        Action::Add(n) => state.wrapping_add(*n),
        Action::Increment => state.wrapping_add(1),
        Action::Reset => 0,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Set(i64),
    Update(i64),
    Dispatch(Action),
}

fn apply(a: &Atom<i64>, adapter: &ReducerAdapter<i64, Action>, op: &Op) {
    match op {
        Op::Set(v) => a.set(*v),
        Op::Update(delta) => {
            let delta = *delta;
            a.set(SetStateAction::with(move |v: &i64| v.wrapping_add(delta)));
        }
        Op::Dispatch(action) => adapter.dispatch(a, action.clone()),
    }
}

// ── Strategies ────────────────────────────────────────────────────────────

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (-1000i64..=1000).prop_map(Action::Add),
        Just(Action::Increment),
        Just(Action::Reset),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-1000i64..=1000).prop_map(Op::Set),
        (-50i64..=50).prop_map(Op::Update),
        action_strategy().prop_map(Op::Dispatch),
    ]
}

fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 0..=max_len)
}

struct Bound {
    value_slots: Vec<Rc<RefCell<i64>>>,
    reducer_slots: Vec<Rc<RefCell<i64>>>,
    _subs: Vec<Subscription>,
}

fn bind(a: &Atom<i64>, adapter: &ReducerAdapter<i64, Action>, values: usize, reducers: usize) -> Bound {
    let mut subs = Vec::new();
    let value_slots: Vec<_> = (0..values)
        .map(|_| {
            let slot = Rc::new(RefCell::new(a.get()));
            subs.push(a.subscribe_slot(slot.clone()));
            slot
        })
        .collect();
    let reducer_slots: Vec<_> = (0..reducers)
        .map(|_| {
            let slot = Rc::new(RefCell::new(a.get()));
            subs.push(adapter.subscribe(a, slot.clone()));
            slot
        })
        .collect();
    Bound {
        value_slots,
        reducer_slots,
        _subs: subs,
    }
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn all_bindings_converge(
        initial in -100i64..=100,
        ops in ops_strategy(40),
        values in 0usize..=4,
        reducers in 0usize..=4,
    ) {
        let a = atom(initial);
        let adapter = ReducerAdapter::new(reduce);
        let bound = bind(&a, &adapter, values, reducers);

        for op in &ops {
            apply(&a, &adapter, op);
            let committed = a.get();
            for slot in bound.value_slots.iter().chain(&bound.reducer_slots) {
                prop_assert_eq!(*slot.borrow(), committed);
            }
        }
        prop_assert_eq!(a.version(), ops.len() as u64);
    }

    #[test]
    fn back_to_back_updaters_accumulate(start in -1000i64..=1000, n in 0usize..=30) {
        let a = atom(start);
        for _ in 0..n {
            a.set(SetStateAction::with(|v: &i64| v + 1));
        }
        prop_assert_eq!(a.get(), start + n as i64);
    }

    #[test]
    fn released_subscription_never_fires(ops in ops_strategy(20)) {
        let a = atom(0i64);
        let adapter = ReducerAdapter::new(reduce);
        let hits = Rc::new(Cell::new(0u32));

        let h = Rc::clone(&hits);
        let mut observer = a.subscribe(move |_| h.set(h.get() + 1));
        let h = Rc::clone(&hits);
        let mut value = a.subscribe_value(move |_| h.set(h.get() + 1));
        let h = Rc::clone(&hits);
        let mut dispatch = a.subscribe_dispatch(move |_| h.set(h.get() + 1));
        observer.unsubscribe();
        value.unsubscribe();
        dispatch.unsubscribe();

        for op in &ops {
            apply(&a, &adapter, op);
        }
        prop_assert_eq!(hits.get(), 0);
    }

    #[test]
    fn sets_never_reach_user_reducer(values in proptest::collection::vec(-500i64..=500, 1..20)) {
        let a = atom(0i64);
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        let adapter = ReducerAdapter::new(move |s: &i64, act: &Action| {
            c.set(c.get() + 1);
            reduce(s, act)
        });
        let slot = Rc::new(RefCell::new(a.get()));
        let _sub = adapter.subscribe(&a, slot.clone());

        for v in &values {
            a.set(*v);
            prop_assert_eq!(*slot.borrow(), *v);
        }
        prop_assert_eq!(calls.get(), 0);
    }

    #[test]
    fn destroy_freezes_notification_not_mutation(
        before in ops_strategy(10),
        after in ops_strategy(10),
    ) {
        let a = atom(0i64);
        let adapter = ReducerAdapter::new(reduce);
        let bound = bind(&a, &adapter, 2, 2);

        for op in &before {
            apply(&a, &adapter, op);
        }
        let frozen = a.get();
        a.destroy();

        let mut expected = frozen;
        for op in &after {
            apply(&a, &adapter, op);
            expected = match op {
                Op::Set(v) => *v,
                Op::Update(d) => expected.wrapping_add(*d),
                Op::Dispatch(act) => reduce(&expected, act),
            };
        }
        prop_assert_eq!(a.get(), expected);
        for slot in bound.value_slots.iter().chain(&bound.reducer_slots) {
            prop_assert_eq!(*slot.borrow(), frozen);
        }

        let fresh = bind(&a, &adapter, 1, 1);
        prop_assert_eq!(*fresh.value_slots[0].borrow(), expected);
        apply(&a, &adapter, &Op::Dispatch(Action::Increment));
        prop_assert_eq!(*fresh.value_slots[0].borrow(), a.get());
        prop_assert_eq!(*fresh.reducer_slots[0].borrow(), a.get());
    }

    #[test]
    fn every_commit_seen_once_in_order(ops in ops_strategy(30)) {
        let a = atom(0i64);
        let adapter = ReducerAdapter::new(reduce);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let committed = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&seen);
        let _value = a.subscribe_value(move |v| s.borrow_mut().push(*v));

        for op in &ops {
            apply(&a, &adapter, op);
            committed.borrow_mut().push(a.get());
        }
        prop_assert_eq!(&*seen.borrow(), &*committed.borrow());
    }
}
