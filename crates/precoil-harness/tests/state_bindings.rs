//! Text inputs and counters bound through the value pathway.

use precoil_core::{Atom, SetState, atom, atom_empty};
use precoil_harness::Component;

struct Field<T> {
    value: T,
    set: SetState<T>,
}

fn input(text: &Atom<Option<String>>) -> Component<Field<Option<String>>> {
    let text = text.clone();
    Component::mount("Input", move |scope| {
        let (value, set) = text.bind_state(scope);
        Field { value, set }
    })
}

fn label(
    name: &'static str,
    text: &Atom<Option<String>>,
    render: fn(&str) -> String,
) -> Component<String> {
    let text = text.clone();
    Component::mount(name, move |scope| {
        let (value, _) = text.bind_state(scope);
        value.as_deref().map(render).unwrap_or_default()
    })
}

#[test]
fn typed_text_reaches_every_binding() {
    let text = atom_empty::<String>();
    let mut field = input(&text);
    let mut mirror = label("MirrorInput", &text, str::to_owned);
    let mut upper = label("UpperCaseInput", &text, str::to_uppercase);

    assert_eq!(field.view().value, None);
    assert_eq!(mirror.view(), "");
    assert_eq!(upper.view(), "");

    field.view().set.set(Some("hi".to_owned()));
    assert_eq!(field.view().value.as_deref(), Some("hi"));
    assert_eq!(mirror.view(), "hi");
    assert_eq!(upper.view(), "HI");
}

#[test]
fn initial_value_is_shown_then_replaced() {
    let text = atom(String::from("I am a default value"));
    let bound = text.clone();
    let mut field = Component::mount("InputWithDefault", move |scope| {
        let (value, set) = bound.bind_state(scope);
        Field { value, set }
    });
    assert_eq!(field.view().value, "I am a default value");

    field.view().set.set(String::from("Now I am changed"));
    assert_eq!(field.view().value, "Now I am changed");
    assert_eq!(text.get(), "Now I am changed");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Count {
    count: i64,
}

#[test]
fn functional_setter_and_identity_reducer_mirror() {
    let store = atom(Count::default());

    let bound = store.clone();
    let mut counter = Component::mount("Counter", move |scope| {
        let (state, set) = bound.bind_state(scope);
        Field { value: state, set }
    });
    let bound = store.clone();
    let mut mirror = Component::mount("MirrorCounter", move |scope| {
        let (state, _) = bound.bind_reducer(scope, |prev: &Count, _: &()| *prev);
        state.count
    });

    let typed = |counter: &mut Component<Field<Count>>, n: i64| {
        counter.view().set.update(move |c| Count { count: c.count + n });
    };

    assert_eq!(counter.view().value.count, 0);
    assert_eq!(*mirror.view(), 0);

    typed(&mut counter, 1);
    assert_eq!(counter.view().value.count, 1);
    assert_eq!(*mirror.view(), 1);

    typed(&mut counter, 2);
    assert_eq!(counter.view().value.count, 3);
    assert_eq!(*mirror.view(), 3);

    counter.view().set.set(Count { count: 0 });
    assert_eq!(counter.view().value.count, 0);
    assert_eq!(*mirror.view(), 0);
}

#[test]
fn updaters_in_one_handler_accumulate() {
    let store = atom(0i64);
    let bound = store.clone();
    let mut view = Component::mount("Burst", move |scope| bound.bind_state(scope));

    let (_, set) = view.view();
    let set = set.clone();
    set.update(|c| c + 1);
    set.update(|c| c + 1);
    set.update(|c| c + 1);
    assert_eq!(view.view().0, 3);
}

#[test]
fn mount_sees_update_made_during_first_render() {
    let store = atom(0i64);
    let bound = store.clone();
    let mut view = Component::mount("Eager", move |scope| {
        let first = scope.is_mounting();
        let (value, set) = bound.bind_state(scope);
        if first {
            // Commits before this component's subscription exists.
            set.set(42);
        }
        value
    });
    assert_eq!(*view.last_output(), 0);
    assert!(view.is_dirty());
    assert_eq!(*view.view(), 42);
}
