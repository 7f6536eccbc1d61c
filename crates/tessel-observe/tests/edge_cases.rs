//! Edge case tests for tessel-observe
//!
//! Re-entrant writes, teardown during notification and nested tracking.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use tessel_observe::{observe_object, untracked, Array, Computed, Object, Value, Watcher, MAX_RERUNS};

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn test_callback_writing_own_dependency_is_bounded() {
    let data = Object::from_entries([("n", 0)]);
    let calls = Rc::new(Cell::new(0usize));
    let source = data.clone();
    let target = data.clone();
    let counter = calls.clone();
    let _w = Watcher::new(
        move || source.get("n"),
        move |new, _| {
            counter.set(counter.get() + 1);
            let next = new.as_f64().unwrap_or(0.0) + 1.0;
            target.set("n", next);
        },
    );
    data.set("n", 1);
    assert!(calls.get() <= MAX_RERUNS + 1);
    assert!(calls.get() > 1);
}

#[test]
fn test_callback_settling_after_one_rerun() {
    let data = Object::from_entries([("n", 0)]);
    let calls = Rc::new(Cell::new(0usize));
    let source = data.clone();
    let target = data.clone();
    let counter = calls.clone();
    let _w = Watcher::new(
        move || source.get("n"),
        move |new, _| {
            counter.set(counter.get() + 1);
            // clamp to 10 once
            if new.as_f64().unwrap_or(0.0) > 10.0 {
                target.set("n", 10);
            }
        },
    );
    data.set("n", 50);
    assert_eq!(calls.get(), 2);
    assert_eq!(data.peek("n"), Some(Value::from(10)));
}

#[test]
fn test_teardown_from_another_callback() {
    let data = Object::from_entries([("x", 0)]);
    let second_calls = Rc::new(Cell::new(0));

    let source = data.clone();
    let counter = second_calls.clone();
    let second = Watcher::new(move || source.get("x"), move |_, _| counter.set(counter.get() + 1));

    let source = data.clone();
    let victim = second.clone();
    let _first = Watcher::new(move || source.get("x"), move |_, _| victim.teardown());

    data.set("x", 1);
    data.set("x", 2);
    // the second watcher fires at most for the first write
    assert!(second_calls.get() <= 1);
    assert!(!second.is_active());
}

// ============================================================================
// Containers
// ============================================================================

#[test]
fn test_container_result_always_fires() {
    let list = Array::new(vec![Value::from(1)]);
    let holder = Object::new();
    holder.set("list", list.clone());
    let calls = Rc::new(Cell::new(0));
    let source = holder.clone();
    let counter = calls.clone();
    let _w = Watcher::new(move || source.get("list"), move |_, _| counter.set(counter.get() + 1));
    list.push(2);
    list.set(0, 7);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_replacing_array_reference_fires() {
    let data = observe_object(&json!({"items": [1, 2]}));
    let lengths = Rc::new(RefCell::new(Vec::new()));
    let source = data.clone();
    let log = lengths.clone();
    let _w = Watcher::new(
        move || source.get("items").get("length"),
        move |new, _| log.borrow_mut().push(new.clone()),
    );
    data.set("items", Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]));
    assert_eq!(*lengths.borrow(), vec![Value::from(3)]);
}

#[test]
fn test_key_set_readers_see_new_keys() {
    let data = Object::new();
    let source = data.clone();
    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    let _w = Watcher::new(move || Value::from(source.keys().len()), move |_, _| counter.set(counter.get() + 1));
    data.set("a", 1);
    // existing key: key set unchanged
    data.set("a", 2);
    assert_eq!(seen.get(), 1);
}

// ============================================================================
// Tracking scope
// ============================================================================

#[test]
fn test_untracked_reads_are_not_dependencies() {
    let data = Object::from_entries([("a", 1), ("b", 2)]);
    let source = data.clone();
    let watcher = Watcher::new(
        move || {
            let a = source.get("a");
            let _ = untracked(|| source.get("b"));
            a
        },
        |_, _| {},
    );
    assert_eq!(watcher.dependency_count(), 1);
}

#[test]
fn test_nested_computed_chain() {
    let data = Object::from_entries([("n", 1)]);
    let source = data.clone();
    let double = Computed::new(move || Value::from(source.get("n").as_f64().unwrap_or(0.0) * 2.0));
    let inner = double.clone();
    let quad = Computed::new(move || Value::from(inner.get().as_f64().unwrap_or(0.0) * 2.0));
    assert_eq!(quad.get(), Value::from(4));
    data.set("n", 3);
    assert_eq!(quad.get(), Value::from(12));
}

#[test]
fn test_torn_down_computed_reads_null() {
    let computed = Computed::new(|| Value::from("x"));
    assert_eq!(computed.get(), Value::from("x"));
    computed.teardown();
    assert!(computed.get().is_null());
}
