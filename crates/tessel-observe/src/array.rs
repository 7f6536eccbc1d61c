//! Observed arrays
//!
//! An array has a single dependency covering its length and every element.
//! Each mutator notifies once, after the borrow on the items is released, so
//! watchers may read the array again from their callbacks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dep::Dep;
use crate::Value;

/// Shared observed list
#[derive(Clone)]
pub struct Array(Rc<ArrayInner>);

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    dep: Dep,
}

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            dep: Dep::new(),
        }))
    }

    /// Whether two handles share the same array
    #[inline]
    pub fn ptr_eq(a: &Array, b: &Array) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn dep(&self) -> &Dep {
        &self.0.dep
    }

    /// Tracked length
    pub fn len(&self) -> usize {
        self.0.dep.depend();
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked element read; out of range reads as `Null`
    pub fn get(&self, index: usize) -> Value {
        self.0.dep.depend();
        let value = self.0.items.borrow().get(index).cloned().unwrap_or_default();
        value.depend_contents();
        value
    }

    /// Tracked copy of every element
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.dep.depend();
        self.0.items.borrow().clone()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.items.borrow_mut().push(value.into());
        self.0.dep.notify();
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.0.items.borrow_mut().pop();
        if popped.is_some() {
            self.0.dep.notify();
        }
        popped
    }

    /// Insert at `index`, clamped to the current length
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.0.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, value.into());
        }
        self.0.dep.notify();
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            (index < items.len()).then(|| items.remove(index))
        };
        if removed.is_some() {
            self.0.dep.notify();
        }
        removed
    }

    /// Replace one element. Writing the same value, or an index past the end,
    /// is a no-op.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut items = self.0.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) if !slot.same(&value) => *slot = value,
                _ => return false,
            }
        }
        self.0.dep.notify();
        true
    }

    /// Swap in a whole new element list
    pub fn replace(&self, items: Vec<Value>) {
        *self.0.items.borrow_mut() = items;
        self.0.dep.notify();
    }

    pub fn truncate(&self, len: usize) {
        let changed = {
            let mut items = self.0.items.borrow_mut();
            let changed = len < items.len();
            items.truncate(len);
            changed
        };
        if changed {
            self.0.dep.notify();
        }
    }

    /// Untracked JSON snapshot
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.items.borrow().iter().map(Value::to_json).collect())
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({})", self.to_json())
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Watcher;
    use std::cell::Cell;

    fn watch_len(array: &Array) -> (Watcher, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let source = array.clone();
        let counter = calls.clone();
        let watcher = Watcher::new(
            move || Value::from(source.len()),
            move |_, _| counter.set(counter.get() + 1),
        );
        (watcher, calls)
    }

    #[test]
    fn test_push_and_pop_notify() {
        let array = Array::new(vec![Value::from(1)]);
        let (_w, calls) = watch_len(&array);
        array.push(2);
        assert_eq!(calls.get(), 1);
        array.pop();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_same_element_write_is_noop() {
        let array = Array::new(vec![Value::from("a")]);
        let seen = Rc::new(Cell::new(0));
        let source = array.clone();
        let counter = seen.clone();
        let _w = Watcher::new(move || source.get(0), move |_, _| counter.set(counter.get() + 1));
        assert!(!array.set(0, "a"));
        assert!(!array.set(5, "b"));
        assert_eq!(seen.get(), 0);
        assert!(array.set(0, "b"));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_insert_clamps_index() {
        let array = Array::new(vec![Value::from(1)]);
        array.insert(10, 2);
        assert_eq!(array.to_json(), serde_json::json!([1, 2]));
        assert!(array.remove(10).is_none());
    }

    #[test]
    fn test_truncate_only_notifies_on_change() {
        let array = Array::new(vec![Value::from(1), Value::from(2)]);
        let (_w, calls) = watch_len(&array);
        array.truncate(5);
        assert_eq!(calls.get(), 0);
        array.truncate(1);
        assert_eq!(calls.get(), 1);
    }
}
