//! Observed objects
//!
//! Every key owns a lazily created [`Dep`]; the object as a whole owns one
//! more for changes to its key set. Writes that leave a key unchanged (same
//! scalar, same container) are dropped without notifying anyone.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::dep::{is_tracking, Dep};
use crate::Value;

/// Shared observed key/value map
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

struct ObjectInner {
    props: RefCell<BTreeMap<String, Value>>,
    deps: RefCell<HashMap<String, Dep>>,
    dep: Dep,
}

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            props: RefCell::new(BTreeMap::new()),
            deps: RefCell::new(HashMap::new()),
            dep: Dep::new(),
        }))
    }

    /// Build from key/value pairs without notifying
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let object = Self::new();
        for (key, value) in entries {
            object.insert_silent(&key.into(), value.into());
        }
        object
    }

    /// Whether two handles share the same object
    #[inline]
    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn dep(&self) -> &Dep {
        &self.0.dep
    }

    pub(crate) fn insert_silent(&self, key: &str, value: Value) {
        self.0.props.borrow_mut().insert(key.to_string(), value);
    }

    fn key_dep(&self, key: &str) -> Dep {
        self.0
            .deps
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn existing_key_dep(&self, key: &str) -> Option<Dep> {
        self.0.deps.borrow().get(key).cloned()
    }

    /// Tracked read. Missing keys read as `Null` and are still tracked, so a
    /// later `set` of that key notifies the reader.
    pub fn get(&self, key: &str) -> Value {
        if is_tracking() {
            self.key_dep(key).depend();
        }
        let value = self.0.props.borrow().get(key).cloned().unwrap_or_default();
        value.depend_contents();
        value
    }

    /// Untracked read
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.0.props.borrow().get(key).cloned()
    }

    /// Untracked key test
    pub fn has(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Write a key. Returns `false` (and notifies nobody) when the new value
    /// is the same as the current one.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let added = {
            let mut props = self.0.props.borrow_mut();
            let added = match props.get(key) {
                Some(old) if old.same(&value) => return false,
                Some(_) => false,
                None => true,
            };
            props.insert(key.to_string(), value);
            added
        };
        if let Some(dep) = self.existing_key_dep(key) {
            dep.notify();
        }
        if added {
            self.0.dep.notify();
        }
        true
    }

    /// Remove a key, notifying its readers and key-set readers
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.0.props.borrow_mut().remove(key)?;
        if let Some(dep) = self.existing_key_dep(key) {
            dep.notify();
        }
        self.0.dep.notify();
        Some(removed)
    }

    /// Tracked list of keys
    pub fn keys(&self) -> Vec<String> {
        self.0.dep.depend();
        self.0.props.borrow().keys().cloned().collect()
    }

    /// Untracked snapshot of every entry
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Tracked number of keys
    pub fn len(&self) -> usize {
        self.0.dep.depend();
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every key of a JSON object (used for merging fresh data)
    pub fn merge_json(&self, map: &serde_json::Map<String, serde_json::Value>) {
        for (key, value) in map {
            self.set(key, Value::from_json(value));
        }
    }

    /// Untracked JSON snapshot
    pub fn to_json(&self) -> serde_json::Value {
        let props = self.0.props.borrow();
        serde_json::Value::Object(
            props
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.to_json())
    }
}
