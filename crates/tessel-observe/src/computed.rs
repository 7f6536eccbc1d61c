//! Computed values
//!
//! A computed value is a lazy watcher: notifications only mark it dirty, and
//! the getter re-runs on the next read. Readers inherit its dependencies so
//! they are notified by the same writes that dirty it.

use std::fmt;
use std::rc::Rc;

use crate::dep::current_target;
use crate::watcher::WatcherInner;
use crate::Value;

/// Memoized derived value
#[derive(Clone)]
pub struct Computed(Rc<WatcherInner>);

impl Computed {
    /// Create a computed value. The getter does not run until the first read.
    pub fn new(getter: impl Fn() -> Value + 'static) -> Self {
        Self(WatcherInner::new(Rc::new(getter), None, true))
    }

    /// Current value, re-evaluating first if a dependency changed
    pub fn get(&self) -> Value {
        if !self.0.is_active() {
            return Value::Null;
        }
        if self.0.dirty.get() {
            let value = WatcherInner::evaluate(&self.0);
            self.0.value.replace(value);
            self.0.dirty.set(false);
        }
        if current_target().is_some() {
            let deps = self.0.deps.borrow().clone();
            for dep in deps {
                dep.depend();
            }
        }
        self.0.value.borrow().clone()
    }

    /// Whether the next read will re-run the getter
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    /// Release the getter and every dependency edge
    pub fn teardown(&self) {
        self.0.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("active", &self.0.is_active())
            .finish()
    }
}
