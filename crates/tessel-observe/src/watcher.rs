//! Watchers
//!
//! A watcher binds a getter to a callback. The getter runs once on creation to
//! collect dependencies and the initial value; every later notification
//! re-runs it, re-collects dependencies and calls the callback when the value
//! changed.
//!
//! Change detection:
//! - primitives compare by value, so an unchanged result never fires
//! - objects and arrays always fire, since their contents may have changed
//!   behind the same reference

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::dep::{Dep, TargetGuard};
use crate::Value;

/// Upper bound on re-runs caused by a callback re-triggering its own watcher
pub const MAX_RERUNS: usize = 100;

type Getter = Rc<dyn Fn() -> Value>;
type Callback = Box<dyn FnMut(&Value, &Value)>;

thread_local! {
    static NEXT_WATCHER_ID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) struct WatcherInner {
    id: u64,
    getter: RefCell<Option<Getter>>,
    callback: RefCell<Option<Callback>>,
    pub(crate) value: RefCell<Value>,
    pub(crate) deps: RefCell<Vec<Dep>>,
    new_deps: RefCell<Vec<Dep>>,
    lazy: bool,
    pub(crate) dirty: Cell<bool>,
    active: Cell<bool>,
    running: Cell<bool>,
    pending: Cell<bool>,
}

impl WatcherInner {
    pub(crate) fn new(getter: Getter, callback: Option<Callback>, lazy: bool) -> Rc<Self> {
        let id = NEXT_WATCHER_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Rc::new(Self {
            id,
            getter: RefCell::new(Some(getter)),
            callback: RefCell::new(callback),
            value: RefCell::new(Value::Null),
            deps: RefCell::new(Vec::new()),
            new_deps: RefCell::new(Vec::new()),
            lazy,
            dirty: Cell::new(lazy),
            active: Cell::new(true),
            running: Cell::new(false),
            pending: Cell::new(false),
        })
    }

    #[inline]
    pub(crate) fn is_lazy(&self) -> bool {
        self.lazy
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn add_dep(this: &Rc<Self>, dep: &Dep) {
        {
            let mut new_deps = this.new_deps.borrow_mut();
            if new_deps.iter().any(|d| d == dep) {
                return;
            }
            new_deps.push(dep.clone());
        }
        if !this.deps.borrow().iter().any(|d| d == dep) {
            dep.add_sub(this);
        }
    }

    /// Run the getter with this watcher as the tracking target
    pub(crate) fn evaluate(this: &Rc<Self>) -> Value {
        let getter = this.getter.borrow().clone();
        let Some(getter) = getter else {
            return Value::Null;
        };
        let value = {
            let _guard = TargetGuard::push(Some(this.clone()));
            getter()
        };
        this.cleanup_deps();
        value
    }

    /// Swap in the freshly collected deps and unsubscribe from stale ones
    fn cleanup_deps(&self) {
        let new_deps = std::mem::take(&mut *self.new_deps.borrow_mut());
        if !self.active.get() {
            for dep in &new_deps {
                dep.remove_sub(self);
            }
            return;
        }
        let old_deps = std::mem::replace(&mut *self.deps.borrow_mut(), new_deps);
        let deps = self.deps.borrow();
        for dep in old_deps {
            if !deps.iter().any(|d| d == &dep) {
                dep.remove_sub(self);
            }
        }
    }

    pub(crate) fn update(this: &Rc<Self>) {
        if !this.active.get() {
            return;
        }
        if this.lazy {
            this.dirty.set(true);
            return;
        }
        if this.running.get() {
            this.pending.set(true);
            return;
        }
        Self::run(this);
    }

    fn run(this: &Rc<Self>) {
        this.running.set(true);
        let mut reruns = 0;
        loop {
            this.pending.set(false);
            let value = Self::evaluate(this);
            if !this.active.get() {
                break;
            }
            let old = this.value.replace(value.clone());
            if value.is_container() || !value.same(&old) {
                let callback = this.callback.borrow_mut().take();
                if let Some(mut callback) = callback {
                    callback(&value, &old);
                    if this.active.get() {
                        let mut slot = this.callback.borrow_mut();
                        if slot.is_none() {
                            *slot = Some(callback);
                        }
                    }
                }
            }
            if !this.pending.get() || !this.active.get() {
                break;
            }
            reruns += 1;
            if reruns >= MAX_RERUNS {
                tracing::warn!(watcher = this.id, "watcher re-triggered itself {} times, giving up", reruns);
                this.pending.set(false);
                break;
            }
        }
        this.running.set(false);
    }

    pub(crate) fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            dep.remove_sub(self);
        }
        self.getter.borrow_mut().take();
        self.callback.borrow_mut().take();
        self.value.replace(Value::Null);
    }
}

/// Handle to a registered getter/callback pair
///
/// Cloning the handle shares the watcher. Dropping every handle does not tear
/// the watcher down by itself: subscriptions are weak, so it simply stops
/// receiving notifications once the last strong handle is gone.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

impl Watcher {
    /// Evaluate `getter` now, then call `callback(new, old)` whenever a
    /// dependency it read changes the result.
    pub fn new(
        getter: impl Fn() -> Value + 'static,
        callback: impl FnMut(&Value, &Value) + 'static,
    ) -> Self {
        let inner = WatcherInner::new(Rc::new(getter), Some(Box::new(callback)), false);
        let value = WatcherInner::evaluate(&inner);
        inner.value.replace(value);
        Self(inner)
    }

    /// Id, stable for the lifetime of the watcher
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Last value produced by the getter
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    /// Whether the watcher still receives notifications
    pub fn is_active(&self) -> bool {
        self.0.is_active()
    }

    /// Number of dependencies recorded by the last evaluation
    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    /// Remove every dependency edge and release the getter and callback.
    /// Idempotent.
    pub fn teardown(&self) {
        self.0.teardown();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("active", &self.0.is_active())
            .field("deps", &self.dependency_count())
            .finish()
    }
}
