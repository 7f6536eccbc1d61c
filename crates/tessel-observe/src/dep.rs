//! Dependency edges
//!
//! A [`Dep`] is one observable slot: a key of an object, the contents of an
//! array, or the key set of an object. Reads performed while a watcher is
//! evaluating register that watcher as a subscriber; writes notify every live
//! subscriber synchronously.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::watcher::WatcherInner;

thread_local! {
    /// Stack of watchers currently evaluating. `None` entries mask tracking.
    static TARGET_STACK: RefCell<Vec<Option<Rc<WatcherInner>>>> = const { RefCell::new(Vec::new()) };
    static NEXT_DEP_ID: Cell<u64> = const { Cell::new(1) };
}

/// Observable slot with a list of subscribed watchers
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

struct DepInner {
    id: u64,
    subs: RefCell<Vec<Weak<WatcherInner>>>,
}

impl Dep {
    /// Create a new dependency with no subscribers
    pub fn new() -> Self {
        let id = NEXT_DEP_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self(Rc::new(DepInner {
            id,
            subs: RefCell::new(Vec::new()),
        }))
    }

    /// Unique id of this dependency
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Register the currently evaluating watcher (if any) as a subscriber
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            WatcherInner::add_dep(&target, self);
        }
    }

    /// Notify every live subscriber
    ///
    /// Lazy (computed) watchers are marked dirty before any eager watcher
    /// re-evaluates, so eager getters never observe a stale memoized value.
    pub fn notify(&self) {
        let mut subs: Vec<Rc<WatcherInner>> = {
            let mut subs = self.0.subs.borrow_mut();
            subs.retain(|s| s.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        subs.sort_by_key(|s| !s.is_lazy());
        for sub in subs {
            WatcherInner::update(&sub);
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().iter().filter(|s| s.strong_count() > 0).count()
    }

    pub(crate) fn add_sub(&self, watcher: &Rc<WatcherInner>) {
        self.0.subs.borrow_mut().push(Rc::downgrade(watcher));
    }

    pub(crate) fn remove_sub(&self, watcher: &WatcherInner) {
        let target: *const WatcherInner = watcher;
        self.0
            .subs
            .borrow_mut()
            .retain(|s| s.strong_count() > 0 && !std::ptr::eq(s.as_ptr(), target));
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Pops the target stack when dropped, even if the getter panicked
pub(crate) struct TargetGuard(());

impl TargetGuard {
    pub(crate) fn push(target: Option<Rc<WatcherInner>>) -> Self {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        TargetGuard(())
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The watcher currently collecting dependencies, if any
pub(crate) fn current_target() -> Option<Rc<WatcherInner>> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Whether a read right now would record a dependency
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Run `f` without recording any dependency for the enclosing watcher
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TargetGuard::push(None);
    f()
}
