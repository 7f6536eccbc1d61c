//! Update scheduler
//!
//! Watchers of dynamically sized regions do not touch the tree themselves;
//! they queue a handler here under `(kind, block id)`. Queuing the same key
//! again before a flush replaces the handler, so each region is updated at
//! most once per flush, with the latest value. Distinct keys run in the
//! order they were first queued.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Kind of region update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Repeat,
    Shown,
    Type,
}

type Task = Box<dyn FnOnce()>;

/// Per-instance batching queue
#[derive(Default)]
pub struct Differ {
    order: RefCell<Vec<(DiffKind, u64)>>,
    tasks: RefCell<HashMap<(DiffKind, u64), Task>>,
    hooks: RefCell<Vec<Task>>,
    flushing: Cell<bool>,
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue (or replace) the update of one region
    pub fn append(&self, kind: DiffKind, block_id: u64, task: impl FnOnce() + 'static) {
        let key = (kind, block_id);
        if self.tasks.borrow_mut().insert(key, Box::new(task)).is_none() {
            self.order.borrow_mut().push(key);
        }
    }

    /// Run `hook` once after the next flush completes
    pub fn then(&self, hook: impl FnOnce() + 'static) {
        self.hooks.borrow_mut().push(Box::new(hook));
    }

    /// Number of queued region updates
    pub fn len(&self) -> usize {
        self.order.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.borrow().is_empty()
    }

    /// Drop every queued update and hook
    pub fn clear(&self) {
        self.order.borrow_mut().clear();
        self.tasks.borrow_mut().clear();
        self.hooks.borrow_mut().clear();
    }

    /// Run queued updates. Updates queued by handlers run in further rounds,
    /// at most `max_rounds` in total; `then` hooks run at the end. Returns
    /// the number of handlers run.
    pub fn flush(&self, max_rounds: usize) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        let mut ran = 0;
        let mut rounds = 0;
        while !self.is_empty() {
            if rounds >= max_rounds {
                tracing::warn!(rounds, pending = self.len(), "differ flush round limit reached, dropping updates");
                self.order.borrow_mut().clear();
                self.tasks.borrow_mut().clear();
                break;
            }
            rounds += 1;
            let order = std::mem::take(&mut *self.order.borrow_mut());
            for key in order {
                let task = self.tasks.borrow_mut().remove(&key);
                if let Some(task) = task {
                    task();
                    ran += 1;
                }
            }
        }
        self.flushing.set(false);
        let hooks = std::mem::take(&mut *self.hooks.borrow_mut());
        for hook in hooks {
            hook();
        }
        if ran > 0 {
            tracing::trace!(ran, rounds, "differ flushed");
        }
        ran
    }
}

impl fmt::Debug for Differ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Differ")
            .field("pending", &self.order.borrow())
            .field("hooks", &self.hooks.borrow().len())
            .finish()
    }
}
