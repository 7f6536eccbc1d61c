//! Native host boundary
//!
//! Tree mutations leave the engine as [`NativeCall`]s. The [`Listener`] owned
//! by a document either forwards each call to the [`NativeHost`] right away or
//! queues them until [`Listener::flush`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

/// Answer from the host after a dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Signal {
    #[default]
    Continue,
    /// The host wants the instance to stop producing work
    Abort,
}

impl Signal {
    #[inline]
    pub fn is_abort(self) -> bool {
        self == Signal::Abort
    }
}

/// Tree actions understood by the host's `dom` module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomAction {
    CreateBody,
    AddElement,
    RemoveElement,
    MoveElement,
    UpdateAttrs,
    UpdateStyle,
    AddEvent,
    RemoveEvent,
}

impl DomAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DomAction::CreateBody => "createBody",
            DomAction::AddElement => "addElement",
            DomAction::RemoveElement => "removeElement",
            DomAction::MoveElement => "moveElement",
            DomAction::UpdateAttrs => "updateAttrs",
            DomAction::UpdateStyle => "updateStyle",
            DomAction::AddEvent => "addEvent",
            DomAction::RemoveEvent => "removeEvent",
        }
    }
}

impl fmt::Display for DomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message to the native host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeCall {
    pub module: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl NativeCall {
    pub fn new(module: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            args,
        }
    }

    /// A `dom` module call
    pub fn dom(action: DomAction, args: Vec<Value>) -> Self {
        Self::new("dom", action.as_str(), args)
    }

    /// Whether this is the given tree action
    pub fn is(&self, action: DomAction) -> bool {
        self.module == "dom" && self.method == action.as_str()
    }
}

/// Receiver of native calls (the renderer side)
pub trait NativeHost {
    /// Handle one call for the instance `instance_id`
    fn dispatch(&self, instance_id: &str, call: &NativeCall) -> Signal;

    /// Handle several calls at once. The default sends them one by one and
    /// stops at the first abort.
    fn dispatch_batch(&self, instance_id: &str, calls: &[NativeCall]) -> Signal {
        for call in calls {
            if self.dispatch(instance_id, call).is_abort() {
                return Signal::Abort;
            }
        }
        Signal::Continue
    }
}

/// Per-document outbox
pub struct Listener {
    instance_id: String,
    host: Rc<dyn NativeHost>,
    batched: bool,
    queue: Vec<NativeCall>,
    last_signal: Signal,
}

impl Listener {
    pub fn new(instance_id: impl Into<String>, host: Rc<dyn NativeHost>) -> Self {
        Self {
            instance_id: instance_id.into(),
            host,
            batched: false,
            queue: Vec::new(),
            last_signal: Signal::Continue,
        }
    }

    /// Queue calls until [`flush`](Self::flush) instead of sending each
    pub fn with_batching(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Signal returned by the host for the most recent dispatch
    pub fn last_signal(&self) -> Signal {
        self.last_signal
    }

    /// Number of calls waiting for a flush
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn send(&mut self, call: NativeCall) -> Signal {
        if self.batched {
            self.queue.push(call);
            return self.last_signal;
        }
        tracing::trace!(module = %call.module, method = %call.method, "native call");
        self.last_signal = self.host.dispatch(&self.instance_id, &call);
        self.last_signal
    }

    /// Send every queued call in one batch
    pub fn flush(&mut self) -> Signal {
        if self.queue.is_empty() {
            return self.last_signal;
        }
        let calls = std::mem::take(&mut self.queue);
        tracing::trace!(count = calls.len(), "flushing native calls");
        self.last_signal = self.host.dispatch_batch(&self.instance_id, &calls);
        self.last_signal
    }

    /// Force the abort signal, used when the instance is being torn down
    pub fn abort(&mut self) {
        self.queue.clear();
        self.last_signal = Signal::Abort;
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("instance_id", &self.instance_id)
            .field("batched", &self.batched)
            .field("pending", &self.queue.len())
            .field("last_signal", &self.last_signal)
            .finish()
    }
}

/// Host that records every call, for tests and tooling
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    calls: Rc<RefCell<Vec<NativeCall>>>,
    abort_after: Option<usize>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `Signal::Abort` once `count` calls have been recorded
    pub fn abort_after(mut self, count: usize) -> Self {
        self.abort_after = Some(count);
        self
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.borrow().clone()
    }

    /// Drain the log
    pub fn take(&self) -> Vec<NativeCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Method names in order, e.g. `["createBody", "addElement"]`
    pub fn methods(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.method.clone()).collect()
    }

    /// Recorded calls of one tree action
    pub fn calls_for(&self, action: DomAction) -> Vec<NativeCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.is(action))
            .cloned()
            .collect()
    }

    pub fn count(&self, action: DomAction) -> usize {
        self.calls.borrow().iter().filter(|c| c.is(action)).count()
    }
}

impl NativeHost for RecordingHost {
    fn dispatch(&self, _instance_id: &str, call: &NativeCall) -> Signal {
        let mut calls = self.calls.borrow_mut();
        calls.push(call.clone());
        match self.abort_after {
            Some(limit) if calls.len() >= limit => Signal::Abort,
            _ => Signal::Continue,
        }
    }
}
