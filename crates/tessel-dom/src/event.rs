//! Events coming back from the native host

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NodeId, Props};

type HandlerFn = dyn Fn(&Event, &[Value]);

/// Handler bound to one event type of an element, with its bound params
#[derive(Clone)]
pub struct EventHandler {
    handler: Rc<HandlerFn>,
    params: Vec<Value>,
}

impl EventHandler {
    pub fn new(handler: impl Fn(&Event, &[Value]) + 'static) -> Self {
        Self {
            handler: Rc::new(handler),
            params: Vec::new(),
        }
    }

    /// Extra arguments passed after the event object
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn call(&self, event: &Event) {
        (self.handler)(event, &self.params);
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").field("params", &self.params).finish()
    }
}

/// Event object handed to handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    /// Reference of the target element
    pub target: String,
    #[serde(skip)]
    pub target_id: Option<NodeId>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Payload from the host
    pub data: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: impl Into<String>, data: Value) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            kind: kind.into(),
            target: target.into(),
            target_id: None,
            timestamp,
            data,
        }
    }
}

/// Attribute and style values the host already applied on its side
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DomChanges {
    #[serde(default)]
    pub attrs: Props,
    #[serde(default)]
    pub style: Props,
}

impl DomChanges {
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.style.is_empty()
    }
}

/// An event resolved to its handler, ready to run once the document is no
/// longer borrowed
#[derive(Debug, Clone)]
pub struct EventDispatch {
    pub event: Event,
    pub handler: EventHandler,
}

impl EventDispatch {
    pub fn run(self) {
        self.handler.call(&self.event);
    }
}
