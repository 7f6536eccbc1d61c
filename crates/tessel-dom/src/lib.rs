//! Tessel DOM - virtual element tree
//!
//! Arena-allocated tree of elements and comment markers mirrored to a native
//! renderer. Every structural or attribute change made on a node connected to
//! the document root is turned into one ordered [`NativeCall`] and handed to
//! the [`Listener`].

mod document;
mod event;
mod listener;
mod node;
mod serialize;
mod style;

pub use document::{Document, UpdateMode, BODY_REF, DOCUMENT_ELEMENT_REF};
pub use event::{DomChanges, Event, EventDispatch, EventHandler};
pub use listener::{DomAction, Listener, NativeCall, NativeHost, RecordingHost, Signal};
pub use node::{AppendMode, Comment, Element, ElementKind, NativeComponent, Node, NodeData};
pub use serialize::SerializedElement;
pub use style::{resolve_cascade, StyleLayer, StyleLayers};

/// Attribute or style map as sent over the wire
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Deferred teardown work attached to a node
pub type Cleanup = Box<dyn FnOnce()>;

/// Node identifier: arena slot plus the generation of its occupant
///
/// Slots of destroyed nodes are reused; an id kept past its node's
/// destruction carries an older generation and no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl NodeId {
    /// The document root element
    pub const DOCUMENT_ELEMENT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}@{}", self.index, generation),
        }
    }
}

/// Tree operation error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
    #[error("Node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("Node {node} is already attached to {parent}")]
    AlreadyAttached { node: NodeId, parent: NodeId },
    #[error("Node {node} is not a child of {parent}")]
    NotAChild { node: NodeId, parent: NodeId },
    #[error("Inserting {node} under {parent} would create a cycle")]
    Cycle { node: NodeId, parent: NodeId },
    #[error("Element <{tag}> has no native method `{method}`")]
    UnknownMethod { tag: String, method: String },
}
