//! Tree nodes
//!
//! A node is either an element (renderable, serialized to the host) or a
//! comment (a compiler marker the host never sees). Links to parent and
//! siblings are plain ids into the owning [`Document`](crate::Document)'s
//! arena; only `children` expresses ownership.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Deserialize;

use crate::event::EventHandler;
use crate::style::StyleLayers;
use crate::{Cleanup, NodeId, Props};

/// When an element's subtree is sent to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendMode {
    /// Attach first, then send every child as it is compiled
    #[default]
    Single,
    /// Compile the whole subtree detached, then send it in one message
    Tree,
}

/// Native element type registered by the host (`list`, `video`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NativeComponent {
    #[serde(rename = "type")]
    pub tag: String,
    /// Default append mode for elements of this type
    #[serde(default)]
    pub append: Option<AppendMode>,
    /// Methods callable on element instances
    #[serde(default)]
    pub methods: Vec<String>,
}

impl NativeComponent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_append(mut self, append: AppendMode) -> Self {
        self.append = Some(append);
        self
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }
}

/// What an element is, chosen by tag when it is created
#[derive(Debug, Clone, Default)]
pub enum ElementKind {
    #[default]
    Plain,
    Native(Rc<NativeComponent>),
}

impl ElementKind {
    /// Append mode requested by the kind, if any
    pub fn append(&self) -> Option<AppendMode> {
        match self {
            ElementKind::Plain => None,
            ElementKind::Native(component) => component.append,
        }
    }

    pub fn has_method(&self, method: &str) -> bool {
        match self {
            ElementKind::Plain => false,
            ElementKind::Native(component) => component.methods.iter().any(|m| m == method),
        }
    }
}

/// Element data
#[derive(Default)]
pub struct Element {
    pub(crate) tag: String,
    pub(crate) kind: ElementKind,
    pub(crate) attr: Props,
    pub(crate) style: StyleLayers,
    pub(crate) events: BTreeMap<String, EventHandler>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) pure_children: Vec<NodeId>,
    pub(crate) custom_component: bool,
    pub(crate) id: Option<String>,
}

impl Element {
    pub(crate) fn new(tag: &str, kind: ElementKind) -> Self {
        Self {
            tag: tag.to_string(),
            kind,
            ..Self::default()
        }
    }

    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[inline]
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn attr(&self) -> &Props {
        &self.attr
    }

    pub fn style(&self) -> &StyleLayers {
        &self.style
    }

    /// Every child, markers included
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Element children only, in the same relative order
    pub fn pure_children(&self) -> &[NodeId] {
        &self.pure_children
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn has_event(&self, kind: &str) -> bool {
        self.events.contains_key(kind)
    }

    pub fn is_custom_component(&self) -> bool {
        self.custom_component
    }

    /// Template id of the element, if it was given one
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Comment marker
#[derive(Debug, Clone, Default)]
pub struct Comment {
    pub(crate) text: String,
}

impl Comment {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Node-specific data
pub enum NodeData {
    Element(Element),
    Comment(Comment),
}

/// Arena entry
pub struct Node {
    pub(crate) node_ref: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) data: NodeData,
    pub(crate) cleanups: Vec<Cleanup>,
}

impl Node {
    pub(crate) fn new(node_ref: String, data: NodeData) -> Self {
        Self {
            node_ref,
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            data,
            cleanups: Vec::new(),
        }
    }

    /// Reference shared with the native host
    #[inline]
    pub fn node_ref(&self) -> &str {
        &self.node_ref
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }

    #[inline]
    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    #[inline]
    pub fn is_comment(&self) -> bool {
        matches!(self.data, NodeData::Comment(_))
    }

    #[inline]
    pub fn as_element(&self) -> Option<&Element> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            NodeData::Comment(_) => None,
        }
    }

    #[inline]
    pub(crate) fn as_element_mut(&mut self) -> Option<&mut Element> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            NodeData::Comment(_) => None,
        }
    }

    pub fn as_comment(&self) -> Option<&Comment> {
        match &self.data {
            NodeData::Comment(c) => Some(c),
            NodeData::Element(_) => None,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("ref", &self.node_ref).field("parent", &self.parent);
        match &self.data {
            NodeData::Element(e) => s.field("tag", &e.tag).field("children", &e.children),
            NodeData::Comment(c) => s.field("comment", &c.text),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_component_from_json() {
        let component: NativeComponent = serde_json::from_value(serde_json::json!({
            "type": "list",
            "append": "tree",
            "methods": ["scrollTo"]
        }))
        .unwrap();
        let kind = ElementKind::Native(Rc::new(component));
        assert_eq!(kind.append(), Some(AppendMode::Tree));
        assert!(kind.has_method("scrollTo"));
        assert!(!ElementKind::Plain.has_method("scrollTo"));
    }
}
