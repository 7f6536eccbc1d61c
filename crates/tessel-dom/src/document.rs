//! Document - arena tree and mutation protocol
//!
//! Structural operations keep three things in step: sibling links, the
//! `children` sequence and the element-only `pure_children` sequence. When the
//! parent is connected to the document root, each change to the element
//! sequence is reported to the host as exactly one message:
//! - a new element sends `addElement` with its whole subtree and its index
//!   among the parent's element children (`createBody` under the root)
//! - an element moved inside the same parent sends `moveElement` with its
//!   final index, unless the index did not change
//! - a removed element sends `removeElement`
//!
//! Subtrees built while detached send nothing until they are attached.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::event::{DomChanges, Event, EventDispatch, EventHandler};
use crate::listener::{DomAction, Listener, NativeCall, Signal};
use crate::node::{Comment, Element, ElementKind, NativeComponent, Node, NodeData};
use crate::style::StyleLayer;
use crate::{Cleanup, DomError, NodeId, Props};

/// Reference of the document root element
pub const DOCUMENT_ELEMENT_REF: &str = "_documentElement";

/// Reference of the body element
pub const BODY_REF: &str = "_root";

/// How an attribute or style write is reported
///
/// A write of an unchanged value is skipped unless `Forced`. A write that
/// does go through notifies the host unless `Silent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateMode {
    #[default]
    Normal,
    /// Install locally without a native message
    Silent,
    /// Write and notify even when the value is unchanged
    Forced,
}

#[derive(Debug, Clone, Copy)]
enum Position {
    End,
    Before(NodeId),
    After(NodeId),
}

/// Arena slot; the generation is bumped each time the slot is vacated
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Virtual element tree of one instance
pub struct Document {
    nodes: Vec<Slot>,
    /// Vacated slots, reused before the arena grows
    free: Vec<usize>,
    live: usize,
    refs: HashMap<String, NodeId>,
    body: Option<NodeId>,
    next_ref: u64,
    listener: Listener,
    natives: HashMap<String, Rc<NativeComponent>>,
    pending_cleanups: Vec<Cleanup>,
}

impl Document {
    /// Create a document with only its root element
    pub fn new(listener: Listener) -> Self {
        let root = Node::new(
            DOCUMENT_ELEMENT_REF.to_string(),
            NodeData::Element(Element::new("document", ElementKind::Plain)),
        );
        let mut refs = HashMap::new();
        refs.insert(DOCUMENT_ELEMENT_REF.to_string(), NodeId::DOCUMENT_ELEMENT);
        Self {
            nodes: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
            live: 1,
            refs,
            body: None,
            next_ref: 1,
            listener,
            natives: HashMap::new(),
            pending_cleanups: Vec::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        self.listener.instance_id()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut Listener {
        &mut self.listener
    }

    /// Shortcut for the listener's last signal
    pub fn last_signal(&self) -> Signal {
        self.listener.last_signal()
    }

    // ========================================================================
    // Element kinds
    // ========================================================================

    /// Register a native element type; later `create_element` calls with its
    /// tag produce [`ElementKind::Native`]
    pub fn register_native(&mut self, component: NativeComponent) {
        tracing::debug!(tag = %component.tag, "registered native element type");
        self.natives.insert(component.tag.clone(), Rc::new(component));
    }

    pub fn native(&self, tag: &str) -> Option<&Rc<NativeComponent>> {
        self.natives.get(tag)
    }

    /// Element kind for a tag
    pub fn kind_for(&self, tag: &str) -> ElementKind {
        match self.natives.get(tag) {
            Some(component) => ElementKind::Native(component.clone()),
            None => ElementKind::Plain,
        }
    }

    // ========================================================================
    // Creation and lookup
    // ========================================================================

    fn alloc(&mut self, node_ref: String, data: NodeData) -> NodeId {
        let node = Some(Node::new(node_ref.clone(), data));
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index];
                slot.node = node;
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.nodes.push(Slot { generation: 0, node });
                NodeId {
                    index: self.nodes.len() - 1,
                    generation: 0,
                }
            }
        };
        self.live += 1;
        self.refs.insert(node_ref, id);
        id
    }

    fn next_ref(&mut self) -> String {
        let node_ref = self.next_ref.to_string();
        self.next_ref += 1;
        node_ref
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let kind = self.kind_for(tag);
        let node_ref = self.next_ref();
        self.alloc(node_ref, NodeData::Element(Element::new(tag, kind)))
    }

    /// Create the body element. A document has one body; asking again while
    /// it is alive creates a plain element instead.
    pub fn create_body(&mut self, tag: &str) -> NodeId {
        if let Some(body) = self.body.filter(|b| self.contains(*b)) {
            tracing::warn!(existing = %body, "document already has a body");
            return self.create_element(tag);
        }
        let kind = self.kind_for(tag);
        let id = self.alloc(BODY_REF.to_string(), NodeData::Element(Element::new(tag, kind)));
        self.body = Some(id);
        id
    }

    /// Create a detached comment marker
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        let node_ref = self.next_ref();
        self.alloc(
            node_ref,
            NodeData::Comment(Comment {
                text: text.to_string(),
            }),
        )
    }

    #[inline]
    pub fn document_element(&self) -> NodeId {
        NodeId::DOCUMENT_ELEMENT
    }

    #[inline]
    pub fn body(&self) -> Option<NodeId> {
        self.body
    }

    /// Whether the node exists (not destroyed)
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).and_then(Node::as_element)
    }

    fn element_checked(&self, id: NodeId) -> Result<&Element, DomError> {
        self.node(id)
            .ok_or(DomError::UnknownNode(id))?
            .as_element()
            .ok_or(DomError::NotAnElement(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        self.node_mut(id)
            .ok_or(DomError::UnknownNode(id))?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(id))
    }

    #[inline]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(Node::is_element)
    }

    /// Look a node up by its host reference
    pub fn get_ref(&self, node_ref: &str) -> Option<NodeId> {
        self.refs.get(node_ref).copied()
    }

    pub fn node_ref(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::node_ref)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::next_sibling)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::prev_sibling)
    }

    /// All children (empty for comments and unknown ids)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(Element::children).unwrap_or_default()
    }

    /// Element children only
    pub fn pure_children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(Element::pure_children).unwrap_or_default()
    }

    /// Attribute value of an element
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.element(id).and_then(|e| e.attr.get(key))
    }

    /// Resolved style of an element
    pub fn resolved_style(&self, id: NodeId) -> Props {
        self.element(id).map(|e| e.style.resolved()).unwrap_or_default()
    }

    /// Whether the node hangs (transitively) under the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == NodeId::DOCUMENT_ELEMENT {
                return self.contains(node);
            }
            current = self.parent(node);
        }
        false
    }

    /// Number of live nodes, the root included
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Arena slots allocated so far, live or vacant
    pub fn arena_size(&self) -> usize {
        self.nodes.len()
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn send(&mut self, action: DomAction, args: Vec<Value>) {
        self.listener.send(NativeCall::dom(action, args));
    }

    fn ref_value(&self, id: NodeId) -> Value {
        Value::String(self.node_ref(id).unwrap_or_default().to_string())
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Append `child` as the last child of `parent`, or move it there if it
    /// is already a child
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.place(parent, child, Position::End)
    }

    /// Insert `node` right before `before`, a child of `parent`
    pub fn insert_before(&mut self, parent: NodeId, node: NodeId, before: NodeId) -> Result<(), DomError> {
        self.place(parent, node, Position::Before(before))
    }

    /// Insert `node` right after `after`, a child of `parent`
    pub fn insert_after(&mut self, parent: NodeId, node: NodeId, after: NodeId) -> Result<(), DomError> {
        self.place(parent, node, Position::After(after))
    }

    fn place(&mut self, parent: NodeId, node: NodeId, position: Position) -> Result<(), DomError> {
        self.element_checked(parent)?;
        let current = self.node(node).ok_or(DomError::UnknownNode(node))?.parent;
        match current {
            Some(other) if other != parent => {
                return Err(DomError::AlreadyAttached { node, parent: other });
            }
            _ => {}
        }
        if self.is_ancestor_or_self(node, parent) {
            return Err(DomError::Cycle { node, parent });
        }
        if let Position::Before(anchor) | Position::After(anchor) = position {
            if anchor != node && self.parent(anchor) != Some(parent) {
                return Err(DomError::NotAChild { node: anchor, parent });
            }
        }
        let moving = current.is_some();
        match position {
            Position::Before(anchor) if anchor == node || (moving && self.next_sibling(node) == Some(anchor)) => {
                return Ok(());
            }
            Position::After(anchor) if anchor == node || (moving && self.prev_sibling(node) == Some(anchor)) => {
                return Ok(());
            }
            _ => {}
        }

        let is_element = self.is_element(node);
        if moving {
            let element = self.element_mut(parent)?;
            if let Some(old) = element.children.iter().position(|c| *c == node) {
                element.children.remove(old);
                self.relink_around(parent, old);
            }
        }

        let index = {
            let element = self.element_mut(parent)?;
            let index = match position {
                Position::End => element.children.len(),
                Position::Before(anchor) => element
                    .children
                    .iter()
                    .position(|c| *c == anchor)
                    .unwrap_or(element.children.len()),
                Position::After(anchor) => element
                    .children
                    .iter()
                    .position(|c| *c == anchor)
                    .map_or(element.children.len(), |i| i + 1),
            };
            element.children.insert(index, node);
            index
        };
        if let Some(entry) = self.node_mut(node) {
            entry.parent = Some(parent);
        }
        self.relink_around(parent, index);

        if !is_element {
            return Ok(());
        }
        let pure_index = self.children(parent)[..index]
            .iter()
            .filter(|c| self.is_element(**c))
            .count();
        let old_pure = {
            let element = self.element_mut(parent)?;
            let old = element.pure_children.iter().position(|c| *c == node);
            if let Some(old) = old {
                element.pure_children.remove(old);
            }
            element.pure_children.insert(pure_index, node);
            old
        };

        if !self.is_connected(parent) {
            return Ok(());
        }
        match old_pure {
            Some(old) if old == pure_index => {}
            Some(_) => {
                let args = vec![self.ref_value(node), self.ref_value(parent), Value::from(pure_index)];
                self.send(DomAction::MoveElement, args);
            }
            None if parent == NodeId::DOCUMENT_ELEMENT => {
                tracing::debug!(body = %node, "attaching body");
                let args = vec![self.to_json(node)];
                self.send(DomAction::CreateBody, args);
            }
            None => {
                let args = vec![self.ref_value(parent), self.to_json(node), Value::from(pure_index)];
                self.send(DomAction::AddElement, args);
            }
        }
        Ok(())
    }

    /// Refresh sibling links of the children around `index`
    fn relink_around(&mut self, parent: NodeId, index: usize) {
        let children = self.children(parent);
        let start = index.saturating_sub(1);
        let end = (index + 2).min(children.len());
        let updates: Vec<_> = (start..end)
            .map(|i| {
                let prev = i.checked_sub(1).map(|j| children[j]);
                let next = children.get(i + 1).copied();
                (children[i], prev, next)
            })
            .collect();
        for (child, prev, next) in updates {
            if let Some(node) = self.node_mut(child) {
                node.prev_sibling = prev;
                node.next_sibling = next;
            }
        }
    }

    /// Detach `child` from `parent`. Unless `preserved`, the child subtree is
    /// destroyed afterwards.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId, preserved: bool) -> Result<(), DomError> {
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotAChild { node: child, parent });
        }
        let connected = self.is_connected(parent);
        let is_element = self.detach(parent, child)?;
        if connected && is_element {
            let args = vec![self.ref_value(child)];
            self.send(DomAction::RemoveElement, args);
        }
        if !preserved {
            self.destroy(child);
        }
        Ok(())
    }

    /// Unlink without any message; returns whether the child is an element
    fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<bool, DomError> {
        let is_element = self.is_element(child);
        let element = self.element_mut(parent)?;
        let index = element.children.iter().position(|c| *c == child);
        if let Some(index) = index {
            element.children.remove(index);
        }
        element.pure_children.retain(|c| *c != child);
        if let Some(index) = index {
            self.relink_around(parent, index);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }
        Ok(is_element)
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Destroy a node and everything it owns
    ///
    /// The node is unlinked from its parent without a native message (use
    /// [`remove_child`](Self::remove_child) for that). Cleanups registered on
    /// the subtree are queued, children before parents, and handed out by
    /// [`take_cleanups`](Self::take_cleanups). Destroying twice is a no-op.
    pub fn destroy(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        if let Some(parent) = self.parent(id) {
            let _ = self.detach(parent, id);
        }
        self.destroy_subtree(id);
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let Some(slot) = self
            .nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(node) = slot.node.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;
        // the root slot stays retired so its id never resolves to another node
        if id != NodeId::DOCUMENT_ELEMENT {
            self.free.push(id.index);
        }
        if let NodeData::Element(element) = &node.data {
            for child in element.children.clone() {
                self.destroy_subtree(child);
            }
        }
        if self.body == Some(id) {
            self.body = None;
        }
        self.refs.remove(&node.node_ref);
        self.pending_cleanups.extend(node.cleanups);
    }

    /// Destroy every node, attached or not
    pub fn destroy_all(&mut self) {
        for index in 0..self.nodes.len() {
            let generation = self.nodes[index].generation;
            self.destroy_subtree(NodeId { index, generation });
        }
        self.body = None;
    }

    /// Run `cleanup` when the node is destroyed. For a node that no longer
    /// exists the cleanup is queued right away.
    pub fn add_cleanup(&mut self, id: NodeId, cleanup: Cleanup) {
        match self.node_mut(id) {
            Some(node) => node.cleanups.push(cleanup),
            None => self.pending_cleanups.push(cleanup),
        }
    }

    /// Cleanups queued by destruction; the caller runs them once it no
    /// longer holds the document
    pub fn take_cleanups(&mut self) -> Vec<Cleanup> {
        std::mem::take(&mut self.pending_cleanups)
    }

    // ========================================================================
    // Attributes and style
    // ========================================================================

    /// Write one attribute. Returns whether the attribute was written.
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: Value, mode: UpdateMode) -> Result<bool, DomError> {
        let element = self.element_mut(id)?;
        if element.attr.get(key) == Some(&value) && mode != UpdateMode::Forced {
            return Ok(false);
        }
        element.attr.insert(key.to_string(), value.clone());
        if mode != UpdateMode::Silent && self.is_connected(id) {
            let mut changed = Props::new();
            changed.insert(key.to_string(), value);
            let args = vec![self.ref_value(id), Value::Object(changed)];
            self.send(DomAction::UpdateAttrs, args);
        }
        Ok(true)
    }

    /// Write one inline style property. The host receives the property's
    /// resolved value.
    pub fn set_style(&mut self, id: NodeId, key: &str, value: Value, mode: UpdateMode) -> Result<bool, DomError> {
        let element = self.element_mut(id)?;
        let inline = element.style.layer_mut(StyleLayer::Inline);
        if inline.get(key) == Some(&value) && mode != UpdateMode::Forced {
            return Ok(false);
        }
        inline.insert(key.to_string(), value);
        let resolved = element.style.resolved_value(key);
        if mode != UpdateMode::Silent && self.is_connected(id) {
            let mut changed = Props::new();
            changed.insert(key.to_string(), resolved);
            let args = vec![self.ref_value(id), Value::Object(changed)];
            self.send(DomAction::UpdateStyle, args);
        }
        Ok(true)
    }

    /// Replace a whole style layer; the host receives the full resolved
    /// style
    pub fn set_style_layer(&mut self, id: NodeId, layer: StyleLayer, props: Props) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        element.style.reset_layer(layer, props);
        let resolved = element.style.resolved();
        if self.is_connected(id) {
            let args = vec![self.ref_value(id), Value::Object(resolved)];
            self.send(DomAction::UpdateStyle, args);
        }
        Ok(())
    }

    /// Replace the class style layer
    pub fn set_class_style(&mut self, id: NodeId, props: Props) -> Result<(), DomError> {
        self.set_style_layer(id, StyleLayer::Class, props)
    }

    /// Record the element's template id
    pub fn set_element_id(&mut self, id: NodeId, element_id: Option<String>) -> Result<(), DomError> {
        self.element_mut(id)?.id = element_id;
        Ok(())
    }

    /// Mark the element as the root of a custom component
    pub fn set_custom_component(&mut self, id: NodeId, custom: bool) -> Result<(), DomError> {
        self.element_mut(id)?.custom_component = custom;
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Bind a handler. The host hears about the type only on its first bind.
    pub fn add_event(&mut self, id: NodeId, kind: &str, handler: EventHandler) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        let first = element.events.insert(kind.to_string(), handler).is_none();
        if first && self.is_connected(id) {
            let args = vec![self.ref_value(id), Value::from(kind)];
            self.send(DomAction::AddEvent, args);
        }
        Ok(())
    }

    /// Unbind a handler; returns whether one was bound
    pub fn remove_event(&mut self, id: NodeId, kind: &str) -> Result<bool, DomError> {
        let removed = self.element_mut(id)?.events.remove(kind).is_some();
        if removed && self.is_connected(id) {
            let args = vec![self.ref_value(id), Value::from(kind)];
            self.send(DomAction::RemoveEvent, args);
        }
        Ok(removed)
    }

    /// Prepare an event coming from the host
    ///
    /// Changes the host already applied are installed silently first. The
    /// returned dispatch runs the handler; `None` when no handler is bound.
    pub fn fire_event(
        &mut self,
        id: NodeId,
        kind: &str,
        data: Value,
        changes: Option<&DomChanges>,
    ) -> Result<Option<EventDispatch>, DomError> {
        self.element_checked(id)?;
        if let Some(changes) = changes {
            for (key, value) in &changes.attrs {
                self.set_attr(id, key, value.clone(), UpdateMode::Silent)?;
            }
            for (key, value) in &changes.style {
                self.set_style(id, key, value.clone(), UpdateMode::Silent)?;
            }
        }
        let element = self.element_checked(id)?;
        let Some(handler) = element.events.get(kind).cloned() else {
            tracing::debug!(node = %id, event = kind, "no handler bound");
            return Ok(None);
        };
        let mut event = Event::new(kind, self.node_ref(id).unwrap_or_default(), data);
        event.target_id = Some(id);
        Ok(Some(EventDispatch { event, handler }))
    }

    /// Call a method of a native element type on the host
    pub fn call_method(&mut self, id: NodeId, method: &str, args: Vec<Value>) -> Result<Signal, DomError> {
        let element = self.element_checked(id)?;
        if !element.kind.has_method(method) {
            return Err(DomError::UnknownMethod {
                tag: element.tag.clone(),
                method: method.to_string(),
            });
        }
        let mut call_args = vec![self.ref_value(id), Value::from(element.tag.as_str())];
        call_args.extend(args);
        Ok(self.listener.send(NativeCall::new("component", method, call_args)))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("instance_id", &self.instance_id())
            .field("nodes", &self.len())
            .field("body", &self.body)
            .finish()
    }
}
