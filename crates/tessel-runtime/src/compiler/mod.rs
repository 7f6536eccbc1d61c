//! Template compiler
//!
//! [`compile`] turns one template node into tree nodes under a destination
//! (an element, or a fragment block standing for a dynamic region). A node is
//! dispatched in a fixed order, first match wins:
//!
//! 1. `slot` / `content`: project the caller's content
//! 2. `repeat`: keyed list ([`repeat`])
//! 3. `shown`: conditional region
//! 4. dynamic `type`: region rebuilt when the type changes
//! 5. registered component: child view model
//! 6. `block`: grouping without an element of its own
//! 7. anything else: a native element
//!
//! `meta` records which directives were already resolved for this node, so
//! re-compiling a repeat item or a shown region does not re-enter them.
//!
//! Compilation never fails. Misuse is logged and the node skipped; an abort
//! (instance destroyed, or the host answered abort) is checked before every
//! node and every child, and stops the whole walk.

mod block;
mod directive;
mod repeat;

pub(crate) use block::FragBlock;

use std::rc::Rc;

use tessel_dom::{AppendMode, Document, DomError, NodeId, UpdateMode};
use tessel_observe::{untracked, Value, Watcher};

use crate::app::App;
use crate::context::Scope;
use crate::differ::DiffKind;
use crate::registry::TypeHandler;
use crate::template::{Expr, Template, TemplateType};
use crate::vm::Vm;

/// Where compiled nodes go
#[derive(Clone)]
pub(crate) enum Dest {
    Element(NodeId),
    Block(Rc<FragBlock>),
}

impl Dest {
    fn is_document_root(&self) -> bool {
        matches!(self, Dest::Element(id) if *id == NodeId::DOCUMENT_ELEMENT)
    }
}

/// What one template node compiled to
#[derive(Clone)]
pub(crate) enum Target {
    Element(NodeId),
    Block(Rc<FragBlock>),
}

impl Target {
    pub(crate) fn first_node(&self) -> NodeId {
        match self {
            Target::Element(el) => *el,
            Target::Block(block) => block.start,
        }
    }

    pub(crate) fn last_node(&self) -> NodeId {
        match self {
            Target::Element(el) => *el,
            Target::Block(block) => block.end,
        }
    }
}

/// Directives already resolved for the node being compiled
#[derive(Debug, Clone, Default)]
pub(crate) struct Meta {
    /// Item of the enclosing repeat, set while compiling that item
    pub(crate) repeat: Option<Value>,
    pub(crate) shown: bool,
    pub(crate) resolved_type: Option<String>,
}

/// Compile `template` into `dest`
pub(crate) fn compile(scope: &Scope, template: &Rc<Template>, dest: &Dest, meta: &Meta) -> Option<Target> {
    let app = scope.vm().app()?;
    if app.is_aborted() {
        tracing::debug!("compile aborted");
        return None;
    }

    let tag = meta.resolved_type.as_deref().or(template.static_type());
    if matches!(tag, Some("slot" | "content")) {
        return block::compile_slot(&app, scope, template, dest);
    }

    if let Some(repeat) = template.repeat.as_ref().filter(|_| meta.repeat.is_none()) {
        if dest.is_document_root() {
            tracing::warn!("`repeat` is not allowed on the document root, skipped");
            return None;
        }
        return repeat::compile_repeat(&app, scope, template, repeat, dest);
    }

    if let Some(shown) = template.shown.as_ref().filter(|_| !meta.shown) {
        if dest.is_document_root() {
            tracing::warn!("`shown` is not allowed on the document root, skipped");
            return None;
        }
        return block::compile_shown(&app, scope, template, shown, dest, meta);
    }

    let tag = match (tag, &template.kind) {
        (Some(tag), _) => tag.to_string(),
        (None, TemplateType::Dynamic(expr)) => {
            return block::compile_dynamic_type(&app, scope, template, expr, dest, meta);
        }
        (None, TemplateType::Static(tag)) => tag.clone(),
    };

    match app.resolve_type(&tag) {
        TypeHandler::Component(def) => directive::compile_component(&app, scope, template, def, dest, meta),
        TypeHandler::Block => block::compile_block(&app, scope, template, dest),
        TypeHandler::Native => compile_native(&app, scope, template, &tag, dest),
    }
}

/// Clears the tree-mode marker when the subtree is done
struct TreeModeGuard<'a>(&'a App);

impl<'a> TreeModeGuard<'a> {
    fn set(app: &'a App, el: NodeId) -> Self {
        app.set_tree_mode_parent(Some(el));
        Self(app)
    }
}

impl Drop for TreeModeGuard<'_> {
    fn drop(&mut self) {
        self.0.set_tree_mode_parent(None);
    }
}

fn compile_native(app: &App, scope: &Scope, template: &Rc<Template>, tag: &str, dest: &Dest) -> Option<Target> {
    let el = app.with_doc(|doc| {
        if dest.is_document_root() {
            doc.create_body(tag)
        } else {
            doc.create_element(tag)
        }
    });
    scope.vm().set_root_element(el);
    directive::bind_element(app, scope, el, template, tag);

    let mode = template
        .append_mode()
        .or_else(|| app.document().element(el).and_then(|e| e.kind().append()))
        .unwrap_or_default();
    if mode == AppendMode::Tree && !template.attr.contains_key("append") {
        report(
            app.with_doc(|doc| doc.set_attr(el, "append", "tree".into(), UpdateMode::Normal)),
            "set append",
        );
    }

    // an enclosing tree-mode subtree already sends everything in one message
    if mode == AppendMode::Tree && app.tree_mode_parent().is_none() {
        let guard = TreeModeGuard::set(app, el);
        compile_children(app, scope, template, el);
        drop(guard);
        attach(app, el, dest);
    } else {
        attach(app, el, dest);
        compile_children(app, scope, template, el);
    }
    Some(Target::Element(el))
}

fn compile_children(app: &App, scope: &Scope, template: &Template, el: NodeId) {
    let dest = Dest::Element(el);
    for child in &template.children {
        if app.is_aborted() {
            return;
        }
        compile(scope, child, &dest, &Meta::default());
    }
}

// ============================================================================
// Placement
// ============================================================================

pub(crate) fn report<T>(result: Result<T, DomError>, action: &'static str) {
    if let Err(err) = result {
        tracing::warn!(%err, action, "tree operation failed");
    }
}

/// Put a new element at the destination. Inside a block being updated the
/// element goes right after the update mark, which then moves onto it.
pub(crate) fn attach(app: &App, el: NodeId, dest: &Dest) {
    let result = app.with_doc(|doc| -> Result<(), DomError> {
        match dest {
            Dest::Element(parent) => doc.append_child(*parent, el),
            Dest::Block(block) => match block.update_mark.get() {
                Some(mark) => {
                    doc.insert_after(block.parent, el, mark)?;
                    block.update_mark.set(Some(el));
                    Ok(())
                }
                None => doc.insert_before(block.parent, el, block.end),
            },
        }
    });
    report(result, "attach");
}

/// Every node of a target, in order
fn target_nodes(doc: &Document, target: &Target) -> Vec<NodeId> {
    match target {
        Target::Element(el) => vec![*el],
        Target::Block(block) => {
            let mut nodes = Vec::new();
            let mut current = Some(block.start);
            while let Some(node) = current {
                nodes.push(node);
                if node == block.end {
                    break;
                }
                current = doc.next_sibling(node);
            }
            nodes
        }
    }
}

/// Move a target so it follows `after`
pub(crate) fn move_target(app: &App, parent: NodeId, target: &Target, after: NodeId) {
    let result = app.with_doc(|doc| -> Result<(), DomError> {
        let mut cursor = after;
        for node in target_nodes(doc, target) {
            doc.insert_after(parent, node, cursor)?;
            cursor = node;
        }
        Ok(())
    });
    report(result, "move");
}

/// Remove and destroy every node of a target
pub(crate) fn remove_target(app: &App, target: &Target) {
    app.with_doc(|doc| {
        for node in target_nodes(doc, target) {
            match doc.parent(node) {
                Some(parent) => report(doc.remove_child(parent, node, false), "remove"),
                None => doc.destroy(node),
            }
        }
    });
}

// ============================================================================
// Watchers
// ============================================================================

fn new_watcher(scope: &Scope, expr: Expr, update: impl Fn(&Value) + 'static) -> Watcher {
    let scope = scope.clone();
    Watcher::new(move || expr.eval(&scope), move |value, _| update(value))
}

/// Evaluate `expr` and keep calling `update` with fresh values until
/// `owner` is destroyed. Returns the current value. Static view models get
/// the value only.
pub(crate) fn watch(scope: &Scope, owner: NodeId, expr: Expr, update: impl Fn(&Value) + 'static) -> Value {
    let vm = scope.vm();
    if vm.is_static() {
        return untracked(|| expr.eval(scope));
    }
    let watcher = new_watcher(scope, expr, update);
    if let Some(app) = vm.app() {
        let handle = watcher.clone();
        app.with_doc(|doc| doc.add_cleanup(owner, Box::new(move || handle.teardown())));
    }
    vm.add_watcher(watcher.clone());
    watcher.value()
}

/// Like [`watch`], owned by a view model instead of a node
pub(crate) fn watch_for_vm(scope: &Scope, owner: &Vm, expr: Expr, update: impl Fn(&Value) + 'static) -> Value {
    if owner.is_static() || scope.vm().is_static() {
        return untracked(|| expr.eval(scope));
    }
    let watcher = new_watcher(scope, expr, update);
    owner.add_watcher(watcher.clone());
    watcher.value()
}

/// Watch the value driving a dynamic region. Changes are not applied
/// directly: they are queued in the differ under the block, so the region
/// is updated once per flush with the latest value.
pub(crate) fn watch_block(
    scope: &Scope,
    block: &FragBlock,
    expr: Expr,
    kind: DiffKind,
    handler: Rc<dyn Fn(&Value)>,
) -> Value {
    let Some(app) = scope.vm().app() else {
        return Value::Null;
    };
    let weak = app.downgrade();
    let block_id = block.id;
    let start = block.start;
    watch(scope, start, expr, move |value| {
        let Some(app) = weak.upgrade() else {
            return;
        };
        let handler = handler.clone();
        let value = value.clone();
        let task_app = weak.clone();
        app.differ().append(kind, block_id, move || {
            let Some(app) = task_app.upgrade() else {
                return;
            };
            if app.is_aborted() || !app.document().contains(start) {
                tracing::trace!(block = block_id, ?kind, "skipping update of a destroyed region");
                return;
            }
            handler(&value);
        });
    })
}
