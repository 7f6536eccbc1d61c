//! Fragment blocks
//!
//! A block is a pair of comment markers delimiting a region whose content
//! changes size: repeat lists, shown regions, dynamic types, `block` groups
//! and slots. The markers never reach the host, so a block costs nothing on
//! the native side.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tessel_dom::{DomError, NodeId};
use tessel_observe::Value;

use super::repeat::RepeatItem;
use super::{compile, report, watch_block, Dest, Meta, Target};
use crate::app::App;
use crate::context::Scope;
use crate::differ::DiffKind;
use crate::template::{Binding, Expr, Template};

/// Dynamic region between two comment markers
pub(crate) struct FragBlock {
    /// Key of this region in the differ
    pub(crate) id: u64,
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    /// Element holding the markers
    pub(crate) parent: NodeId,
    /// Materialized items, repeat blocks only
    pub(crate) items: RefCell<Vec<RepeatItem>>,
    /// Content currently shown, shown blocks only
    pub(crate) display: Cell<bool>,
    /// While set, new content goes right after this node
    pub(crate) update_mark: Cell<Option<NodeId>>,
}

/// Create the markers of a new block at the destination
pub(crate) fn create_block(app: &App, dest: &Dest) -> Option<Rc<FragBlock>> {
    let id = app.next_block_id();
    let result = app.with_doc(|doc| -> Result<(NodeId, NodeId, NodeId), DomError> {
        let start = doc.create_comment("start");
        let end = doc.create_comment("end");
        let parent = match dest {
            Dest::Element(parent) => {
                doc.append_child(*parent, start)?;
                doc.append_child(*parent, end)?;
                *parent
            }
            Dest::Block(outer) => {
                match outer.update_mark.get() {
                    Some(mark) => {
                        doc.insert_after(outer.parent, end, mark)?;
                        doc.insert_after(outer.parent, start, mark)?;
                        outer.update_mark.set(Some(end));
                    }
                    None => {
                        doc.insert_before(outer.parent, start, outer.end)?;
                        doc.insert_before(outer.parent, end, outer.end)?;
                    }
                }
                outer.parent
            }
        };
        Ok((start, end, parent))
    });
    match result {
        Ok((start, end, parent)) => Some(Rc::new(FragBlock {
            id,
            start,
            end,
            parent,
            items: RefCell::new(Vec::new()),
            display: Cell::new(false),
            update_mark: Cell::new(None),
        })),
        Err(err) => {
            tracing::warn!(%err, "could not place block markers");
            None
        }
    }
}

/// Remove and destroy everything between the markers
pub(crate) fn clear_block(app: &App, block: &FragBlock) {
    app.with_doc(|doc| {
        let mut doomed = Vec::new();
        let mut current = doc.next_sibling(block.start);
        while let Some(node) = current.filter(|n| *n != block.end) {
            doomed.push(node);
            current = doc.next_sibling(node);
        }
        for node in doomed {
            report(doc.remove_child(block.parent, node, false), "clear block");
        }
    });
}

/// `block`: children grouped without an element
pub(crate) fn compile_block(app: &App, scope: &Scope, template: &Rc<Template>, dest: &Dest) -> Option<Target> {
    let block = create_block(app, dest)?;
    let inner = Dest::Block(block.clone());
    for child in &template.children {
        if app.is_aborted() {
            break;
        }
        compile(scope, child, &inner, &Meta::default());
    }
    Some(Target::Block(block))
}

/// `slot` / `content`: compile the caller's content for this slot against
/// the caller's scope
pub(crate) fn compile_slot(app: &App, scope: &Scope, template: &Rc<Template>, dest: &Dest) -> Option<Target> {
    let Some(slot) = scope.vm().slot() else {
        tracing::debug!(vm = scope.vm().id(), "slot outside of a component, ignored");
        return None;
    };
    let name = match template.static_type() {
        Some("content") => "default",
        _ => template
            .attr
            .get("name")
            .and_then(Binding::as_static_str)
            .unwrap_or("default"),
    };
    let caller = slot.scope.clone();
    let content: Vec<Rc<Template>> = slot
        .content
        .iter()
        .filter(|child| child.slot_name() == name)
        .cloned()
        .collect();

    let block = create_block(app, dest)?;
    let inner = Dest::Block(block.clone());
    for child in &content {
        if app.is_aborted() {
            break;
        }
        compile(&caller, child, &inner, &Meta::default());
    }
    Some(Target::Block(block))
}

struct ShownRegion {
    scope: Scope,
    template: Rc<Template>,
    block: Rc<FragBlock>,
    repeat: Option<Value>,
}

impl ShownRegion {
    fn apply(&self, show: bool) {
        if self.block.display.replace(show) == show {
            return;
        }
        let Some(app) = self.scope.vm().app() else {
            return;
        };
        if show {
            let meta = Meta {
                repeat: self.repeat.clone(),
                shown: true,
                resolved_type: None,
            };
            compile(&self.scope, &self.template, &Dest::Block(self.block.clone()), &meta);
        } else {
            clear_block(&app, &self.block);
        }
    }
}

/// `shown`: the node is compiled into a block while the expression is truthy
pub(crate) fn compile_shown(
    app: &App,
    scope: &Scope,
    template: &Rc<Template>,
    shown: &Expr,
    dest: &Dest,
    meta: &Meta,
) -> Option<Target> {
    let block = create_block(app, dest)?;
    let region = Rc::new(ShownRegion {
        scope: scope.clone(),
        template: template.clone(),
        block: block.clone(),
        repeat: meta.repeat.clone(),
    });
    let expr = shown.clone();
    let truthy = Expr::func(move |scope| Value::from(expr.eval(scope).is_truthy()));
    let toggle = region.clone();
    let initial = watch_block(
        scope,
        &block,
        truthy,
        DiffKind::Shown,
        Rc::new(move |value: &Value| toggle.apply(value.is_truthy())),
    );
    region.apply(initial.is_truthy());
    Some(Target::Block(block))
}

struct TypedRegion {
    scope: Scope,
    template: Rc<Template>,
    block: Rc<FragBlock>,
    meta: Meta,
}

impl TypedRegion {
    fn render(&self, kind: &Value) {
        let Some(app) = self.scope.vm().app() else {
            return;
        };
        clear_block(&app, &self.block);
        let kind = kind.to_string();
        if kind.is_empty() {
            tracing::debug!(block = self.block.id, "dynamic type resolved to nothing");
            return;
        }
        let meta = Meta {
            resolved_type: Some(kind),
            ..self.meta.clone()
        };
        compile(&self.scope, &self.template, &Dest::Block(self.block.clone()), &meta);
    }
}

/// Node with a computed type: rebuilt from scratch whenever the type changes
pub(crate) fn compile_dynamic_type(
    app: &App,
    scope: &Scope,
    template: &Rc<Template>,
    expr: &Expr,
    dest: &Dest,
    meta: &Meta,
) -> Option<Target> {
    let block = create_block(app, dest)?;
    let region = Rc::new(TypedRegion {
        scope: scope.clone(),
        template: template.clone(),
        block: block.clone(),
        meta: meta.clone(),
    });
    let expr = expr.clone();
    let kind = Expr::func(move |scope| Value::from(expr.eval(scope).to_string()));
    let switch = region.clone();
    let initial = watch_block(
        scope,
        &block,
        kind,
        DiffKind::Type,
        Rc::new(move |value: &Value| switch.render(value)),
    );
    region.render(&initial);
    Some(Target::Block(block))
}
