//! Element bindings and custom components
//!
//! Static bindings are written once. Dynamic ones install a watcher owned
//! by the element, which writes the new value whenever it changes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value as Json;
use tessel_dom::{DomError, EventHandler, NodeId, StyleLayer, UpdateMode};
use tessel_observe::Value;

use super::{compile, report, watch, watch_for_vm, Dest, Meta, Target};
use crate::app::App;
use crate::context::Scope;
use crate::registry::{ComponentDef, Hook};
use crate::template::{Binding, EventBinding, Expr, Handler, Template};
use crate::vm::{SlotContext, Vm};

/// Apply `binding` now and, when dynamic, on every change
fn bind_value(scope: &Scope, el: NodeId, binding: &Binding, apply: impl Fn(&Value) + 'static) {
    let apply = Rc::new(apply);
    let value = match binding {
        Binding::Static(json) => Value::from_json(json),
        Binding::Dynamic(expr) => {
            let on_change = apply.clone();
            watch(scope, el, expr.clone(), move |value| on_change(value))
        }
    };
    apply(&value);
}

/// Bind everything a template node declares on its element
pub(crate) fn bind_element(app: &App, scope: &Scope, el: NodeId, template: &Template, tag: &str) {
    let tag_style = scope.vm().def().style.tag_style(tag);
    if !tag_style.is_empty() {
        report(
            app.with_doc(|doc| doc.set_style_layer(el, StyleLayer::Tag, tag_style)),
            "tag style",
        );
    }
    if let Some(id) = &template.id {
        bind_id(app, scope, el, id);
    }
    if !template.class_list.is_empty() {
        bind_class(app, scope, el, &template.class_list);
    }
    for (key, binding) in &template.attr {
        bind_attr(app, scope, el, key, binding);
    }
    for (key, binding) in &template.style {
        bind_style(app, scope, el, key, binding);
    }
    bind_events(scope, el, &template.events);
}

fn bind_attr(app: &App, scope: &Scope, el: NodeId, key: &str, binding: &Binding) {
    let weak = app.downgrade();
    let key = key.to_string();
    bind_value(scope, el, binding, move |value| {
        if let Some(app) = weak.upgrade() {
            report(
                app.with_doc(|doc| doc.set_attr(el, &key, value.to_json(), UpdateMode::Normal)),
                "attr",
            );
        }
    });
}

fn bind_style(app: &App, scope: &Scope, el: NodeId, key: &str, binding: &Binding) {
    let weak = app.downgrade();
    let key = key.to_string();
    bind_value(scope, el, binding, move |value| {
        if let Some(app) = weak.upgrade() {
            report(
                app.with_doc(|doc| doc.set_style(el, &key, value.to_json(), UpdateMode::Normal)),
                "style",
            );
        }
    });
}

fn bind_id(app: &App, scope: &Scope, el: NodeId, binding: &Binding) {
    let weak = app.downgrade();
    let vm = scope.vm().downgrade();
    let current: RefCell<Option<String>> = RefCell::new(None);
    bind_value(scope, el, binding, move |value| {
        let (Some(app), Some(vm)) = (weak.upgrade(), vm.upgrade()) else {
            return;
        };
        let id = value.to_string();
        if let Some(previous) = current.borrow_mut().take() {
            vm.unregister_id(&previous, el);
        }
        let (element_id, style) = if id.is_empty() {
            (None, Default::default())
        } else {
            vm.register_id(&id, el);
            current.replace(Some(id.clone()));
            (Some(id.clone()), vm.def().style.id_style(&id))
        };
        report(
            app.with_doc(|doc| -> Result<(), DomError> {
                doc.set_element_id(el, element_id)?;
                doc.set_style_layer(el, StyleLayer::Id, style)
            }),
            "id",
        );
    });
}

fn class_names(scope: &Scope, list: &[Binding]) -> Vec<String> {
    let mut names = Vec::new();
    for binding in list {
        match binding.eval(scope) {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.to_vec() {
                    names.extend(item.to_string().split_whitespace().map(str::to_string));
                }
            }
            other => names.extend(other.to_string().split_whitespace().map(str::to_string)),
        }
    }
    names
}

/// Resolve the class list against the stylesheet of `scope`'s view model
fn bind_class(app: &App, scope: &Scope, el: NodeId, list: &[Binding]) {
    let binding = if list.iter().any(Binding::is_dynamic) {
        let list = list.to_vec();
        Binding::Dynamic(Expr::func(move |scope| Value::from(class_names(scope, &list).join(" "))))
    } else {
        Binding::Static(Json::String(class_names(scope, list).join(" ")))
    };
    let weak = app.downgrade();
    let vm = scope.vm().downgrade();
    bind_value(scope, el, &binding, move |value| {
        let (Some(app), Some(vm)) = (weak.upgrade(), vm.upgrade()) else {
            return;
        };
        let names = value.to_string();
        let names: Vec<&str> = names.split_whitespace().collect();
        let style = vm.def().style.class_style(&names);
        report(app.with_doc(|doc| doc.set_class_style(el, style)), "class");
    });
}

/// Arguments for a handler: the event itself, then the bound params
fn call_handler(vm: &Vm, handler: &Handler, args: &[Value]) {
    match handler {
        Handler::Method(name) => {
            vm.call(name, args);
        }
        Handler::Func(f) => f(vm, args),
    }
}

fn event_handler(vm: &Vm, handler: &Handler, params: Vec<Json>) -> EventHandler {
    let vm = vm.clone();
    let handler = handler.clone();
    EventHandler::new(move |event, params| {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Value::from_json(&serde_json::to_value(event).unwrap_or_default()));
        args.extend(params.iter().map(Value::from_json));
        call_handler(&vm, &handler, &args);
    })
    .with_params(params)
}

pub(crate) fn bind_events(scope: &Scope, el: NodeId, events: &BTreeMap<String, EventBinding>) {
    for (kind, binding) in events {
        bind_event(scope, el, kind, binding);
    }
}

fn bind_event(scope: &Scope, el: NodeId, kind: &str, binding: &EventBinding) {
    let Some(app) = scope.vm().app() else {
        return;
    };
    let params = if binding.params.iter().any(Binding::is_dynamic) {
        let list = binding.params.clone();
        let expr = Expr::func(move |scope| Value::from(list.iter().map(|p| p.eval(scope)).collect::<Vec<_>>()));
        let weak = app.downgrade();
        let vm = scope.vm().clone();
        let handler = binding.handler.clone();
        let event = kind.to_string();
        // re-bind with fresh params; the host already knows the type
        watch(scope, el, expr, move |value| {
            if let Some(app) = weak.upgrade() {
                let params = value.to_json().as_array().cloned().unwrap_or_default();
                let handler = event_handler(&vm, &handler, params);
                report(app.with_doc(|doc| doc.add_event(el, &event, handler)), "event params");
            }
        })
        .to_json()
        .as_array()
        .cloned()
        .unwrap_or_default()
    } else {
        binding.params.iter().map(|p| p.eval(scope).to_json()).collect()
    };
    let handler = event_handler(scope.vm(), &binding.handler, params);
    report(app.with_doc(|doc| doc.add_event(el, kind, handler)), "event");
}

// ============================================================================
// Custom components
// ============================================================================

/// Props flow from the caller's bindings into the child's data
fn bind_props(scope: &Scope, child: &Vm, template: &Template, meta: &Meta) {
    for (key, binding) in &template.attr {
        if key == "static" || !child.def().is_prop(key) {
            continue;
        }
        let value = match binding {
            Binding::Static(json) => Value::from_json(json),
            Binding::Dynamic(expr) => {
                let data = child.data().clone();
                let prop = key.clone();
                watch_for_vm(scope, child, expr.clone(), move |value| {
                    data.set(&prop, value.clone());
                })
            }
        };
        child.data().set(key, value);
    }

    // old-style repeat items hand every field down
    if !scope.is_legacy() {
        return;
    }
    if let Some(Value::Object(item)) = &meta.repeat {
        for (key, _) in item.entries() {
            let data = child.data().clone();
            let prop = key.clone();
            let value = watch_for_vm(scope, child, Expr::path(key.clone()), move |value| {
                data.set(&prop, value.clone());
            });
            child.data().set(&key, value);
        }
    }
}

/// Instantiate a registered component: child view model, props, its own
/// template compiled at the destination, then the caller's class, style and
/// events applied to the child's root element
pub(crate) fn compile_component(
    app: &App,
    scope: &Scope,
    template: &Rc<Template>,
    def: Rc<ComponentDef>,
    dest: &Dest,
    meta: &Meta,
) -> Option<Target> {
    let parent = scope.vm().clone();
    let is_static = parent.is_static() || template.attr.contains_key("static");
    let slot = SlotContext {
        scope: scope.clone(),
        content: template.children.clone(),
    };
    let child = Vm::new(app, def.clone(), Some(&parent), Some(slot), is_static);
    tracing::debug!(parent = parent.id(), vm = child.id(), component = %def.name(), "instantiating component");

    child.init();
    bind_props(scope, &child, template, meta);
    child.fire_hook(Hook::Created);

    let Some(target) = compile(&Scope::root(&child), def.template(), dest, &Meta::default()) else {
        child.destroy();
        return None;
    };

    if let Target::Element(root) = &target {
        let root = *root;
        child.set_root_element(root);
        report(app.with_doc(|doc| doc.set_custom_component(root, true)), "custom component");
        if !template.class_list.is_empty() {
            bind_class(app, scope, root, &template.class_list);
        }
        for (key, binding) in &template.style {
            bind_style(app, scope, root, key, binding);
        }
        bind_events(scope, root, &template.events);
    }
    for (kind, binding) in &template.events {
        let caller = parent.downgrade();
        let handler = binding.handler.clone();
        child.on(kind, move |_, event| {
            if let Some(caller) = caller.upgrade() {
                call_handler(&caller, &handler, std::slice::from_ref(event.detail()));
            }
        });
    }

    let owned = child.clone();
    app.with_doc(|doc| doc.add_cleanup(target.first_node(), Box::new(move || owned.destroy())));
    parent.add_child(child.clone());
    if !app.is_aborted() {
        child.mark_ready();
    }
    Some(target)
}
