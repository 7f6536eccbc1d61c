//! Integration tests for tessel-runtime
//!
//! Whole instances against a recording host: compile output, reactive
//! updates, list reconciliation, components and instance lifecycle.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tessel_runtime::dom::{AppendMode, DomAction, NativeComponent, NodeId, RecordingHost, BODY_REF};
use tessel_runtime::observe::{observe, Value};
use tessel_runtime::{
    App, AppError, Binding, ComponentDef, Config, Environment, EventBinding, Expr, Hook, Repeat, Stylesheet,
    Template, Vm,
};

fn setup() -> (App, RecordingHost) {
    let host = RecordingHost::new();
    let app = App::new("test", Rc::new(host.clone()), Config::default());
    (app, host)
}

fn boot(app: &App, def: ComponentDef, data: serde_json::Value) -> Vm {
    let name = def.name().to_string();
    app.register_component(def);
    app.boot(&name, data).unwrap()
}

fn body(app: &App) -> NodeId {
    app.document().body().unwrap()
}

/// `value` attribute of every element child
fn texts(app: &App, parent: NodeId) -> Vec<String> {
    let doc = app.document();
    doc.pure_children(parent)
        .iter()
        .map(|id| doc.attr(*id, "value").and_then(|v| v.as_str()).unwrap_or_default().to_string())
        .collect()
}

fn keyed_list() -> ComponentDef {
    ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("text")
                .repeat(Repeat::new(Expr::path("items")).value("item").track_by("id"))
                .bind_attr("value", Binding::path("item.n")),
        ),
    )
}

fn items(ids: &[u32]) -> Value {
    observe(&json!(ids.iter().map(|id| json!({"id": id, "n": format!("n{id}")})).collect::<Vec<_>>()))
}

// ============================================================================
// Compile output
// ============================================================================

#[test]
fn test_repeat_end_to_end() {
    let (app, host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("text")
                .repeat(Repeat::new(Expr::func(|_| observe(&json!([1, 2, 3])))).key("i").value("v"))
                .bind_attr("value", Binding::path("v")),
        ),
    );
    boot(&app, page, json!({}));

    assert!(host.calls()[0].is(DomAction::CreateBody));
    let adds = host.calls_for(DomAction::AddElement);
    assert_eq!(adds.len(), 3);
    for (i, add) in adds.iter().enumerate() {
        assert_eq!(add.args[0], json!(BODY_REF));
        assert_eq!(add.args[2], json!(i));
        assert_eq!(add.args[1]["attr"]["value"], json!(i + 1));
    }
    assert_eq!(app.document().pure_children(body(&app)).len(), 3);
}

#[test]
fn test_root_element_is_body() {
    let (app, _host) = setup();
    let vm = boot(&app, ComponentDef::new("page", Template::new("scroller")), json!({}));
    assert_eq!(vm.root_element(), Some(body(&app)));
    assert_eq!(app.document().node_ref(body(&app)), Some(BODY_REF));
}

#[test]
fn test_tree_mode_sends_subtree_once() {
    let (app, host) = setup();
    app.register_native(NativeComponent::new("list").with_append(AppendMode::Tree));
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("list").children((0..3).map(|i| Template::new("cell").attr("value", i)))),
    );
    boot(&app, page, json!({}));

    let adds = host.calls_for(DomAction::AddElement);
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].args[1]["type"], json!("list"));
    assert_eq!(adds[0].args[1]["children"].as_array().map(Vec::len), Some(3));
    assert_eq!(adds[0].args[1]["attr"]["append"], json!("tree"));
}

#[test]
fn test_nested_tree_mode_marker_is_scoped() {
    let (app, host) = setup();
    for tag in ["outer", "inner", "second"] {
        app.register_native(NativeComponent::new(tag).with_append(AppendMode::Tree));
    }
    let page = ComponentDef::new(
        "page",
        Template::new("div")
            .child(Template::new("outer").child(Template::new("inner").child(Template::new("cell"))))
            .child(Template::new("second").child(Template::new("cell"))),
    );
    boot(&app, page, json!({}));

    let adds = host.calls_for(DomAction::AddElement);
    let types: Vec<_> = adds.iter().map(|add| add.args[1]["type"].clone()).collect();
    assert_eq!(types, vec![json!("outer"), json!("second")]);
    assert_eq!(adds[0].args[1]["children"][0]["type"], json!("inner"));
    assert_eq!(adds[0].args[1]["children"][0]["children"][0]["type"], json!("cell"));
    assert_eq!(adds[1].args[1]["children"][0]["type"], json!("cell"));
    assert_eq!(app.document().pure_children(body(&app)).len(), 2);
}

#[test]
fn test_styles_from_stylesheet() {
    let (app, _host) = setup();
    let sheet = Stylesheet::new()
        .rule("text", json!({"color": "red"}))
        .rule(".big", json!({"fontSize": 40, "margin": 2}))
        .rule("#title", json!({"fontSize": 30}));
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("text").id("title").bind_class(Binding::path("cls"))),
    )
    .with_style(sheet)
    .with_data(json!({"cls": "big"}));
    let vm = boot(&app, page, json!({}));

    let title = vm.element_by_id("title").unwrap();
    let style = app.document().resolved_style(title);
    assert_eq!(style["color"], json!("red"));
    assert_eq!(style["fontSize"], json!(30));
    assert_eq!(style["margin"], json!(2));
    assert_eq!(app.document().element(title).unwrap().id(), Some("title"));
}

#[test]
fn test_component_from_json() {
    let (app, _host) = setup();
    app.register_component_json(
        "page",
        r#"{
            "template": {"type": "div", "children": [{
                "type": "text",
                "repeat": {"expression": {"@binding": "items"}, "value": "it"},
                "attr": {"value": {"@binding": "it"}}
            }]},
            "data": {"items": ["x", "y"]}
        }"#,
    )
    .unwrap();
    app.boot("page", json!({})).unwrap();
    assert_eq!(texts(&app, body(&app)), vec!["x", "y"]);
    assert!(matches!(
        app.register_component_json("bad", "{"),
        Err(AppError::Template(_))
    ));
}

// ============================================================================
// Reactive updates
// ============================================================================

#[test]
fn test_attr_binding_updates_synchronously() {
    let (app, host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("text").bind_attr("value", Binding::path("title"))),
    )
    .with_data(json!({"title": "a"}));
    let vm = boot(&app, page, json!({}));
    host.clear();

    vm.set("title", "b");
    let updates = host.calls_for(DomAction::UpdateAttrs);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].args[1], json!({"value": "b"}));

    // unchanged value: nothing sent
    vm.set("title", "b");
    assert_eq!(host.count(DomAction::UpdateAttrs), 1);
}

#[test]
fn test_computed_binding() {
    let (app, _host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("text").bind_attr("value", Binding::path("double"))),
    )
    .with_data(json!({"n": 2}))
    .computed("double", |vm| Value::from(vm.get("n").as_f64().unwrap_or(0.0) * 2.0));
    let vm = boot(&app, page, json!({}));
    let text = app.document().pure_children(body(&app))[0];
    assert_eq!(app.document().attr(text, "value"), Some(&json!(4)));

    vm.set("n", 5);
    assert_eq!(app.document().attr(text, "value"), Some(&json!(10)));
}

#[test]
fn test_refresh_merges_root_data() {
    let (app, _host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("text").bind_attr("value", Binding::path("title"))),
    );
    boot(&app, page, json!({"title": "a"}));
    app.refresh(json!({"title": "b"})).unwrap();
    assert_eq!(texts(&app, body(&app)), vec!["b"]);
    assert!(matches!(app.refresh(json!(3)), Err(AppError::InvalidData(_))));
}

#[test]
fn test_shown_toggles_region() {
    let (app, host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("text").attr("value", "hi").shown(Expr::path("visible"))),
    )
    .with_data(json!({"visible": false}));
    let vm = boot(&app, page, json!({}));
    assert_eq!(host.count(DomAction::AddElement), 0);

    host.clear();
    app.update(|| vm.set("visible", true));
    assert_eq!(host.count(DomAction::AddElement), 1);
    assert_eq!(texts(&app, body(&app)), vec!["hi"]);

    // flipped back and forth in one wave: nothing to do
    host.clear();
    app.update(|| {
        vm.set("visible", false);
        vm.set("visible", true);
    });
    assert!(host.is_empty());

    app.update(|| vm.set("visible", false));
    assert_eq!(host.count(DomAction::RemoveElement), 1);
    assert!(app.document().pure_children(body(&app)).is_empty());
}

#[test]
fn test_dynamic_type_rebuilds_element() {
    let (app, host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::dynamic(Expr::path("kind")).attr("value", "x")),
    )
    .with_data(json!({"kind": "text"}));
    let vm = boot(&app, page, json!({}));
    let first = app.document().pure_children(body(&app))[0];
    assert_eq!(app.document().element(first).unwrap().tag(), "text");

    host.clear();
    app.update(|| vm.set("kind", "image"));
    assert_eq!(host.count(DomAction::RemoveElement), 1);
    let adds = host.calls_for(DomAction::AddElement);
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].args[1]["type"], json!("image"));
    assert!(!app.document().contains(first));
}

// ============================================================================
// List reconciliation
// ============================================================================

#[test]
fn test_keyed_reorder_only_moves() {
    let (app, host) = setup();
    let vm = boot(&app, keyed_list(), json!({}));
    app.update(|| vm.set("items", items(&[1, 2, 3])));
    let before = app.document().pure_children(body(&app)).to_vec();
    assert_eq!(before.len(), 3);

    host.clear();
    app.update(|| vm.set("items", items(&[3, 1, 2])));
    assert_eq!(host.count(DomAction::AddElement), 0);
    assert_eq!(host.count(DomAction::RemoveElement), 0);
    assert!(host.count(DomAction::MoveElement) >= 1);
    assert_eq!(
        app.document().pure_children(body(&app)),
        &[before[2], before[0], before[1]]
    );
    assert_eq!(texts(&app, body(&app)), vec!["n3", "n1", "n2"]);
}

#[test]
fn test_keyed_partial_overlap() {
    let (app, host) = setup();
    let vm = boot(&app, keyed_list(), json!({}));
    app.update(|| vm.set("items", items(&[1, 2, 3])));
    let before = app.document().pure_children(body(&app)).to_vec();

    host.clear();
    app.update(|| vm.set("items", items(&[2, 3, 4, 5])));
    assert_eq!(host.count(DomAction::RemoveElement), 1);
    assert_eq!(host.count(DomAction::AddElement), 2);
    assert_eq!(host.count(DomAction::MoveElement), 0);
    let after = app.document().pure_children(body(&app)).to_vec();
    assert_eq!(&after[..2], &before[1..]);
    assert_eq!(texts(&app, body(&app)), vec!["n2", "n3", "n4", "n5"]);
}

#[test]
fn test_index_keys_reuse_by_position() {
    let (app, host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("text")
                .repeat(Repeat::new(Expr::path("items")).value("item"))
                .bind_attr("value", Binding::path("item")),
        ),
    )
    .with_data(json!({"items": ["a", "b", "c"]}));
    let vm = boot(&app, page, json!({}));
    let before = app.document().pure_children(body(&app)).to_vec();

    host.clear();
    app.update(|| vm.set("items", observe(&json!(["x", "a", "b", "c"]))));
    assert_eq!(host.count(DomAction::AddElement), 1);
    assert_eq!(host.count(DomAction::RemoveElement), 0);
    assert_eq!(host.count(DomAction::UpdateAttrs), 3);
    assert_eq!(&app.document().pure_children(body(&app))[..3], &before[..]);
    assert_eq!(texts(&app, body(&app)), vec!["x", "a", "b", "c"]);
}

#[test]
fn test_writes_in_one_wave_coalesce() {
    let (app, host) = setup();
    let vm = boot(&app, keyed_list(), json!({}));
    app.update(|| vm.set("items", items(&[1, 2, 3])));

    host.clear();
    app.update(|| {
        vm.set("items", items(&[4]));
        vm.set("items", items(&[5, 6]));
        vm.set("items", items(&[1, 2, 3]));
    });
    // only the last list is reconciled, and it matches what is shown
    assert!(host.is_empty());
}

#[test]
fn test_array_mutation_updates_list() {
    let (app, host) = setup();
    let vm = boot(&app, keyed_list(), json!({}));
    app.update(|| vm.set("items", items(&[1])));
    host.clear();

    let list = vm.get("items");
    let list = list.as_array().unwrap();
    app.update(|| {
        list.push(observe(&json!({"id": 2, "n": "n2"})));
        list.insert(0, observe(&json!({"id": 0, "n": "n0"})));
    });
    assert_eq!(host.count(DomAction::AddElement), 2);
    assert_eq!(texts(&app, body(&app)), vec!["n0", "n1", "n2"]);
}

#[test]
fn test_legacy_repeat_exposes_item_fields() {
    let (app, _host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("text")
                .repeat(Repeat::legacy(Expr::path("rows")))
                .bind_attr("value", Binding::path("name"))
                .bind_attr("index", Binding::path("$index")),
        ),
    )
    .with_data(json!({"rows": [{"name": "a"}, {"name": "b"}]}));
    boot(&app, page, json!({}));
    assert_eq!(texts(&app, body(&app)), vec!["a", "b"]);
    let second = app.document().pure_children(body(&app))[1];
    assert_eq!(app.document().attr(second, "index"), Some(&json!(1)));
}

// ============================================================================
// Components
// ============================================================================

fn card() -> ComponentDef {
    ComponentDef::new(
        "card",
        Template::new("div")
            .class("card")
            .child(Template::new("text").bind_attr("value", Binding::path("title")))
            .child(Template::new("slot")),
    )
    .with_props(["title"])
    .with_style(Stylesheet::new().rule(".card", json!({"padding": 10})))
}

#[test]
fn test_component_props_and_slot() {
    let (app, _host) = setup();
    app.register_component(card());
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("card")
                .bind_attr("title", Binding::path("heading"))
                .attr("extra", 1)
                .child(Template::new("image").attr("src", "a.png")),
        ),
    )
    .with_data(json!({"heading": "Hello"}));
    let vm = boot(&app, page, json!({}));

    let children = vm.children();
    assert_eq!(children.len(), 1);
    let card = &children[0];
    assert_eq!(card.name(), "card");
    assert!(card.is_ready());
    assert_eq!(card.data().peek("title"), Some(Value::from("Hello")));
    assert!(!card.data().has("extra"));

    let root = card.root_element().unwrap();
    {
        let doc = app.document();
        assert!(doc.element(root).unwrap().is_custom_component());
        assert_eq!(doc.resolved_style(root)["padding"], json!(10));
        let kids = doc.pure_children(root);
        assert_eq!(kids.len(), 2);
        assert_eq!(doc.element(kids[1]).unwrap().tag(), "image");
    }

    app.update(|| vm.set("heading", "Bye"));
    assert_eq!(texts(&app, root)[0], "Bye");
}

#[test]
fn test_component_events_reach_caller_methods() {
    let (app, _host) = setup();
    app.register_component(card());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(Template::new("card").on("select", EventBinding::method("onSelect"))),
    )
    .method("onSelect", move |_, args| {
        log.borrow_mut().push(args.first().cloned().unwrap_or_default());
        Value::Null
    });
    let vm = boot(&app, page, json!({}));
    let card = vm.children().remove(0);

    card.emit("select", "x");
    assert_eq!(seen.borrow().as_slice(), &[Value::from("x")]);

    // also bound as a native event on the component's root element
    let root_ref = app.document().node_ref(card.root_element().unwrap()).unwrap().to_string();
    assert!(app.fire_event(&root_ref, "select", json!({"n": 1}), None).unwrap());
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(seen.borrow()[1].get("type"), Value::from("select"));
}

#[test]
fn test_dispatch_and_broadcast() {
    let (app, _host) = setup();
    app.register_component(card());
    let vm = boot(
        &app,
        ComponentDef::new("page", Template::new("div").child(Template::new("card"))),
        json!({}),
    );
    let card = vm.children().remove(0);
    let order = Rc::new(RefCell::new(Vec::new()));
    for (target, name) in [(&vm, "page"), (&card, "card")] {
        let log = order.clone();
        target.on("ping", move |_, _| log.borrow_mut().push(name));
    }

    card.dispatch("ping", 1);
    assert_eq!(*order.borrow(), vec!["card", "page"]);

    order.borrow_mut().clear();
    vm.broadcast("ping", 2);
    assert_eq!(*order.borrow(), vec!["page", "card"]);

    order.borrow_mut().clear();
    card.on("ping", |_, event| event.stop());
    let event = card.dispatch("ping", 3);
    assert!(event.is_stopped());
    assert_eq!(*order.borrow(), vec!["card"]);

    order.borrow_mut().clear();
    vm.off("ping", None);
    card.dispatch("ping", 4);
    assert_eq!(*order.borrow(), vec!["card"]);
}

#[test]
fn test_static_component_has_no_watchers() {
    let (app, _host) = setup();
    app.register_component(card());
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("card")
                .attr("static", true)
                .bind_attr("title", Binding::path("heading")),
        ),
    )
    .with_data(json!({"heading": "a"}));
    let vm = boot(&app, page, json!({}));
    let card = vm.children().remove(0);
    assert!(card.is_static());
    assert_eq!(card.watcher_count(), 0);

    app.update(|| vm.set("heading", "b"));
    assert_eq!(texts(&app, card.root_element().unwrap())[0], "a");
}

#[test]
fn test_lifecycle_hooks_in_order() {
    let (app, _host) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut page = ComponentDef::new("page", Template::new("div")).with_data(json!({"n": 1}));
    for hook in [Hook::Init, Hook::Created, Hook::Ready, Hook::Destroyed] {
        let log = log.clone();
        page = page.hook(hook, move |vm| log.borrow_mut().push((hook, vm.get("n"))));
    }
    boot(&app, page, json!({}));
    assert_eq!(
        *log.borrow(),
        vec![
            (Hook::Init, Value::Null),
            (Hook::Created, Value::from(1)),
            (Hook::Ready, Value::from(1)),
        ]
    );
    app.destroy();
    assert_eq!(log.borrow().last().map(|(hook, _)| *hook), Some(Hook::Destroyed));
}

// ============================================================================
// Instance
// ============================================================================

#[test]
fn test_fire_event_runs_method_with_params() {
    let (app, _host) = setup();
    let page = ComponentDef::new(
        "page",
        Template::new("div").child(
            Template::new("button")
                .id("btn")
                .on("click", EventBinding::method("tap").with_params(vec![Binding::value("p"), Binding::path("count")])),
        ),
    )
    .with_data(json!({"count": 0}))
    .method("tap", |vm, args| {
        let count = vm.get("count").as_f64().unwrap_or(0.0);
        vm.set("count", count + 1.0);
        vm.set("args", args.len());
        vm.set("kind", args[0].get("type"));
        vm.set("last", args[2].clone());
        Value::Null
    });
    let vm = boot(&app, page, json!({}));
    let button = vm.element_by_id("btn").unwrap();
    let node_ref = app.document().node_ref(button).unwrap().to_string();

    assert!(app.fire_event(&node_ref, "click", json!({"x": 1}), None).unwrap());
    assert_eq!(vm.get("count"), Value::from(1));
    assert_eq!(vm.get("args"), Value::from(3));
    assert_eq!(vm.get("kind"), Value::from("click"));
    assert_eq!(vm.get("last"), Value::from(0));

    // params were re-bound after `count` changed
    app.fire_event(&node_ref, "click", json!(null), None).unwrap();
    assert_eq!(vm.get("last"), Value::from(1));

    assert!(!app.fire_event(&node_ref, "longpress", json!(null), None).unwrap());
    assert!(matches!(
        app.fire_event("missing", "click", json!(null), None),
        Err(AppError::UnknownRef(_))
    ));
}

#[test]
fn test_modules_fail_soft() {
    let (app, host) = setup();
    app.register_module("modal", ["toast"]);
    let vm = boot(&app, ComponentDef::new("page", Template::new("div")), json!({}));
    host.clear();

    let modal = vm.require_module("modal");
    assert!(modal.is_available());
    assert!(!modal.call("toast", vec![json!("hi")]).is_abort());
    let calls = host.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].module, "modal");
    assert_eq!(calls[0].method, "toast");
    assert_eq!(calls[0].args, vec![json!("hi")]);

    assert!(!modal.call("alert", vec![]).is_abort());
    assert!(!app.require_module("stream").is_available());
    assert!(!app.require_module("stream").call("fetch", vec![]).is_abort());
    assert_eq!(host.len(), 1);
}

#[test]
fn test_environment_visible_to_vm() {
    let host = RecordingHost::new();
    let config = Config::default().with_env(Environment::new("ios").with_device(750.0, 1334.0, 2.0));
    let app = App::new("env", Rc::new(host), config);
    let vm = boot(&app, ComponentDef::new("page", Template::new("div")), json!({}));
    assert_eq!(vm.config().platform, "ios");
    assert_eq!(vm.config().device_width, 750.0);
}

#[test]
fn test_destroy_is_idempotent() {
    let (app, host) = setup();
    let vm = boot(&app, keyed_list(), json!({}));
    app.update(|| vm.set("items", items(&[1, 2, 3])));
    assert!(vm.watcher_count() > 0);

    app.destroy();
    app.destroy();
    assert!(app.is_destroyed());
    assert!(vm.is_destroyed());
    assert_eq!(vm.watcher_count(), 0);
    assert!(app.document().is_empty());

    host.clear();
    vm.set("items", items(&[4]));
    assert!(app.flush().is_abort());
    assert!(host.is_empty());
    assert!(matches!(app.boot("page", json!({})), Err(AppError::Destroyed(_))));
    assert!(matches!(app.refresh(json!({})), Err(AppError::Destroyed(_))));
}

#[test]
fn test_boot_errors() {
    let (app, _host) = setup();
    assert!(matches!(app.boot("nope", json!({})), Err(AppError::UnknownComponent(_))));
    app.register_component(ComponentDef::new("page", Template::new("div")));
    assert!(matches!(app.boot("page", json!([1])), Err(AppError::InvalidData(_))));
    app.boot("page", json!(null)).unwrap();
    assert!(matches!(app.boot("page", json!({})), Err(AppError::AlreadyBooted)));
}
