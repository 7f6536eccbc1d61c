//! View models
//!
//! A [`Vm`] is one component instance: reactive data, computed values,
//! methods, an event bus and the element subtree compiled from the
//! component's template. Child view models are owned by their parent and
//! destroyed with it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tessel_dom::NodeId;
use tessel_observe::{untracked, Computed, Object, Value, Watcher};

use crate::app::{App, WeakApp};
use crate::config::Environment;
use crate::context::Scope;
use crate::modules::ModuleProxy;
use crate::registry::{ComponentDef, Hook};
use crate::template::Template;

/// Event travelling over the view model bus
#[derive(Debug, Clone)]
pub struct VmEvent {
    kind: String,
    detail: Value,
    stopped: Cell<bool>,
}

impl VmEvent {
    pub fn new(kind: impl Into<String>, detail: Value) -> Self {
        Self {
            kind: kind.into(),
            detail,
            stopped: Cell::new(false),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Stop `dispatch` / `broadcast` from going further
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

type VmHandler = Rc<dyn Fn(&Vm, &VmEvent)>;

/// Content a custom component received from its caller
pub(crate) struct SlotContext {
    /// Scope the content is compiled against (the caller's)
    pub(crate) scope: Scope,
    pub(crate) content: Vec<Rc<Template>>,
}

pub(crate) struct VmInner {
    id: u64,
    app: WeakApp,
    def: Rc<ComponentDef>,
    data: Object,
    computed: RefCell<HashMap<String, Computed>>,
    parent: Option<Weak<VmInner>>,
    children: RefCell<Vec<Vm>>,
    root_element: Cell<Option<NodeId>>,
    ids: RefCell<HashMap<String, NodeId>>,
    events: RefCell<HashMap<String, Vec<(u64, VmHandler)>>>,
    next_handler: Cell<u64>,
    watchers: RefCell<Vec<Watcher>>,
    slot: Option<SlotContext>,
    is_static: bool,
    ready: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Component instance
#[derive(Clone)]
pub struct Vm(Rc<VmInner>);

/// Non-owning view model handle
#[derive(Clone)]
pub(crate) struct WeakVm(Weak<VmInner>);

impl WeakVm {
    pub(crate) fn upgrade(&self) -> Option<Vm> {
        self.0.upgrade().map(Vm)
    }
}

impl Vm {
    pub(crate) fn new(
        app: &App,
        def: Rc<ComponentDef>,
        parent: Option<&Vm>,
        slot: Option<SlotContext>,
        is_static: bool,
    ) -> Self {
        Self(Rc::new(VmInner {
            id: app.next_vm_id(),
            app: app.downgrade(),
            def,
            data: Object::new(),
            computed: RefCell::new(HashMap::new()),
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            children: RefCell::new(Vec::new()),
            root_element: Cell::new(None),
            ids: RefCell::new(HashMap::new()),
            events: RefCell::new(HashMap::new()),
            next_handler: Cell::new(1),
            watchers: RefCell::new(Vec::new()),
            slot,
            is_static,
            ready: Cell::new(false),
            destroyed: Cell::new(false),
        }))
    }

    pub(crate) fn downgrade(&self) -> WeakVm {
        WeakVm(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(a: &Vm, b: &Vm) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.0.def.name
    }

    pub(crate) fn def(&self) -> &Rc<ComponentDef> {
        &self.0.def
    }

    pub fn app(&self) -> Option<App> {
        self.0.app.upgrade()
    }

    pub fn data(&self) -> &Object {
        &self.0.data
    }

    pub fn parent(&self) -> Option<Vm> {
        self.0.parent.as_ref()?.upgrade().map(Vm)
    }

    pub fn children(&self) -> Vec<Vm> {
        self.0.children.borrow().clone()
    }

    /// First element compiled for this view model
    pub fn root_element(&self) -> Option<NodeId> {
        self.0.root_element.get()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.0.ids.borrow().get(id).copied()
    }

    /// Bindings are evaluated once, without watchers
    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    pub fn is_ready(&self) -> bool {
        self.0.ready.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Platform description of the owning instance
    pub fn config(&self) -> Environment {
        self.app().map(|app| app.config().env.clone()).unwrap_or_default()
    }

    pub fn require_module(&self, name: &str) -> ModuleProxy {
        ModuleProxy::new(self.0.app.clone(), name)
    }

    pub(crate) fn slot(&self) -> Option<&SlotContext> {
        self.0.slot.as_ref()
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Tracked lookup of a top-level name: data first, then computed values
    pub fn lookup(&self, name: &str) -> Value {
        if self.0.data.has(name) {
            return self.0.data.get(name);
        }
        let computed = self.0.computed.borrow().get(name).cloned();
        match computed {
            Some(computed) => computed.get(),
            // still tracked, so a later `set` of the key notifies
            None => self.0.data.get(name),
        }
    }

    /// Tracked read of a dotted path
    pub fn get(&self, path: &str) -> Value {
        match path.split_once('.') {
            Some((head, rest)) => self.lookup(head).get_path(rest),
            None => self.lookup(path),
        }
    }

    /// Write a dotted path. The container holding the last segment must
    /// already exist.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> bool {
        let Some((head, key)) = path.rsplit_once('.') else {
            return self.0.data.set(path, value);
        };
        match untracked(|| self.get(head)) {
            Value::Object(object) => object.set(key, value),
            Value::Array(array) => match key.parse::<usize>() {
                Ok(index) => array.set(index, value),
                Err(_) => false,
            },
            _ => {
                tracing::warn!(vm = self.0.id, path, "cannot set path, no container at `{}`", head);
                false
            }
        }
    }

    /// Call a method of the component definition
    pub fn call(&self, method: &str, args: &[Value]) -> Option<Value> {
        let Some(f) = self.0.def.methods.get(method).cloned() else {
            tracing::warn!(vm = self.0.id, component = %self.0.def.name, method, "unknown method");
            return None;
        };
        Some(f(self, args))
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Listen to a bus event; returns a handle for [`off`](Self::off)
    pub fn on(&self, kind: &str, handler: impl Fn(&Vm, &VmEvent) + 'static) -> u64 {
        let id = self.0.next_handler.get();
        self.0.next_handler.set(id + 1);
        self.0
            .events
            .borrow_mut()
            .entry(kind.to_string())
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Remove one handler, or every handler of `kind` when `handler` is None
    pub fn off(&self, kind: &str, handler: Option<u64>) {
        let mut events = self.0.events.borrow_mut();
        match handler {
            Some(handler) => {
                if let Some(handlers) = events.get_mut(kind) {
                    handlers.retain(|(id, _)| *id != handler);
                }
            }
            None => {
                events.remove(kind);
            }
        }
    }

    fn fire(&self, event: &VmEvent) {
        let handlers: Vec<VmHandler> = self
            .0
            .events
            .borrow()
            .get(&event.kind)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(self, event);
        }
    }

    /// Run this view model's handlers only
    pub fn emit(&self, kind: &str, detail: impl Into<Value>) -> VmEvent {
        let event = VmEvent::new(kind, detail.into());
        self.fire(&event);
        event
    }

    /// Run handlers here, then on each ancestor until one stops the event
    pub fn dispatch(&self, kind: &str, detail: impl Into<Value>) -> VmEvent {
        let event = VmEvent::new(kind, detail.into());
        let mut current = Some(self.clone());
        while let Some(vm) = current {
            vm.fire(&event);
            if event.is_stopped() {
                break;
            }
            current = vm.parent();
        }
        event
    }

    /// Run handlers here, then depth-first on every descendant until one
    /// stops the event
    pub fn broadcast(&self, kind: &str, detail: impl Into<Value>) -> VmEvent {
        let event = VmEvent::new(kind, detail.into());
        self.broadcast_event(&event);
        event
    }

    fn broadcast_event(&self, event: &VmEvent) {
        self.fire(event);
        for child in self.children() {
            if event.is_stopped() {
                return;
            }
            child.broadcast_event(event);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub(crate) fn fire_hook(&self, hook: Hook) {
        tracing::debug!(vm = self.0.id, component = %self.0.def.name, hook = hook.as_str(), "lifecycle");
        let hooks = self.0.def.hooks.get(&hook).cloned().unwrap_or_default();
        for f in hooks {
            f(self);
        }
        self.emit(&format!("hook:{}", hook.as_str()), Value::Null);
    }

    /// `init` hook, then initial data and computed values
    pub(crate) fn init(&self) {
        self.fire_hook(Hook::Init);
        if let serde_json::Value::Object(data) = &self.0.def.data {
            self.0.data.merge_json(data);
        }
        let mut computed = self.0.computed.borrow_mut();
        for (name, f) in &self.0.def.computed {
            let vm = self.downgrade();
            let f = f.clone();
            computed.insert(
                name.clone(),
                Computed::new(move || vm.upgrade().map(|vm| f(&vm)).unwrap_or_default()),
            );
        }
    }

    pub(crate) fn mark_ready(&self) {
        self.0.ready.set(true);
        self.fire_hook(Hook::Ready);
    }

    pub(crate) fn set_root_element(&self, el: NodeId) {
        if self.0.root_element.get().is_none() {
            self.0.root_element.set(Some(el));
        }
    }

    pub(crate) fn register_id(&self, id: &str, el: NodeId) {
        self.0.ids.borrow_mut().insert(id.to_string(), el);
    }

    pub(crate) fn unregister_id(&self, id: &str, el: NodeId) {
        let mut ids = self.0.ids.borrow_mut();
        if ids.get(id) == Some(&el) {
            ids.remove(id);
        }
    }

    pub(crate) fn add_watcher(&self, watcher: Watcher) {
        let mut watchers = self.0.watchers.borrow_mut();
        watchers.retain(Watcher::is_active);
        watchers.push(watcher);
    }

    /// Live watchers owned by this view model
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().iter().filter(|w| w.is_active()).count()
    }

    pub(crate) fn add_child(&self, child: Vm) {
        self.0.children.borrow_mut().push(child);
    }

    /// Tear down watchers and child view models, then run `destroyed`.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in watchers {
            watcher.teardown();
        }
        let computed = std::mem::take(&mut *self.0.computed.borrow_mut());
        for computed in computed.values() {
            computed.teardown();
        }
        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in children {
            child.destroy();
        }
        self.fire_hook(Hook::Destroyed);
        self.0.events.borrow_mut().clear();
        self.0.ids.borrow_mut().clear();
        if let Some(parent) = self.parent() {
            parent.0.children.borrow_mut().retain(|c| !Rc::ptr_eq(&c.0, &self.0));
        }
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.0.id)
            .field("component", &self.0.def.name)
            .field("root_element", &self.0.root_element.get())
            .field("children", &self.0.children.borrow().len())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}
