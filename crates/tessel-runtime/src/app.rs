//! Application instance
//!
//! An [`App`] owns everything one running page needs: its document and
//! native listener, the update scheduler, component and module registries,
//! and the root view model. All compiler state that would otherwise be
//! global (the tree-mode marker, id counters, the abort flag) lives here, so
//! instances are independent of each other.

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value as Json;
use tessel_dom::{Document, DomChanges, Listener, NativeComponent, NativeHost, NodeId, Signal};

use crate::compiler::{self, Dest, Meta};
use crate::config::Config;
use crate::context::Scope;
use crate::differ::Differ;
use crate::modules::{ModuleProxy, ModuleRegistry};
use crate::registry::{ComponentDef, ComponentRegistry, Hook, TypeHandler};
use crate::vm::Vm;
use crate::AppError;

pub(crate) struct AppInner {
    id: String,
    config: Config,
    doc: RefCell<Document>,
    differ: Differ,
    components: RefCell<ComponentRegistry>,
    modules: RefCell<ModuleRegistry>,
    root_vm: RefCell<Option<Vm>>,
    tree_mode_parent: Cell<Option<NodeId>>,
    next_block_id: Cell<u64>,
    next_vm_id: Cell<u64>,
    destroyed: Cell<bool>,
}

impl Drop for AppInner {
    fn drop(&mut self) {
        // watchers and view models only release each other on teardown
        self.differ.clear();
        if let Some(vm) = self.root_vm.get_mut().take() {
            tracing::debug!(instance = %self.id, "instance dropped without destroy");
            vm.destroy();
        }
    }
}

/// One running instance
///
/// Dropping the last handle tears the view models down like
/// [`destroy`](App::destroy), without the native messages.
#[derive(Clone)]
pub struct App(Rc<AppInner>);

/// Non-owning instance handle, held by closures stored inside the instance
#[derive(Clone)]
pub(crate) struct WeakApp(Weak<AppInner>);

impl WeakApp {
    pub(crate) fn upgrade(&self) -> Option<App> {
        self.0.upgrade().map(App)
    }
}

impl App {
    /// Create an instance sending its native calls to `host`
    pub fn new(id: impl Into<String>, host: Rc<dyn NativeHost>, config: Config) -> Self {
        let id = id.into();
        let listener = Listener::new(id.clone(), host).with_batching(config.batch_native_calls);
        tracing::info!(instance = %id, batched = config.batch_native_calls, "created instance");
        Self(Rc::new(AppInner {
            id,
            config,
            doc: RefCell::new(Document::new(listener)),
            differ: Differ::new(),
            components: RefCell::new(ComponentRegistry::default()),
            modules: RefCell::new(ModuleRegistry::default()),
            root_vm: RefCell::new(None),
            tree_mode_parent: Cell::new(None),
            next_block_id: Cell::new(1),
            next_vm_id: Cell::new(1),
            destroyed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub(crate) fn downgrade(&self) -> WeakApp {
        WeakApp(Rc::downgrade(&self.0))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub fn register_component(&self, def: ComponentDef) {
        self.0.components.borrow_mut().register(def);
    }

    /// Register a component given as JSON (see [`ComponentDef::from_json`])
    pub fn register_component_json(&self, name: &str, json: &str) -> Result<(), AppError> {
        let def = ComponentDef::from_json(name, json)?;
        self.register_component(def);
        Ok(())
    }

    /// Register a native element type and its defaults
    pub fn register_native(&self, component: NativeComponent) {
        self.with_doc(|doc| doc.register_native(component));
    }

    /// Advertise a platform module and its methods
    pub fn register_module<I, S>(&self, name: &str, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.modules.borrow_mut().register(name, methods);
    }

    /// Advertise several modules at once
    pub fn register_modules<I, M, S>(&self, modules: I)
    where
        I: IntoIterator<Item = (String, M)>,
        M: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (name, methods) in modules {
            self.register_module(&name, methods);
        }
    }

    pub fn require_module(&self, name: &str) -> ModuleProxy {
        ModuleProxy::new(self.downgrade(), name)
    }

    pub(crate) fn modules(&self) -> Ref<'_, ModuleRegistry> {
        self.0.modules.borrow()
    }

    pub(crate) fn resolve_type(&self, tag: &str) -> TypeHandler {
        self.0.components.borrow().resolve(tag)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the root view model from a registered component and compile
    /// it into the document. `data` is merged over the component's own data.
    pub fn boot(&self, component: &str, data: Json) -> Result<Vm, AppError> {
        if self.is_destroyed() {
            return Err(AppError::Destroyed(self.0.id.clone()));
        }
        if self.0.root_vm.borrow().is_some() {
            return Err(AppError::AlreadyBooted);
        }
        let def = self
            .0
            .components
            .borrow()
            .get(component)
            .ok_or_else(|| AppError::UnknownComponent(component.to_string()))?;
        let data = match data {
            Json::Object(map) => map,
            Json::Null => serde_json::Map::new(),
            other => return Err(AppError::InvalidData(other.to_string())),
        };

        tracing::info!(instance = %self.0.id, component, "booting instance");
        let vm = Vm::new(self, def.clone(), None, None, false);
        self.0.root_vm.replace(Some(vm.clone()));
        vm.init();
        vm.data().merge_json(&data);
        vm.fire_hook(Hook::Created);
        compiler::compile(
            &Scope::root(&vm),
            def.template(),
            &Dest::Element(NodeId::DOCUMENT_ELEMENT),
            &Meta::default(),
        );
        if !self.is_aborted() {
            vm.mark_ready();
        }
        self.flush();
        Ok(vm)
    }

    pub fn root_vm(&self) -> Option<Vm> {
        self.0.root_vm.borrow().clone()
    }

    /// Run `f` as one update wave: every region it invalidates is updated
    /// once, afterwards
    pub fn update<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = f();
        self.flush();
        result
    }

    /// Run pending region updates, then send queued native calls
    pub fn flush(&self) -> Signal {
        if self.is_destroyed() {
            return Signal::Abort;
        }
        self.0.differ.flush(self.0.config.max_flush_rounds);
        self.with_doc(|doc| doc.listener_mut().flush())
    }

    /// Run `f` once the next flush has applied every pending update
    pub fn after_flush(&self, f: impl FnOnce() + 'static) {
        self.0.differ.then(f);
    }

    /// Merge fresh data into the root view model and flush
    pub fn refresh(&self, data: Json) -> Result<(), AppError> {
        if self.is_destroyed() {
            return Err(AppError::Destroyed(self.0.id.clone()));
        }
        let vm = self.root_vm().ok_or(AppError::NotBooted)?;
        let Json::Object(data) = data else {
            return Err(AppError::InvalidData(data.to_string()));
        };
        tracing::debug!(instance = %self.0.id, keys = data.len(), "refreshing data");
        self.update(|| vm.data().merge_json(&data));
        Ok(())
    }

    /// Deliver an event from the host to the element `node_ref`. Changes
    /// the host already applied are installed first. Returns whether a
    /// handler ran.
    pub fn fire_event(
        &self,
        node_ref: &str,
        kind: &str,
        data: Json,
        changes: Option<DomChanges>,
    ) -> Result<bool, AppError> {
        if self.is_destroyed() {
            return Err(AppError::Destroyed(self.0.id.clone()));
        }
        let node = self
            .document()
            .get_ref(node_ref)
            .ok_or_else(|| AppError::UnknownRef(node_ref.to_string()))?;
        let dispatch = self.with_doc(|doc| doc.fire_event(node, kind, data, changes.as_ref()))?;
        let handled = dispatch.is_some();
        if let Some(dispatch) = dispatch {
            self.update(|| dispatch.run());
        }
        Ok(handled)
    }

    /// Call a method of a native element type
    pub fn call_element_method(&self, node_ref: &str, method: &str, args: Vec<Json>) -> Result<Signal, AppError> {
        if self.is_destroyed() {
            return Err(AppError::Destroyed(self.0.id.clone()));
        }
        let node = self
            .document()
            .get_ref(node_ref)
            .ok_or_else(|| AppError::UnknownRef(node_ref.to_string()))?;
        Ok(self.with_doc(|doc| doc.call_method(node, method, args))?)
    }

    /// Tear the instance down: any compile in progress stops at its next
    /// check, pending updates are dropped, the root view model and every
    /// node are destroyed. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        tracing::info!(instance = %self.0.id, "destroying instance");
        self.with_doc(|doc| doc.listener_mut().abort());
        self.0.differ.clear();
        let root = self.0.root_vm.borrow_mut().take();
        if let Some(vm) = root {
            vm.destroy();
        }
        self.with_doc(Document::destroy_all);
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    pub fn last_signal(&self) -> Signal {
        self.0
            .doc
            .try_borrow()
            .map(|doc| doc.last_signal())
            .unwrap_or(Signal::Continue)
    }

    /// Compilation must stop: destroyed, or the host answered abort
    pub(crate) fn is_aborted(&self) -> bool {
        self.is_destroyed() || self.last_signal().is_abort()
    }

    // ========================================================================
    // Document access
    // ========================================================================

    /// Read-only view of the document
    pub fn document(&self) -> Ref<'_, Document> {
        self.0.doc.borrow()
    }

    /// Run `f` on the document, then run the cleanups it released. The
    /// document is no longer borrowed when cleanups run.
    pub(crate) fn with_doc<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let (result, cleanups) = {
            let mut doc = self.0.doc.borrow_mut();
            let result = f(&mut doc);
            (result, doc.take_cleanups())
        };
        for cleanup in cleanups {
            cleanup();
        }
        result
    }

    pub(crate) fn differ(&self) -> &Differ {
        &self.0.differ
    }

    pub(crate) fn tree_mode_parent(&self) -> Option<NodeId> {
        self.0.tree_mode_parent.get()
    }

    pub(crate) fn set_tree_mode_parent(&self, parent: Option<NodeId>) {
        self.0.tree_mode_parent.set(parent);
    }

    pub(crate) fn next_block_id(&self) -> u64 {
        let id = self.0.next_block_id.get();
        self.0.next_block_id.set(id + 1);
        id
    }

    pub(crate) fn next_vm_id(&self) -> u64 {
        let id = self.0.next_vm_id.get();
        self.0.next_vm_id.set(id + 1);
        id
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("id", &self.0.id)
            .field("destroyed", &self.0.destroyed.get())
            .field("pending_updates", &self.0.differ.len())
            .finish()
    }
}
