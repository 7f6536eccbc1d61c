//! Platform service modules
//!
//! Hosts advertise their modules (name → method names) up front. Components
//! reach them through a [`ModuleProxy`]; calls to anything that was not
//! advertised are logged and dropped.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value as Json;
use tessel_dom::{NativeCall, Signal};

use crate::app::WeakApp;

/// Advertised modules of one instance
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: HashMap<String, BTreeSet<String>>,
}

impl ModuleRegistry {
    /// Register a module; methods of an existing module are merged
    pub(crate) fn register<I, S>(&mut self, name: &str, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.modules.entry(name.to_string()).or_default();
        entry.extend(methods.into_iter().map(Into::into));
        tracing::debug!(module = name, methods = entry.len(), "registered module");
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub(crate) fn has_method(&self, name: &str, method: &str) -> bool {
        self.modules.get(name).is_some_and(|methods| methods.contains(method))
    }

    pub(crate) fn methods(&self, name: &str) -> Vec<String> {
        self.modules
            .get(name)
            .map(|methods| methods.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Handle to one platform module
#[derive(Clone)]
pub struct ModuleProxy {
    app: WeakApp,
    name: String,
}

impl ModuleProxy {
    pub(crate) fn new(app: WeakApp, name: &str) -> Self {
        Self {
            app,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the host advertised this module
    pub fn is_available(&self) -> bool {
        self.app
            .upgrade()
            .is_some_and(|app| app.modules().contains(&self.name))
    }

    /// Advertised method names
    pub fn methods(&self) -> Vec<String> {
        self.app
            .upgrade()
            .map(|app| app.modules().methods(&self.name))
            .unwrap_or_default()
    }

    /// Send `method(args)` to the host. Unknown modules and methods are
    /// logged and answered with `Continue`.
    pub fn call(&self, method: &str, args: Vec<Json>) -> Signal {
        let Some(app) = self.app.upgrade() else {
            tracing::debug!(module = %self.name, method, "module call after instance was dropped");
            return Signal::Continue;
        };
        if app.is_destroyed() {
            tracing::debug!(module = %self.name, method, "module call on destroyed instance");
            return Signal::Continue;
        }
        let known = {
            let modules = app.modules();
            if !modules.contains(&self.name) {
                tracing::warn!(module = %self.name, "module is not registered");
                return Signal::Continue;
            }
            modules.has_method(&self.name, method)
        };
        if !known {
            tracing::warn!(module = %self.name, method, "module has no such method");
            return Signal::Continue;
        }
        app.with_doc(|doc| doc.listener_mut().send(NativeCall::new(self.name.as_str(), method, args)))
    }
}

impl std::fmt::Debug for ModuleProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleProxy").field("name", &self.name).finish()
    }
}
