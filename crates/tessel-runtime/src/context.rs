//! Evaluation scopes
//!
//! Bindings are evaluated against a [`Scope`]: the owning view model plus a
//! chain of local records. Repeat items push a record holding their index and
//! value; a name is looked up in the innermost record first, then outward,
//! and finally in the view model's data and computed values.

use std::fmt;
use std::rc::Rc;

use tessel_observe::{Object, Value};

use crate::vm::Vm;

struct ScopeInner {
    vm: Vm,
    locals: Option<Object>,
    /// Old-style repeat record: an object `$value` is searched as well
    legacy: bool,
    parent: Option<Scope>,
}

/// Lexical scope of a binding
#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    /// Scope of a view model's own template
    pub fn root(vm: &Vm) -> Self {
        Self(Rc::new(ScopeInner {
            vm: vm.clone(),
            locals: None,
            legacy: false,
            parent: None,
        }))
    }

    /// Nested scope with its own locals
    pub(crate) fn child(&self, locals: Object, legacy: bool) -> Self {
        Self(Rc::new(ScopeInner {
            vm: self.0.vm.clone(),
            locals: Some(locals),
            legacy,
            parent: Some(self.clone()),
        }))
    }

    pub fn vm(&self) -> &Vm {
        &self.0.vm
    }

    pub fn locals(&self) -> Option<&Object> {
        self.0.locals.as_ref()
    }

    pub(crate) fn is_legacy(&self) -> bool {
        self.0.legacy
    }

    /// Tracked lookup of a dotted path
    pub fn get(&self, path: &str) -> Value {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.lookup(head);
        match rest {
            Some(rest) => value.get_path(rest),
            None => value,
        }
    }

    /// Tracked lookup of one name
    pub fn lookup(&self, name: &str) -> Value {
        if let Some(locals) = &self.0.locals {
            if locals.has(name) {
                return locals.get(name);
            }
            if self.0.legacy {
                if let Value::Object(item) = locals.get("$value") {
                    if item.has(name) {
                        return item.get(name);
                    }
                }
            }
        }
        match &self.0.parent {
            Some(parent) => parent.lookup(name),
            None => self.0.vm.lookup(name),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("vm", &self.0.vm.id())
            .field("locals", &self.0.locals)
            .field("legacy", &self.0.legacy)
            .finish()
    }
}
