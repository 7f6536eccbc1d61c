//! Component definitions and type resolution
//!
//! A template node's type resolves to one of three handlers: a registered
//! component (composed from its own template), the structural `block`, or a
//! native element.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value as Json;
use tessel_observe::Value;

use crate::stylesheet::Stylesheet;
use crate::template::{Template, TemplateError};
use crate::vm::Vm;

/// Lifecycle hook of a view model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before data is initialized
    Init,
    /// Data, computed values and props are in place
    Created,
    /// Template fully compiled
    Ready,
    Destroyed,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::Created => "created",
            Hook::Ready => "ready",
            Hook::Destroyed => "destroyed",
        }
    }
}

pub(crate) type MethodFn = Rc<dyn Fn(&Vm, &[Value]) -> Value>;
pub(crate) type ComputedFn = Rc<dyn Fn(&Vm) -> Value>;
pub(crate) type HookFn = Rc<dyn Fn(&Vm)>;

/// Definition of a component: template, initial data, behavior
#[derive(Clone)]
pub struct ComponentDef {
    pub(crate) name: String,
    pub(crate) template: Rc<Template>,
    pub(crate) data: Json,
    pub(crate) props: Option<Vec<String>>,
    pub(crate) methods: HashMap<String, MethodFn>,
    pub(crate) computed: Vec<(String, ComputedFn)>,
    pub(crate) style: Stylesheet,
    pub(crate) hooks: HashMap<Hook, Vec<HookFn>>,
}

#[derive(Deserialize)]
struct ComponentJson {
    template: Json,
    #[serde(default)]
    data: Json,
    #[serde(default)]
    props: Option<Vec<String>>,
    #[serde(default)]
    style: Stylesheet,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            template: Rc::new(template),
            data: Json::Null,
            props: None,
            methods: HashMap::new(),
            computed: Vec::new(),
            style: Stylesheet::default(),
            hooks: HashMap::new(),
        }
    }

    /// Load `{"template": .., "data": .., "props": [..], "style": {..}}`
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, TemplateError> {
        let parsed: ComponentJson = serde_json::from_str(json)?;
        let mut def = Self::new(name, Template::from_json(&parsed.template)?);
        def.data = parsed.data;
        def.props = parsed.props;
        def.style = parsed.style;
        Ok(def)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &Rc<Template> {
        &self.template
    }

    /// Initial data (a JSON object), copied into every instance
    pub fn with_data(mut self, data: Json) -> Self {
        self.data = data;
        self
    }

    /// Declared props. Without a declaration every attribute is a prop.
    pub fn with_props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props = Some(props.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_style(mut self, style: Stylesheet) -> Self {
        self.style = style;
        self
    }

    pub fn method(mut self, name: impl Into<String>, f: impl Fn(&Vm, &[Value]) -> Value + 'static) -> Self {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }

    pub fn computed(mut self, name: impl Into<String>, f: impl Fn(&Vm) -> Value + 'static) -> Self {
        self.computed.push((name.into(), Rc::new(f)));
        self
    }

    pub fn hook(mut self, hook: Hook, f: impl Fn(&Vm) + 'static) -> Self {
        self.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    pub(crate) fn is_prop(&self, name: &str) -> bool {
        match &self.props {
            Some(props) => props.iter().any(|p| p == name),
            None => true,
        }
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// Handler a type name resolves to
#[derive(Debug, Clone)]
pub(crate) enum TypeHandler {
    Component(Rc<ComponentDef>),
    Block,
    Native,
}

/// Registered components of one instance
#[derive(Debug, Default)]
pub(crate) struct ComponentRegistry {
    components: HashMap<String, Rc<ComponentDef>>,
}

impl ComponentRegistry {
    pub(crate) fn register(&mut self, def: ComponentDef) {
        tracing::debug!(component = %def.name, "registered component");
        self.components.insert(def.name.clone(), Rc::new(def));
    }

    pub(crate) fn get(&self, name: &str) -> Option<Rc<ComponentDef>> {
        self.components.get(name).cloned()
    }

    pub(crate) fn resolve(&self, tag: &str) -> TypeHandler {
        match self.components.get(tag) {
            Some(def) => TypeHandler::Component(def.clone()),
            None if tag == "block" => TypeHandler::Block,
            None => TypeHandler::Native,
        }
    }
}
