//! Templates
//!
//! A template is a tree of nodes describing elements, directives and
//! bindings. Templates are built with the builder methods on [`Template`] or
//! loaded from JSON, where a dynamic value is written `{"@binding": "a.b"}`:
//!
//! ```json
//! {
//!   "type": "div",
//!   "children": [{
//!     "type": "text",
//!     "repeat": {"expression": {"@binding": "items"}, "value": "item"},
//!     "attr": {"value": {"@binding": "item.label"}}
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;
use tessel_dom::AppendMode;
use tessel_observe::Value;

use crate::context::Scope;
use crate::vm::Vm;

/// Template loading error
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid template JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid template at {path}: {message}")]
    Invalid { path: String, message: String },
}

fn invalid(path: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::Invalid {
        path: path.to_string(),
        message: message.into(),
    }
}

type ExprFn = dyn Fn(&Scope) -> Value;

/// Expression evaluated against a scope
#[derive(Clone)]
pub enum Expr {
    /// Dotted path lookup (`"item.label"`)
    Path(String),
    /// Arbitrary computation
    Func(Rc<ExprFn>),
}

impl Expr {
    pub fn path(path: impl Into<String>) -> Self {
        Expr::Path(path.into())
    }

    pub fn func(f: impl Fn(&Scope) -> Value + 'static) -> Self {
        Expr::Func(Rc::new(f))
    }

    /// Evaluate; reads are tracked by the enclosing watcher, if any
    pub fn eval(&self, scope: &Scope) -> Value {
        match self {
            Expr::Path(path) => scope.get(path),
            Expr::Func(f) => f(scope),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => write!(f, "Path({path})"),
            Expr::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Attribute, style or param value
#[derive(Debug, Clone)]
pub enum Binding {
    Static(Json),
    Dynamic(Expr),
}

impl Binding {
    pub fn value(value: impl Into<Json>) -> Self {
        Binding::Static(value.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        Binding::Dynamic(Expr::path(path))
    }

    pub fn func(f: impl Fn(&Scope) -> Value + 'static) -> Self {
        Binding::Dynamic(Expr::func(f))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Binding::Dynamic(_))
    }

    /// Static text, if this is a static string
    pub fn as_static_str(&self) -> Option<&str> {
        match self {
            Binding::Static(Json::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn eval(&self, scope: &Scope) -> Value {
        match self {
            Binding::Static(json) => Value::from_json(json),
            Binding::Dynamic(expr) => expr.eval(scope),
        }
    }

    fn from_json(json: &Json) -> Self {
        match binding_path(json) {
            Some(path) => Binding::path(path),
            None => Binding::Static(json.clone()),
        }
    }
}

fn binding_path(json: &Json) -> Option<&str> {
    json.as_object()?.get("@binding")?.as_str()
}

/// Element type of a template node
#[derive(Debug, Clone)]
pub enum TemplateType {
    Static(String),
    /// Type chosen at runtime; the region is rebuilt when it changes
    Dynamic(Expr),
}

impl Default for TemplateType {
    fn default() -> Self {
        TemplateType::Static("div".to_string())
    }
}

/// `repeat` directive
#[derive(Debug, Clone)]
pub struct Repeat {
    pub expr: Expr,
    /// Local name of the item index (`$index` when absent)
    pub key: Option<String>,
    /// Local name of the item (`$value` when absent)
    pub value: Option<String>,
    pub track_by: Option<String>,
    /// Old style: object items are themselves the item scope
    pub legacy: bool,
}

impl Repeat {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            key: None,
            value: None,
            track_by: None,
            legacy: false,
        }
    }

    /// Old style repeat over a bare expression
    pub fn legacy(expr: Expr) -> Self {
        Self {
            legacy: true,
            ..Self::new(expr)
        }
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.key = Some(name.into());
        self
    }

    pub fn value(mut self, name: impl Into<String>) -> Self {
        self.value = Some(name.into());
        self
    }

    pub fn track_by(mut self, field: impl Into<String>) -> Self {
        self.track_by = Some(field.into());
        self
    }

    pub(crate) fn key_name(&self) -> &str {
        self.key.as_deref().unwrap_or("$index")
    }

    pub(crate) fn value_name(&self) -> &str {
        self.value.as_deref().unwrap_or("$value")
    }
}

type HandlerFn = dyn Fn(&Vm, &[Value]);

/// What runs when an event fires
#[derive(Clone)]
pub enum Handler {
    /// Method of the owning view model
    Method(String),
    Func(Rc<HandlerFn>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Method(name) => write!(f, "Method({name})"),
            Handler::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Event binding of a template node
#[derive(Debug, Clone)]
pub struct EventBinding {
    pub handler: Handler,
    /// Extra arguments passed after the event
    pub params: Vec<Binding>,
}

impl EventBinding {
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            handler: Handler::Method(name.into()),
            params: Vec::new(),
        }
    }

    pub fn func(f: impl Fn(&Vm, &[Value]) + 'static) -> Self {
        Self {
            handler: Handler::Func(Rc::new(f)),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Binding>) -> Self {
        self.params = params;
        self
    }
}

/// One template node
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub kind: TemplateType,
    pub attr: BTreeMap<String, Binding>,
    pub style: BTreeMap<String, Binding>,
    pub class_list: Vec<Binding>,
    pub id: Option<Binding>,
    pub events: BTreeMap<String, EventBinding>,
    pub children: Vec<Rc<Template>>,
    pub repeat: Option<Repeat>,
    pub shown: Option<Expr>,
    pub append: Option<AppendMode>,
    pub track_by: Option<String>,
}

impl Template {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: TemplateType::Static(kind.into()),
            ..Self::default()
        }
    }

    /// Node whose type is computed
    pub fn dynamic(expr: Expr) -> Self {
        Self {
            kind: TemplateType::Dynamic(expr),
            ..Self::default()
        }
    }

    /// Static type name, if any
    pub fn static_type(&self) -> Option<&str> {
        match &self.kind {
            TemplateType::Static(kind) => Some(kind),
            TemplateType::Dynamic(_) => None,
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.attr.insert(key.into(), Binding::Static(value.into()));
        self
    }

    pub fn bind_attr(mut self, key: impl Into<String>, binding: Binding) -> Self {
        self.attr.insert(key.into(), binding);
        self
    }

    pub fn style(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.style.insert(key.into(), Binding::Static(value.into()));
        self
    }

    pub fn bind_style(mut self, key: impl Into<String>, binding: Binding) -> Self {
        self.style.insert(key.into(), binding);
        self
    }

    pub fn class(mut self, name: impl Into<String>) -> Self {
        self.class_list.push(Binding::Static(Json::String(name.into())));
        self
    }

    /// Class names from an expression (a string or an array of strings)
    pub fn bind_class(mut self, binding: Binding) -> Self {
        self.class_list.push(binding);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(Binding::Static(Json::String(id.into())));
        self
    }

    pub fn bind_id(mut self, binding: Binding) -> Self {
        self.id = Some(binding);
        self
    }

    pub fn on(mut self, event: impl Into<String>, binding: EventBinding) -> Self {
        self.events.insert(event.into(), binding);
        self
    }

    pub fn child(mut self, child: Template) -> Self {
        self.children.push(Rc::new(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Template>) -> Self {
        self.children.extend(children.into_iter().map(Rc::new));
        self
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn shown(mut self, expr: Expr) -> Self {
        self.shown = Some(expr);
        self
    }

    pub fn append(mut self, mode: AppendMode) -> Self {
        self.append = Some(mode);
        self
    }

    pub fn track_by(mut self, field: impl Into<String>) -> Self {
        self.track_by = Some(field.into());
        self
    }

    /// Append mode from the node or its `append` attribute
    pub(crate) fn append_mode(&self) -> Option<AppendMode> {
        self.append.or_else(|| match self.attr.get("append")?.as_static_str()? {
            "tree" => Some(AppendMode::Tree),
            "single" => Some(AppendMode::Single),
            _ => None,
        })
    }

    /// Track-by field from the repeat descriptor, the node or its attrs
    pub(crate) fn track_by_field(&self) -> Option<String> {
        self.repeat
            .as_ref()
            .and_then(|r| r.track_by.clone())
            .or_else(|| self.track_by.clone())
            .or_else(|| self.attr.get("trackBy")?.as_static_str().map(str::to_string))
    }

    /// Static `slot` attribute of projected content (`"default"` if absent)
    pub(crate) fn slot_name(&self) -> &str {
        self.attr
            .get("slot")
            .and_then(Binding::as_static_str)
            .unwrap_or("default")
    }

    /// Parse a JSON template
    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let value: Json = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    /// Convert a JSON template
    pub fn from_json(json: &Json) -> Result<Self, TemplateError> {
        parse_node(json, "$")
    }
}

fn parse_node(json: &Json, path: &str) -> Result<Template, TemplateError> {
    let object = json.as_object().ok_or_else(|| invalid(path, "expected an object"))?;
    let mut template = Template::default();

    match object.get("type") {
        None => {}
        Some(Json::String(kind)) => template.kind = TemplateType::Static(kind.clone()),
        Some(other) => match binding_path(other) {
            Some(expr) => template.kind = TemplateType::Dynamic(Expr::path(expr)),
            None => return Err(invalid(path, "`type` must be a string or a binding")),
        },
    }

    if let Some(attr) = object.get("attr") {
        let attr = attr.as_object().ok_or_else(|| invalid(path, "`attr` must be an object"))?;
        template.attr = attr.iter().map(|(k, v)| (k.clone(), Binding::from_json(v))).collect();
    }
    if let Some(style) = object.get("style") {
        let style = style.as_object().ok_or_else(|| invalid(path, "`style` must be an object"))?;
        template.style = style.iter().map(|(k, v)| (k.clone(), Binding::from_json(v))).collect();
    }
    match object.get("classList") {
        None => {}
        Some(Json::Array(items)) => template.class_list = items.iter().map(Binding::from_json).collect(),
        Some(other) if binding_path(other).is_some() || other.is_string() => {
            template.class_list = vec![Binding::from_json(other)];
        }
        Some(_) => return Err(invalid(path, "`classList` must be an array, a string or a binding")),
    }
    if let Some(id) = object.get("id") {
        template.id = Some(Binding::from_json(id));
    }
    if let Some(events) = object.get("events") {
        let events = events.as_object().ok_or_else(|| invalid(path, "`events` must be an object"))?;
        for (event, spec) in events {
            template.events.insert(event.clone(), parse_event(spec, &format!("{path}.events.{event}"))?);
        }
    }
    if let Some(repeat) = object.get("repeat") {
        template.repeat = Some(parse_repeat(repeat, &format!("{path}.repeat"))?);
    }
    if let Some(shown) = object.get("shown") {
        let expr = binding_path(shown).ok_or_else(|| invalid(path, "`shown` must be a binding"))?;
        template.shown = Some(Expr::path(expr));
    }
    match object.get("append").and_then(Json::as_str) {
        Some("tree") => template.append = Some(AppendMode::Tree),
        Some("single") => template.append = Some(AppendMode::Single),
        _ => {}
    }
    if let Some(track_by) = object.get("trackBy").and_then(Json::as_str) {
        template.track_by = Some(track_by.to_string());
    }
    if let Some(children) = object.get("children") {
        let children = children.as_array().ok_or_else(|| invalid(path, "`children` must be an array"))?;
        for (index, child) in children.iter().enumerate() {
            template
                .children
                .push(Rc::new(parse_node(child, &format!("{path}.children.{index}"))?));
        }
    }
    Ok(template)
}

fn parse_event(spec: &Json, path: &str) -> Result<EventBinding, TemplateError> {
    match spec {
        Json::String(method) => Ok(EventBinding::method(method.clone())),
        Json::Object(object) => {
            let method = object
                .get("handler")
                .and_then(Json::as_str)
                .ok_or_else(|| invalid(path, "event needs a `handler` method name"))?;
            let params = match object.get("params") {
                None => Vec::new(),
                Some(Json::Array(params)) => params.iter().map(Binding::from_json).collect(),
                Some(_) => return Err(invalid(path, "`params` must be an array")),
            };
            Ok(EventBinding::method(method).with_params(params))
        }
        _ => Err(invalid(path, "event must be a method name or an object")),
    }
}

fn parse_repeat(spec: &Json, path: &str) -> Result<Repeat, TemplateError> {
    if let Some(expr) = binding_path(spec) {
        return Ok(Repeat::legacy(Expr::path(expr)));
    }
    let object = spec
        .as_object()
        .ok_or_else(|| invalid(path, "expected a binding or an object"))?;
    let expr = object
        .get("expression")
        .and_then(binding_path)
        .ok_or_else(|| invalid(path, "`expression` must be a binding"))?;
    let name = |key: &str| object.get(key).and_then(Json::as_str).map(str::to_string);
    Ok(Repeat {
        expr: Expr::path(expr),
        key: name("key"),
        value: name("value"),
        track_by: name("trackBy"),
        legacy: false,
    })
}
