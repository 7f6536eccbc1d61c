//! Tessel Runtime - template compiler and view models
//!
//! Compiles declarative templates against reactive view models into a
//! [`Document`](tessel_dom::Document) mirrored to a native host. Data writes
//! re-run only the bindings that read the data; changes to dynamic regions
//! (repeat lists, shown regions, dynamic types) are batched by the
//! [`Differ`] and applied once per update wave.
//!
//! ```ignore
//! let host = RecordingHost::new();
//! let app = App::new("1", Rc::new(host.clone()), Config::default());
//! app.register_component(ComponentDef::new("page", template).with_data(json!({"items": [1, 2]})));
//! let vm = app.boot("page", json!({}))?;
//! app.update(|| vm.set("items", observe(&json!([3]))));
//! ```

mod app;
mod compiler;
mod config;
mod context;
mod differ;
mod modules;
mod registry;
mod stylesheet;
mod template;
mod vm;

pub use tessel_dom as dom;
pub use tessel_observe as observe;

pub use app::App;
pub use config::{Config, Environment};
pub use context::Scope;
pub use differ::{DiffKind, Differ};
pub use modules::ModuleProxy;
pub use registry::{ComponentDef, Hook};
pub use stylesheet::Stylesheet;
pub use template::{Binding, EventBinding, Expr, Handler, Repeat, Template, TemplateError, TemplateType};
pub use vm::{Vm, VmEvent};

use tessel_dom::DomError;

/// Application instance error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Instance {0} has been destroyed")]
    Destroyed(String),
    #[error("Instance is already booted")]
    AlreadyBooted,
    #[error("Instance is not booted")]
    NotBooted,
    #[error("Unknown element ref `{0}`")]
    UnknownRef(String),
    #[error("Unknown component `{0}`")]
    UnknownComponent(String),
    #[error("Expected a data object, got {0}")]
    InvalidData(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Dom(#[from] DomError),
}
