//! Tessel Observe - reactive data
//!
//! Fine-grained dependency tracking for plain data. Objects and arrays are
//! observed containers; reading them inside a [`Watcher`] or [`Computed`]
//! getter records a dependency, writing them re-runs the dependents
//! synchronously. Scheduling (coalescing re-runs into one flush) is left to
//! the caller.
//!
//! Everything here is single-threaded: handles are `Rc`-based and tracking
//! state lives in thread-locals.

mod array;
mod computed;
mod dep;
mod object;
mod value;
mod watcher;

pub use array::Array;
pub use computed::Computed;
pub use dep::{is_tracking, untracked, Dep};
pub use object::Object;
pub use value::Value;
pub use watcher::{Watcher, MAX_RERUNS};

/// Deep-convert a JSON document into observed data
pub fn observe(json: &serde_json::Value) -> Value {
    Value::from_json(json)
}

/// Observe a JSON object, treating any other JSON as an empty object
pub fn observe_object(json: &serde_json::Value) -> Object {
    match Value::from_json(json) {
        Value::Object(object) => object,
        _ => Object::new(),
    }
}
