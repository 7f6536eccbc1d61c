//! Reactive values
//!
//! [`Value`] is the dynamic data model bound by templates. Scalars are plain;
//! objects and arrays are shared, observed containers, so two `Value`s can
//! refer to the same container and identity matters for change detection.

use std::fmt;
use std::rc::Rc;

use serde_json::Number;

use crate::{Array, Object};

/// Dynamic value held by reactive data
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / null
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// Observed array (shared)
    Array(Array),
    /// Observed object (shared)
    Object(Object),
}

impl Value {
    /// Deep-convert JSON into observed values
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(Rc::from(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::Array(Array::new(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.insert_silent(key, Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Snapshot as JSON. Reads are not tracked.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(array) => array.to_json(),
            Value::Object(object) => object.to_json(),
        }
    }

    /// Identity for containers, equality for scalars
    ///
    /// This is the comparison used by write guards and watchers.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Array::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Object::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Objects and arrays
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness as templates understand it
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Tracked read of one path segment: an object key or an array index
    pub fn get(&self, segment: &str) -> Value {
        match self {
            Value::Object(object) => object.get(segment),
            Value::Array(array) => match segment {
                "length" => Value::from(array.len()),
                _ => segment
                    .parse::<usize>()
                    .map(|index| array.get(index))
                    .unwrap_or_default(),
            },
            Value::String(s) if segment == "length" => Value::from(s.chars().count()),
            _ => Value::Null,
        }
    }

    /// Tracked read of a dotted path (`"user.name"`, `"items.0"`)
    pub fn get_path(&self, path: &str) -> Value {
        path.split('.')
            .filter(|s| !s.is_empty())
            .fold(self.clone(), |value, segment| value.get(segment))
    }

    /// Register the container's own dependency with the current watcher
    pub(crate) fn depend_contents(&self) {
        match self {
            Value::Array(array) => array.dep().depend(),
            Value::Object(object) => object.dep().depend(),
            _ => {}
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Structural equality (deep for containers)
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Array::ptr_eq(a, b) || a.to_json() == b.to_json(),
            (Value::Object(a), Value::Object(b)) => {
                Object::ptr_eq(a, b) || a.to_json() == b.to_json()
            }
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => write!(f, "Array({})", a.to_json()),
            Value::Object(o) => write!(f, "Object({})", o.to_json()),
        }
    }
}

/// Text form used when a value is rendered into an attribute or used as a key
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => match number_to_json(*n) {
                serde_json::Value::Number(n) => write!(f, "{n}"),
                _ => write!(f, "{n}"),
            },
            Value::String(s) => f.write_str(s),
            Value::Array(a) => write!(f, "{}", a.to_json()),
            Value::Object(o) => write!(f, "{}", o.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::new(items))
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
