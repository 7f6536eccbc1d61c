//! Component stylesheets
//!
//! A stylesheet maps selectors to style properties. Three selector forms are
//! understood: `.name` (class), `#name` (id) and a bare `name` (element
//! type). Each feeds its own layer of the element cascade.

use std::collections::BTreeMap;

use serde::Deserialize;
use tessel_dom::Props;

/// Selector → properties table of one component
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Stylesheet {
    rules: BTreeMap<String, Props>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of selectors
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Add (or extend) one rule
    pub fn rule(mut self, selector: impl Into<String>, props: serde_json::Value) -> Self {
        if let serde_json::Value::Object(props) = props {
            self.rules.entry(selector.into()).or_default().extend(props);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Merged style of a class list; later classes win
    pub fn class_style<S: AsRef<str>>(&self, names: &[S]) -> Props {
        let mut style = Props::new();
        for name in names {
            if let Some(props) = self.rules.get(&format!(".{}", name.as_ref())) {
                style.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        style
    }

    pub fn id_style(&self, id: &str) -> Props {
        self.rules.get(&format!("#{id}")).cloned().unwrap_or_default()
    }

    pub fn tag_style(&self, tag: &str) -> Props {
        self.rules.get(tag).cloned().unwrap_or_default()
    }
}
