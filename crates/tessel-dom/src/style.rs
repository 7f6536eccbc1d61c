//! Style cascade
//!
//! An element carries four style layers, applied lowest to highest:
//! tag < class < id < inline. A higher layer overrides a lower one, except
//! that an empty value never clears a property a lower layer already set.

use serde_json::Value;

use crate::Props;

/// One of the four style layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleLayer {
    Tag,
    Class,
    Id,
    Inline,
}

impl StyleLayer {
    /// Layers in application order
    pub const ALL: [StyleLayer; 4] = [StyleLayer::Tag, StyleLayer::Class, StyleLayer::Id, StyleLayer::Inline];
}

/// Layered style declarations of one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleLayers {
    tag: Props,
    class: Props,
    id: Props,
    inline: Props,
}

impl StyleLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, layer: StyleLayer) -> &Props {
        match layer {
            StyleLayer::Tag => &self.tag,
            StyleLayer::Class => &self.class,
            StyleLayer::Id => &self.id,
            StyleLayer::Inline => &self.inline,
        }
    }

    pub(crate) fn layer_mut(&mut self, layer: StyleLayer) -> &mut Props {
        match layer {
            StyleLayer::Tag => &mut self.tag,
            StyleLayer::Class => &mut self.class,
            StyleLayer::Id => &mut self.id,
            StyleLayer::Inline => &mut self.inline,
        }
    }

    /// Replace a whole layer. Keys the old layer set and the new one does not
    /// are kept as empty values, so the resolved style clears them.
    pub(crate) fn reset_layer(&mut self, layer: StyleLayer, props: Props) {
        let slot = self.layer_mut(layer);
        for value in slot.values_mut() {
            *value = Value::String(String::new());
        }
        slot.extend(props);
    }

    /// Final style
    pub fn resolved(&self) -> Props {
        resolve_cascade(StyleLayer::ALL.iter().map(|l| self.layer(*l)))
    }

    /// Final value of one property (`Null` when no layer sets it)
    pub fn resolved_value(&self, key: &str) -> Value {
        let mut value = Value::Null;
        for layer in StyleLayer::ALL {
            if let Some(v) = self.layer(layer).get(key) {
                merge_value(&mut value, v);
            }
        }
        value
    }
}

/// Fold layers into one style, lowest precedence first
///
/// Within a layer, empty values are applied after non-empty ones.
pub fn resolve_cascade<'a>(layers: impl IntoIterator<Item = &'a Props>) -> Props {
    let mut resolved = Props::new();
    for layer in layers {
        let (empties, values): (Vec<_>, Vec<_>) = layer.iter().partition(|(_, v)| is_empty(v));
        for (key, value) in values.into_iter().chain(empties) {
            let slot = resolved.entry(key.clone()).or_insert(Value::Null);
            merge_value(slot, value);
        }
    }
    for value in resolved.values_mut() {
        if value.is_null() {
            *value = Value::String(String::new());
        }
    }
    resolved
}

fn merge_value(slot: &mut Value, value: &Value) {
    if is_empty(value) {
        if is_empty(slot) {
            *slot = Value::String(String::new());
        }
    } else {
        *slot = value.clone();
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            _ => Props::new(),
        }
    }

    #[test]
    fn test_empty_class_value_keeps_tag_value() {
        let mut layers = StyleLayers::new();
        *layers.layer_mut(StyleLayer::Tag) = props(json!({"color": "red"}));
        *layers.layer_mut(StyleLayer::Class) = props(json!({"color": "", "margin": "1"}));
        assert_eq!(Value::Object(layers.resolved()), json!({"color": "red", "margin": "1"}));

        *layers.layer_mut(StyleLayer::Inline) = props(json!({"color": "blue"}));
        assert_eq!(Value::Object(layers.resolved()), json!({"color": "blue", "margin": "1"}));
        assert_eq!(layers.resolved_value("color"), json!("blue"));
    }

    #[test]
    fn test_empty_with_no_lower_value_clears() {
        let resolved = resolve_cascade([&props(json!({"width": ""}))]);
        assert_eq!(Value::Object(resolved), json!({"width": ""}));
    }

    #[test]
    fn test_reset_layer_blanks_dropped_keys() {
        let mut layers = StyleLayers::new();
        layers.reset_layer(StyleLayer::Class, props(json!({"color": "red", "height": 10})));
        layers.reset_layer(StyleLayer::Class, props(json!({"height": 20})));
        assert_eq!(
            Value::Object(layers.resolved()),
            json!({"color": "", "height": 20})
        );
    }

    #[test]
    fn test_higher_layer_number_overrides() {
        let mut layers = StyleLayers::new();
        *layers.layer_mut(StyleLayer::Tag) = props(json!({"flex": 1}));
        *layers.layer_mut(StyleLayer::Id) = props(json!({"flex": 2}));
        assert_eq!(layers.resolved_value("flex"), json!(2));
        assert!(layers.resolved_value("missing").is_null());
    }
}
