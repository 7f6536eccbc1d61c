//! Wire serialization of element subtrees

use serde::Serialize;
use serde_json::Value;

use crate::{Document, NodeId, Props};

/// Element as sent in `addElement` / `createBody`
///
/// Only element children are included; comment markers never reach the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedElement {
    #[serde(rename = "ref")]
    pub node_ref: String,
    #[serde(rename = "type")]
    pub tag: String,
    pub attr: Props,
    /// Resolved cascade
    pub style: Props,
    #[serde(rename = "customComponent")]
    pub custom_component: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub event: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Document {
    /// Snapshot of an element and its element descendants
    pub fn serialize(&self, id: NodeId) -> Option<SerializedElement> {
        let node = self.node(id)?;
        let element = node.as_element()?;
        Some(SerializedElement {
            node_ref: node.node_ref().to_string(),
            tag: element.tag.clone(),
            attr: element.attr.clone(),
            style: element.style.resolved(),
            custom_component: element.custom_component,
            event: element.events.keys().cloned().collect(),
            children: element
                .pure_children
                .iter()
                .filter_map(|child| self.serialize(*child))
                .collect(),
            id: element.id.clone(),
        })
    }

    /// [`serialize`](Self::serialize) as JSON, `Null` for comments and
    /// unknown ids
    pub fn to_json(&self, id: NodeId) -> Value {
        self.serialize(id)
            .and_then(|element| serde_json::to_value(element).ok())
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Listener, RecordingHost, StyleLayer, UpdateMode};
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_serialize_skips_comments() {
        let mut doc = Document::new(Listener::new("1", Rc::new(RecordingHost::new())));
        let div = doc.create_element("div");
        let marker = doc.create_comment("start");
        let text = doc.create_element("text");
        doc.append_child(div, marker).unwrap();
        doc.append_child(div, text).unwrap();
        doc.set_attr(text, "value", json!("hi"), UpdateMode::Normal).unwrap();
        doc.set_style_layer(div, StyleLayer::Class, json!({"color": "red"}).as_object().cloned().unwrap_or_default())
            .unwrap();

        let div_ref = doc.node(div).unwrap().node_ref().to_string();
        let text_ref = doc.node(text).unwrap().node_ref().to_string();
        assert_eq!(
            doc.to_json(div),
            json!({
                "ref": div_ref,
                "type": "div",
                "attr": {},
                "style": {"color": "red"},
                "customComponent": false,
                "children": [{
                    "ref": text_ref,
                    "type": "text",
                    "attr": {"value": "hi"},
                    "style": {},
                    "customComponent": false
                }]
            })
        );
        assert!(doc.to_json(marker).is_null());
    }
}
