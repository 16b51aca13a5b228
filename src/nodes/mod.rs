// Serializable scene nodes whose media goes through the resolver.

pub mod image;
pub mod shared_screen;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub use image::{AlphaMode, ImageNode, Projection};
pub use shared_screen::SharedScreenNode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub props: Value,
}

/// One entity of a serialized scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub name: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl SerializedNode {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn props(&self, name: &str) -> AppResult<&Value> {
        self.component(name)
            .map(|c| &c.props)
            .ok_or_else(|| AppError::validation("components", &format!("Missing {} component", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// State shared by every node: identity, visibility and placement.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseObject {
    pub uuid: Uuid,
    pub name: String,
    pub visible: bool,
    pub transform: Transform,
}

impl BaseObject {
    pub fn new(name: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            visible: true,
            transform: Transform::default(),
        }
    }

    pub fn from_serialized(json: &SerializedNode) -> AppResult<Self> {
        let transform = match json.component("transform") {
            Some(component) => serde_json::from_value(component.props.clone())?,
            None => Transform::default(),
        };

        let visible = json
            .component("visible")
            .and_then(|c| c.props.get("visible"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(Self {
            uuid: Uuid::new_v4(),
            name: json.name.clone(),
            visible,
            transform,
        })
    }

    /// Serialize with the node's own components appended after the common ones.
    pub fn serialize(&self, components: Vec<Component>) -> AppResult<SerializedNode> {
        let mut all = vec![
            Component {
                name: "transform".to_string(),
                props: serde_json::to_value(&self.transform)?,
            },
            Component {
                name: "visible".to_string(),
                props: json!({ "visible": self.visible }),
            },
        ];
        all.extend(components);

        Ok(SerializedNode {
            name: self.name.clone(),
            components: all,
        })
    }
}

/// A node kind the editor can save and export.
pub trait SceneNode {
    const COMPONENT_NAME: &'static str;
    const NODE_NAME: &'static str;

    fn base(&self) -> &BaseObject;

    fn serialize(&self) -> AppResult<SerializedNode>;

    /// glTF extension components attached to the exported object.
    fn export_components(&self) -> Map<String, Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_object_round_trips_transform_and_visibility() {
        let mut base = BaseObject::new("Screen");
        base.visible = false;
        base.transform.position = [1.0, 2.0, 3.0];

        let serialized = base.serialize(Vec::new()).unwrap();
        assert_eq!(serialized.components[0].name, "transform");
        assert_eq!(serialized.components[1].props, json!({ "visible": false }));

        let restored = BaseObject::from_serialized(&serialized).unwrap();
        assert_eq!(restored.name, "Screen");
        assert!(!restored.visible);
        assert_eq!(restored.transform.position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_component_is_a_validation_error() {
        let node = SerializedNode {
            name: "Empty".to_string(),
            components: Vec::new(),
        };
        assert!(node.props("image").is_err());
    }
}
