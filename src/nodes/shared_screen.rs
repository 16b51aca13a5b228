use serde_json::{json, Map, Value};

use crate::errors::AppResult;
use crate::nodes::{BaseObject, Component, SceneNode, SerializedNode};

pub const DEFAULT_SCREEN_COLOR: &str = "#31343A";

/// Surface the room can share a screen onto.
#[derive(Debug, Clone)]
pub struct SharedScreenNode {
    pub base: BaseObject,
    pub color: String,
    pub opacity: f64,
}

impl Default for SharedScreenNode {
    fn default() -> Self {
        Self {
            base: BaseObject::new(Self::NODE_NAME),
            color: DEFAULT_SCREEN_COLOR.to_string(),
            opacity: 1.0,
        }
    }
}

impl SharedScreenNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deserialize(json: &SerializedNode) -> AppResult<Self> {
        let props = json.props(Self::COMPONENT_NAME)?;

        Ok(Self {
            base: BaseObject::from_serialized(json)?,
            color: props
                .get("color")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SCREEN_COLOR)
                .to_string(),
            opacity: props.get("opacity").and_then(Value::as_f64).unwrap_or(1.0),
        })
    }
}

impl SceneNode for SharedScreenNode {
    const COMPONENT_NAME: &'static str = "shared-screen";
    const NODE_NAME: &'static str = "Shared Screen";

    fn base(&self) -> &BaseObject {
        &self.base
    }

    fn serialize(&self) -> AppResult<SerializedNode> {
        self.base.serialize(vec![Component {
            name: Self::COMPONENT_NAME.to_string(),
            props: json!({ "color": self.color, "opacity": self.opacity }),
        }])
    }

    fn export_components(&self) -> Map<String, Value> {
        let mut components = Map::new();
        components.insert(Self::COMPONENT_NAME.to_string(), json!({}));
        components
    }
}
