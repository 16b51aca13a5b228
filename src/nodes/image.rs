use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::errors::{AppError, AppResult};
use crate::nodes::{BaseObject, Component, IssueSeverity, NodeIssue, SceneNode, SerializedNode};
use crate::transport::ApiRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMode {
    Opaque,
    #[default]
    Blend,
    Mask,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    #[serde(rename = "flat")]
    Flat,
    #[serde(rename = "360-equirectangular")]
    Equirectangular,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProps {
    #[serde(default)]
    src: String,
    #[serde(default)]
    changeable: bool,
    #[serde(default)]
    changeable_src: String,
    #[serde(default)]
    controls: bool,
    #[serde(default)]
    alpha_mode: Option<AlphaMode>,
    #[serde(default)]
    alpha_cutoff: Option<f64>,
    #[serde(default)]
    projection: Option<Projection>,
}

/// Flat or 360° image whose source may be swapped at runtime through a
/// small JSON document (`{ "src": ... }`) when `changeable` is set.
#[derive(Debug, Clone)]
pub struct ImageNode {
    pub base: BaseObject,
    canonical_url: String,
    pub accessible_url: Option<String>,
    pub meta: Option<Map<String, Value>>,
    changeable: bool,
    changeable_src: String,
    pub controls: bool,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f64,
    pub projection: Projection,
    pub billboard: bool,
    pub href: String,
    pub issues: Vec<NodeIssue>,
}

impl Default for ImageNode {
    fn default() -> Self {
        Self {
            base: BaseObject::new(Self::NODE_NAME),
            canonical_url: String::new(),
            accessible_url: None,
            meta: None,
            changeable: false,
            changeable_src: String::new(),
            controls: true,
            alpha_mode: AlphaMode::Blend,
            alpha_cutoff: 0.5,
            projection: Projection::Flat,
            billboard: false,
            href: String::new(),
            issues: Vec::new(),
        }
    }
}

impl ImageNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src(&self) -> &str {
        &self.canonical_url
    }

    pub fn changeable(&self) -> bool {
        self.changeable
    }

    pub fn changeable_src(&self) -> &str {
        &self.changeable_src
    }

    /// Rebuild a node from a saved scene and load its image. Load failures
    /// are kept on the node as issues; only malformed documents fail.
    pub async fn deserialize(client: &ApiClient, json: &SerializedNode) -> AppResult<Self> {
        let props: ImageProps = serde_json::from_value(json.props(Self::COMPONENT_NAME)?.clone())?;

        let mut node = Self {
            base: BaseObject::from_serialized(json)?,
            ..Self::default()
        };

        node.billboard = json.component("billboard").is_some();
        if let Some(href) = json
            .component("link")
            .and_then(|link| link.props.get("href"))
            .and_then(Value::as_str)
        {
            node.href = href.to_string();
        }

        let load_result = if props.changeable {
            match client.src_from_json(&props.changeable_src).await {
                Ok(src) => node.load(client, &src).await,
                Err(e) => Err(node.record_load_error(&props.changeable_src, e)),
            }
        } else {
            node.load(client, &props.src).await
        };

        if let Err(e) = load_result {
            log::warn!("{}", crate::errors::error_chain(&e));
        }

        node.changeable = props.changeable;
        node.changeable_src = props.changeable_src;
        node.controls = props.controls;
        node.alpha_mode = props.alpha_mode.unwrap_or_default();
        node.alpha_cutoff = props.alpha_cutoff.unwrap_or(0.5);
        node.projection = props.projection.unwrap_or_default();

        Ok(node)
    }

    /// Resolve `src` and point the node at its accessible URL. Loading the
    /// same non-empty source twice is a no-op.
    pub async fn load(&mut self, client: &ApiClient, src: &str) -> AppResult<()> {
        if src == self.canonical_url && !src.is_empty() {
            return Ok(());
        }

        self.canonical_url = src.to_string();
        self.issues.clear();
        self.accessible_url = None;

        match client.resolver().resolve_media(src, None).await {
            Ok(resolved) => {
                self.meta = resolved.meta.clone();
                self.accessible_url = Some(resolved.accessible_url.clone());
                Ok(())
            }
            Err(e) => Err(self.record_load_error(src, e)),
        }
    }

    pub async fn set_src(&mut self, client: &ApiClient, src: &str) -> AppResult<()> {
        self.load(client, src).await
    }

    pub async fn set_changeable(&mut self, client: &ApiClient, changeable: bool) -> AppResult<()> {
        self.changeable = changeable;
        self.reload_changeable(client).await
    }

    pub async fn set_changeable_src(&mut self, client: &ApiClient, url: &str) -> AppResult<()> {
        self.changeable_src = url.to_string();
        self.reload_changeable(client).await
    }

    async fn reload_changeable(&mut self, client: &ApiClient) -> AppResult<()> {
        if !self.changeable {
            return Ok(());
        }

        let src = client.src_from_json(&self.changeable_src).await?;
        self.load(client, &src).await
    }

    fn record_load_error(&mut self, src: &str, error: AppError) -> AppError {
        self.issues.push(NodeIssue {
            severity: IssueSeverity::Error,
            message: "Error loading image.".to_string(),
        });

        AppError::ImageLoad {
            url: src.to_string(),
            source: Box::new(error),
        }
    }

    fn image_props(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("src".to_string(), json!(self.canonical_url));
        props.insert("changeable".to_string(), json!(self.changeable));
        props.insert("changeableSrc".to_string(), json!(self.changeable_src));
        props.insert("controls".to_string(), json!(self.controls));
        props.insert("alphaMode".to_string(), json!(self.alpha_mode));
        props.insert("projection".to_string(), json!(self.projection));
        props
    }
}

impl SceneNode for ImageNode {
    const COMPONENT_NAME: &'static str = "image";
    const NODE_NAME: &'static str = "Image";

    fn base(&self) -> &BaseObject {
        &self.base
    }

    fn serialize(&self) -> AppResult<SerializedNode> {
        let mut image = self.image_props();
        image.insert("alphaCutoff".to_string(), json!(self.alpha_cutoff));

        let mut components = vec![Component {
            name: Self::COMPONENT_NAME.to_string(),
            props: Value::Object(image),
        }];

        if self.billboard {
            components.push(Component {
                name: "billboard".to_string(),
                props: json!({}),
            });
        }

        if !self.href.is_empty() {
            components.push(Component {
                name: "link".to_string(),
                props: json!({ "href": self.href }),
            });
        }

        self.base.serialize(components)
    }

    fn export_components(&self) -> Map<String, Value> {
        let mut image = self.image_props();
        if self.alpha_mode == AlphaMode::Mask {
            image.insert("alphaCutoff".to_string(), json!(self.alpha_cutoff));
        }

        let mut components = Map::new();
        components.insert(Self::COMPONENT_NAME.to_string(), Value::Object(image));
        components.insert(
            "networked".to_string(),
            json!({ "id": self.base.uuid.to_string() }),
        );

        if self.projection == Projection::Flat {
            if self.billboard {
                components.insert("billboard".to_string(), json!({}));
            }
            if !self.href.is_empty() {
                components.insert("link".to_string(), json!({ "href": self.href }));
            }
        }

        components
    }
}

impl ApiClient {
    /// Fetch a changeable-source document and return its `src`.
    pub async fn src_from_json(&self, url: &str) -> AppResult<String> {
        let json = self
            .fetch_json(ApiRequest::get(url), &CancellationToken::new())
            .await?;

        json.get("src")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::unexpected("Error reading image source", "Document has no src"))
    }
}
