use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::AppResult;
use crate::models::{PublishParams, SceneMetadata};
use crate::uploader::Blob;

pub const PROJECT_THUMBNAIL_WIDTH: u32 = 512;
pub const PROJECT_THUMBNAIL_HEIGHT: u32 = 320;
pub const SCENE_SCREENSHOT_WIDTH: u32 = 1920;
pub const SCENE_SCREENSHOT_HEIGHT: u32 = 1080;

/// Binary scene plus the performance scores computed while exporting it.
#[derive(Debug, Clone)]
pub struct ExportedScene {
    pub glb: Blob,
    pub scores: Value,
}

/// The editor side of saving and publishing. Implementations own the
/// scene graph; the client only asks it for serialized output.
#[async_trait]
pub trait SceneEditor: Send + Sync {
    fn scene_modified(&self) -> bool;

    fn scene_name(&self) -> String;

    fn scene_metadata(&self) -> SceneMetadata;

    fn set_scene_metadata(&self, params: &PublishParams);

    fn content_attributions(&self) -> Vec<Value>;

    fn serialize_scene(&self) -> AppResult<Value>;

    async fn take_screenshot(&self, width: u32, height: u32) -> AppResult<Blob>;

    async fn export_scene(&self, cancel: &CancellationToken) -> AppResult<ExportedScene>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub email: String,
    pub token: String,
}

/// Everything the publish dialog shows before the user confirms.
#[derive(Debug, Clone)]
pub struct PublishDialogRequest {
    pub screenshot: Blob,
    pub content_attributions: Vec<Value>,
    pub initial_params: PublishParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub title: String,
    pub message: String,
    pub cancelable: bool,
}

impl ProgressUpdate {
    pub fn new(title: &str, message: impl Into<String>, cancelable: bool) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            cancelable,
        }
    }
}

/// User-facing prompts. `None`/`false` answers mean the user backed out.
#[async_trait]
pub trait Prompts: Send + Sync {
    async fn login(&self) -> Option<LoginCredentials>;

    async fn publish_params(&self, request: PublishDialogRequest) -> Option<PublishParams>;

    async fn performance_check(&self, scores: &Value) -> bool;

    fn progress(&self, update: ProgressUpdate);
}
