use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub scene: Option<ProjectScene>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectScene {
    pub scene_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allow_promotion: bool,
    #[serde(default)]
    pub allow_remixing: bool,
    #[serde(default)]
    pub attributions: SceneAttributions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneAttributions {
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub content: Vec<Value>,
}

/// File reference returned by the media endpoint for each upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub file_id: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub file_id: String,
    pub meta: UploadResponseMeta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponseMeta {
    pub access_token: String,
}

impl From<UploadResponse> for UploadResult {
    fn from(response: UploadResponse) -> Self {
        Self {
            file_id: response.file_id,
            access_token: response.meta.access_token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub attributions: Map<String, Value>,
    #[serde(default)]
    pub images: AssetImages,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetImages {
    pub preview: Option<PreviewImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewImage {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedAsset {
    pub asset_id: String,
    pub name: String,
    pub file_url: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl From<CreatedAsset> for AssetEntry {
    fn from(asset: CreatedAsset) -> Self {
        Self {
            id: asset.asset_id,
            name: asset.name,
            url: asset.file_url,
            asset_type: asset.asset_type,
            attributions: Map::new(),
            images: AssetImages {
                preview: Some(PreviewImage {
                    url: asset.thumbnail_url,
                }),
            },
        }
    }
}

/// Metadata the editor keeps on the scene root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    pub name: Option<String>,
    pub creator_attribution: Option<String>,
    pub allow_remixing: Option<bool>,
    pub allow_promotion: Option<bool>,
    pub scene_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishParams {
    pub name: String,
    pub creator_attribution: String,
    pub allow_remixing: bool,
    pub allow_promotion: bool,
    #[serde(default)]
    pub content_attributions: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub media_type: Option<String>,
    pub query: Option<String>,
    pub filter: Option<String>,
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub results: Vec<Value>,
    pub suggestions: Option<Value>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_keeps_unknown_fields() {
        let project: Project = serde_json::from_value(serde_json::json!({
            "project_id": "p1",
            "name": "Lobby",
            "scene": {
                "scene_id": "s1",
                "allow_remixing": true,
                "attributions": { "creator": "Ada", "content": [] }
            },
            "account_id": "a9"
        }))
        .unwrap();

        let scene = project.scene.unwrap();
        assert_eq!(scene.scene_id, "s1");
        assert!(scene.allow_remixing);
        assert!(!scene.allow_promotion);
        assert_eq!(project.extra["account_id"], "a9");
    }

    #[test]
    fn test_created_asset_maps_to_entry() {
        let created: CreatedAsset = serde_json::from_value(serde_json::json!({
            "asset_id": "as1",
            "name": "chair.glb",
            "file_url": "https://files/chair.glb",
            "type": "model",
            "thumbnail_url": "https://files/chair.png"
        }))
        .unwrap();

        let entry = AssetEntry::from(created);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "model");
        assert_eq!(json["images"]["preview"]["url"], "https://files/chair.png");
    }
}
