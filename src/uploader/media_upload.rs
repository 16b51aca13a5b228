use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::errors::AppResult;
use crate::models::{UploadResponse, UploadResult};
use crate::transport::{ApiRequest, HttpMethod, ProgressCallback};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "oga", "wav", "flac", "weba"];

/// In-memory file handed to the uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(content_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: None,
            content_type: content_type.to_string(),
            data,
        }
    }

    pub fn named(name: &str, content_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: Some(name.to_string()),
            content_type: content_type.to_string(),
            data,
        }
    }

    pub fn json(value: &serde_json::Value) -> AppResult<Self> {
        Ok(Self::new("application/json", serde_json::to_vec(value)?))
    }

    /// Read a file from disk, inferring the content type from its extension.
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let content_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("glb") => "model/gltf-binary",
            Some("gltf") => "model/gltf",
            Some("mp4") => "video/mp4",
            Some("mp3") => "audio/mpeg",
            Some("ogg") => "audio/ogg",
            Some("wav") => "audio/wav",
            Some("m4a") => "audio/mp4",
            Some("pdf") => "application/pdf",
            _ => "application/octet-stream",
        };

        Ok(Self::named(&name, content_type, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / 1024.0 / 1024.0
    }

    pub fn is_audio(&self) -> bool {
        if self.content_type.starts_with("audio/") {
            return true;
        }

        self.name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// `data:` URL form the media endpoint accepts.
pub fn blob_to_data_url(blob: &Blob) -> String {
    format!("data:{};base64,{}", blob.content_type, STANDARD.encode(&blob.data))
}

impl ApiClient {
    /// Upload one blob to the media endpoint. Every call creates a new remote
    /// file; results are never cached.
    pub async fn upload(
        &self,
        blob: &Blob,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<UploadResult> {
        let request = ApiRequest::new(HttpMethod::Post, self.config.api_url("/api/v1/media"))
            .with_headers(self.headers(false))
            .with_form(vec![("media".to_string(), blob_to_data_url(blob))]);

        log::debug!(
            "Uploading {} ({} bytes, {})",
            blob.name.as_deref().unwrap_or("blob"),
            blob.size(),
            blob.content_type
        );

        let response = self.fetch(request, progress, cancel).await?;
        let upload: UploadResponse = response.json()?;

        Ok(upload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_to_data_url() {
        let blob = Blob::new("text/plain", b"hi".to_vec());
        assert_eq!(blob_to_data_url(&blob), "data:text/plain;base64,aGk=");
    }

    #[test]
    fn test_audio_detection() {
        assert!(Blob::new("audio/mpeg", vec![]).is_audio());
        assert!(Blob::named("song.OGG", "application/octet-stream", vec![]).is_audio());
        assert!(!Blob::named("chair.glb", "model/gltf-binary", vec![]).is_audio());
    }

    #[test]
    fn test_json_blob() {
        let blob = Blob::json(&serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(blob.content_type, "application/json");
        assert_eq!(blob.data, br#"{"a":1}"#.to_vec());
    }
}
