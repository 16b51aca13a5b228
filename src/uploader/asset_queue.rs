use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::errors::{AppError, AppResult};
use crate::models::{AssetEntry, CreatedAsset, UploadResult};
use crate::security::InputValidator;
use crate::transport::{ApiRequest, HttpMethod, ProgressCallback};
use crate::uploader::media_upload::Blob;
use crate::uploader::progress_tracker::{batch_item, BatchProgressCallback};
use crate::uploader::thumbnail::ThumbnailGenerator;

impl ApiClient {
    /// Upload a file and register it as an account asset.
    pub async fn upload_asset(
        &self,
        thumbnailer: &dyn ThumbnailGenerator,
        file: &Blob,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<AssetEntry> {
        self.upload_asset_to("/api/v1/assets", thumbnailer, file, progress, cancel)
            .await
    }

    /// Upload a file and register it as an asset of `project_id`.
    pub async fn upload_project_asset(
        &self,
        thumbnailer: &dyn ThumbnailGenerator,
        project_id: &str,
        file: &Blob,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<AssetEntry> {
        InputValidator::validate_project_id(project_id)?;
        let endpoint = format!("/api/v1/projects/{}/assets", project_id);
        self.upload_asset_to(&endpoint, thumbnailer, file, progress, cancel)
            .await
    }

    async fn upload_asset_to(
        &self,
        endpoint: &str,
        thumbnailer: &dyn ThumbnailGenerator,
        file: &Blob,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<AssetEntry> {
        let name = file
            .name
            .as_deref()
            .map(InputValidator::sanitize_filename)
            .unwrap_or_else(|| "asset".to_string());

        let thumbnail: Option<UploadResult> = if file.is_audio() {
            None
        } else {
            let thumbnail = thumbnailer.generate_file_thumbnail(file).await?;
            Some(self.upload(&thumbnail, None, cancel).await?)
        };

        let body = self.upload(file, progress, cancel).await?;

        if cancel.is_cancelled() {
            return Err(AppError::aborted("Asset upload"));
        }

        self.asset_rate_limiter.wait().await;

        let request = ApiRequest::new(HttpMethod::Post, self.config.api_url(endpoint))
            .with_headers(self.headers(true))
            .with_json(json!({
                "asset": {
                    "name": name,
                    "file_id": body.file_id,
                    "access_token": body.access_token,
                    "thumbnail_file_id": thumbnail.as_ref().map(|t| t.file_id.as_str()),
                    "thumbnail_access_token": thumbnail.as_ref().map(|t| t.access_token.as_str()),
                }
            }));

        let result = self.fetch_json(request, cancel).await;
        self.asset_rate_limiter.mark();
        let json = result?;

        let created = json
            .get("assets")
            .and_then(|assets| assets.get(0))
            .cloned()
            .ok_or_else(|| AppError::unexpected("Error creating asset", "Response has no assets"))?;
        let created: CreatedAsset = serde_json::from_value::<CreatedAsset>(created)?;

        log::info!("Created asset {} ({})", created.name, created.asset_id);
        Ok(created.into())
    }

    /// Upload files one at a time, in order. Cancellation stops the batch
    /// quietly and returns what finished before it.
    pub async fn upload_assets(
        &self,
        thumbnailer: &dyn ThumbnailGenerator,
        files: &[Blob],
        progress: Option<BatchProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<AssetEntry>> {
        let total = files.len();
        let mut assets = Vec::with_capacity(total);

        for file in files {
            if cancel.is_cancelled() {
                log::info!("Asset batch cancelled after {} of {} files", assets.len(), total);
                break;
            }

            let item_progress = progress
                .clone()
                .map(|callback| batch_item(callback, assets.len() + 1, total));
            let item_cancel = cancel.child_token();

            match self.upload_asset(thumbnailer, file, item_progress, &item_cancel).await {
                Ok(asset) => assets.push(asset),
                Err(e) if e.is_aborted() => {
                    log::info!("Asset batch cancelled after {} of {} files", assets.len(), total);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(assets)
    }

    pub async fn get_project_assets(&self, project_id: &str) -> AppResult<Vec<AssetEntry>> {
        InputValidator::validate_project_id(project_id)?;
        let request = ApiRequest::get(
            self.config
                .api_url(&format!("/api/v1/projects/{}/assets", project_id)),
        )
        .with_headers(self.headers(true));

        let json = self.fetch_json(request, &CancellationToken::new()).await?;
        asset_entries(&json)
    }
}

/// Pull the asset list out of a project asset listing.
pub fn asset_entries(json: &Value) -> AppResult<Vec<AssetEntry>> {
    match json.get("assets") {
        Some(Value::Array(assets)) => assets
            .iter()
            .cloned()
            .map(|asset| Ok(serde_json::from_value::<CreatedAsset>(asset)?.into()))
            .collect(),
        _ => Err(AppError::unexpected(
            "Error fetching assets",
            json.get("error").and_then(Value::as_str).unwrap_or("Unknown error."),
        )),
    }
}
