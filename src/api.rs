use serde_json::Value;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ApiConfig;
use crate::credentials::{decode_account_id, CredentialStore, FileCredentialStore, UserInfo};
use crate::errors::{AppError, AppResult};
use crate::events::{ClientEvent, EventBus};
use crate::models::{Project, SearchParams, SearchResults};
use crate::proxy;
use crate::resolver::{ArchiveUnpacker, MediaResolver, ZipArchiveUnpacker};
use crate::security::InputValidator;
use crate::transport::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, ProgressCallback, ReqwestTransport,
    send_tagged,
};
use crate::uploader::RateLimiter;

/// Client for the scene backend: projects, scenes, assets, media
/// resolution and the publish workflow.
pub struct ApiClient {
    pub(crate) config: Arc<ApiConfig>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) resolver: MediaResolver,
    pub(crate) asset_rate_limiter: RateLimiter,
    pub(crate) events: EventBus,
}

impl ApiClient {
    pub fn new(
        config: ApiConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
        unpacker: Arc<dyn ArchiveUnpacker>,
    ) -> Self {
        let config = Arc::new(config);
        let resolver = MediaResolver::new(
            config.clone(),
            transport.clone(),
            credentials.clone(),
            unpacker,
        );
        let asset_rate_limiter =
            RateLimiter::new(Duration::from_millis(config.asset_request_interval_ms));

        Self {
            config,
            transport,
            credentials,
            resolver,
            asset_rate_limiter,
            events: EventBus::default(),
        }
    }

    /// Production wiring: reqwest transport, file-backed credentials and
    /// on-disk archive extraction.
    pub fn from_config(config: ApiConfig) -> AppResult<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            Duration::from_secs(config.request_timeout_secs),
        )?);
        let credentials: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::open_default()?);
        let unpacker: Arc<dyn ArchiveUnpacker> = Arc::new(ZipArchiveUnpacker::in_temp_dir(
            transport.clone(),
            &config,
        )?);

        Ok(Self::new(config, transport, credentials, unpacker))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn resolver(&self) -> &MediaResolver {
        &self.resolver
    }

    // Authentication

    pub fn is_authenticated(&self) -> bool {
        matches!(self.credentials.access_token(), Ok(Some(ref token)) if !token.is_empty())
    }

    pub fn token(&self) -> AppResult<String> {
        self.credentials
            .access_token()?
            .ok_or_else(|| AppError::Credentials("No access token stored".to_string()))
    }

    pub fn account_id(&self) -> AppResult<String> {
        decode_account_id(&self.token()?)
    }

    /// Persist credentials delivered by a completed login.
    pub fn complete_login(&self, email: &str, token: &str) -> AppResult<()> {
        self.credentials.save_credentials(email, token)?;
        self.events.emit(ClientEvent::AuthenticationChanged(true));
        Ok(())
    }

    pub fn logout(&self) -> AppResult<()> {
        self.credentials.clear()?;
        self.events.emit(ClientEvent::AuthenticationChanged(false));
        Ok(())
    }

    pub fn user_info(&self) -> Option<UserInfo> {
        match self.credentials.user_info() {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Failed to read user info (non-critical): {}", e);
                None
            }
        }
    }

    pub fn set_user_info(&self, info: &UserInfo) {
        if let Err(e) = self.credentials.set_user_info(info) {
            log::warn!("Failed to store user info (non-critical): {}", e);
        }
    }

    // Request plumbing

    pub(crate) fn headers(&self, json: bool) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        match self.credentials.access_token() {
            Ok(Some(token)) => headers.push(("authorization".to_string(), format!("Bearer {}", token))),
            Ok(None) => log::debug!("No access token stored, sending unauthenticated request"),
            Err(e) => log::warn!("Failed to read access token: {}", e),
        }

        if json {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }

        headers
    }

    /// Send a request and classify the outcome: 2xx passes through, 401
    /// becomes `AuthenticationRequired`, anything else a `Transport` error
    /// carrying the URL and response detail.
    pub(crate) async fn fetch(
        &self,
        request: ApiRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<ApiResponse> {
        let url = request.url.clone();

        let response = send_tagged(self.transport.as_ref(), request, progress, cancel).await?;

        if response.is_success() {
            return Ok(response);
        }

        if response.status == 401 {
            return Err(AppError::authentication_required(&url));
        }

        let body = response.text();
        let status_text = if response.status_text.is_empty() {
            "Unknown Error. Possibly a CORS error.".to_string()
        } else {
            response.status_text.clone()
        };
        let detail = if body.trim().is_empty() {
            format!("Network Error: {} {}", response.status, status_text)
        } else {
            format!("Network Error: {} {}. {}", response.status, status_text, body.trim())
        };

        Err(AppError::transport(&url, Some(response.status), detail))
    }

    pub(crate) async fn fetch_json(&self, request: ApiRequest, cancel: &CancellationToken) -> AppResult<Value> {
        self.fetch(request, None, cancel).await?.json()
    }

    // Projects and scenes

    pub async fn get_projects(&self) -> AppResult<Vec<Project>> {
        let request = ApiRequest::get(self.config.api_url("/api/v1/projects")).with_headers(self.headers(true));
        let json = self.fetch_json(request, &CancellationToken::new()).await?;

        match json.get("projects") {
            Some(Value::Array(projects)) => Ok(projects
                .iter()
                .cloned()
                .map(serde_json::from_value)
                .collect::<Result<Vec<Project>, _>>()?),
            _ => Err(AppError::unexpected(
                "Error fetching projects",
                json.get("error").and_then(Value::as_str).unwrap_or("Unknown error."),
            )),
        }
    }

    pub async fn get_project(&self, project_id: &str) -> AppResult<Project> {
        InputValidator::validate_project_id(project_id)?;
        let request = ApiRequest::get(self.config.api_url(&format!("/api/v1/projects/{}", project_id)))
            .with_headers(self.headers(true));

        self.fetch(request, None, &CancellationToken::new()).await?.json()
    }

    pub async fn get_projectless_scenes(&self) -> AppResult<Vec<Value>> {
        let request = ApiRequest::get(self.config.api_url("/api/v1/scenes/projectless"))
            .with_headers(self.headers(true));
        let json = self.fetch_json(request, &CancellationToken::new()).await?;

        match json.get("scenes") {
            Some(Value::Array(scenes)) => Ok(scenes.clone()),
            _ => Err(AppError::unexpected(
                "Error fetching scenes",
                json.get("error").and_then(Value::as_str).unwrap_or("Unknown error."),
            )),
        }
    }

    pub async fn get_scene(&self, scene_id: &str) -> AppResult<Value> {
        let request = ApiRequest::get(self.config.api_url(&format!("/api/v1/scenes/{}", scene_id)))
            .with_headers(self.headers(true));
        let json = self.fetch_json(request, &CancellationToken::new()).await?;

        json.get("scenes")
            .and_then(|scenes| scenes.get(0))
            .cloned()
            .ok_or_else(|| AppError::unexpected("Error fetching scene", "Scene not found"))
    }

    pub fn scene_url(&self, scene_id: &str) -> String {
        proxy::scene_url(&self.config, scene_id)
    }

    pub async fn delete_project(&self, project_id: &str) -> AppResult<()> {
        InputValidator::validate_project_id(project_id)?;
        self.delete(&format!("/api/v1/projects/{}", project_id)).await
    }

    pub async fn delete_asset(&self, asset_id: &str) -> AppResult<()> {
        self.delete(&format!("/api/v1/assets/{}", asset_id)).await
    }

    pub async fn delete_project_asset(&self, project_id: &str, asset_id: &str) -> AppResult<()> {
        InputValidator::validate_project_id(project_id)?;
        self.delete(&format!("/api/v1/projects/{}/assets/{}", project_id, asset_id))
            .await
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let request = ApiRequest::new(HttpMethod::Delete, self.config.api_url(path))
            .with_headers(self.headers(true));

        self.fetch(request, None, &CancellationToken::new()).await?;
        log::info!("Deleted {}", path);
        Ok(())
    }

    // Media URLs

    pub fn proxy_url(&self, url: &str) -> String {
        proxy::proxied_url_for(&self.config, url)
    }

    pub fn unproxy_url(&self, base_url: &str, url: &str) -> String {
        proxy::unproxy_url(&self.config, base_url, url)
    }

    pub fn scaled_thumbnail_url(&self, url: &str, width: u32, height: u32) -> String {
        proxy::scaled_thumbnail_url_for(&self.config, url, width, height)
    }

    pub async fn search_media(
        &self,
        source: &str,
        params: &SearchParams,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<SearchResults> {
        let mut url = url::Url::parse(&self.config.media_url("/api/v1/media/search"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("source", source);

            if source == "assets" {
                query.append_pair("user", &self.account_id()?);
            }

            let optional = [
                ("type", &params.media_type),
                ("q", &params.query),
                ("filter", &params.filter),
                ("collection", &params.collection),
            ];
            for (key, value) in optional {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    query.append_pair(key, value);
                }
            }

            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }

        let request = ApiRequest::get(url.as_str()).with_headers(vec![(
            "content-type".to_string(),
            "application/json".to_string(),
        )]);
        let response = self.fetch(request, None, cancel).await?;

        if cancel.is_cancelled() {
            return Err(AppError::aborted("Media search"));
        }

        let json: Value = response.json()?;

        let results = json
            .get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|entry| self.thumbnail_entry(entry))
            .collect();

        Ok(SearchResults {
            results,
            suggestions: json.get("suggestions").cloned(),
            next_cursor: json
                .pointer("/meta/next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn thumbnail_entry(&self, mut entry: Value) -> Value {
        if let Some(preview) = entry.pointer_mut("/images/preview") {
            let is_video = preview.get("type").and_then(Value::as_str) == Some("mp4");
            let rewritten = preview.get("url").and_then(Value::as_str).map(|url| {
                if is_video {
                    proxy::proxied_url_for(&self.config, url)
                } else {
                    proxy::scaled_thumbnail_url_for(&self.config, url, 200, 200)
                }
            });

            if let Some(url) = rewritten {
                preview["url"] = Value::String(url);
            }
        }

        entry
    }
}
