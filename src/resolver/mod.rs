// Media resolution: turns arbitrary media URLs into canonical, content-typed,
// proxy-safe URLs, with every network step deduplicated per (url, index).

pub mod cache;
pub mod unpack;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ApiConfig;
use crate::credentials::CredentialStore;
use crate::errors::{AppError, AppResult};
use crate::proxy::{self, GLTF_ZIP_CONTENT_TYPE};
use crate::security::InputValidator;
use crate::transport::{send_tagged, ApiRequest, HttpMethod, HttpTransport};

pub use cache::RequestCache;
pub use unpack::{ArchiveUnpacker, ZipArchiveUnpacker, ARCHIVE_ENTRY_POINT};

const SKETCHFAB_PREFIX: &str = "https://sketchfab.com/";

/// Backend answer for one media URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolvedUrl {
    pub origin: String,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

impl ResolvedUrl {
    pub fn expected_content_type(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("expected_content_type"))
            .and_then(Value::as_str)
            .filter(|ct| !ct.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub canonical_url: String,
    pub accessible_url: String,
    pub content_type: Option<String>,
    pub meta: Option<Map<String, Value>>,
    /// Archive entries, only for unpacked models
    pub files: Option<HashMap<String, String>>,
}

fn cache_key(url: &str, index: Option<u32>) -> String {
    match index {
        Some(index) => format!("{}|{}", url, index),
        None => format!("{}|", url),
    }
}

struct ResolverInner {
    config: Arc<ApiConfig>,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    unpacker: Arc<dyn ArchiveUnpacker>,
    url_cache: RequestCache<ResolvedUrl>,
    media_cache: RequestCache<Arc<ResolvedMedia>>,
}

/// Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct MediaResolver {
    inner: Arc<ResolverInner>,
}

impl MediaResolver {
    pub fn new(
        config: Arc<ApiConfig>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
        unpacker: Arc<dyn ArchiveUnpacker>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                config,
                transport,
                credentials,
                unpacker,
                url_cache: RequestCache::new("resolve-url"),
                media_cache: RequestCache::new("resolve-media"),
            }),
        }
    }

    pub fn url_cache(&self) -> &RequestCache<ResolvedUrl> {
        &self.inner.url_cache
    }

    pub fn media_cache(&self) -> &RequestCache<Arc<ResolvedMedia>> {
        &self.inner.media_cache
    }

    /// Resolve `url` through the media endpoint. Hosts that need no proxy
    /// come back unchanged without a request.
    pub async fn resolve_url(&self, url: &str, index: Option<u32>) -> AppResult<ResolvedUrl> {
        InputValidator::validate_media_url(url)?;

        if !proxy::should_cors_proxy(&self.inner.config, url) {
            return Ok(ResolvedUrl {
                origin: url.to_string(),
                meta: None,
            });
        }

        let resolver = self.clone();
        let owned_url = url.to_string();
        let request = self
            .inner
            .url_cache
            .get_or_start(&cache_key(url, index), move || async move {
                resolver.request_resolution(&owned_url, index).await
            });

        cache::join(request).await
    }

    async fn request_resolution(&self, url: &str, index: Option<u32>) -> AppResult<ResolvedUrl> {
        let config = &self.inner.config;
        let is_sketchfab = url.contains(SKETCHFAB_PREFIX);

        let (endpoint, headers) = if is_sketchfab {
            (
                config.media_url("/api/v1/media"),
                vec![("content-type".to_string(), "application/json".to_string())],
            )
        } else {
            (config.api_url("/api/v1/media"), self.auth_headers())
        };

        log::debug!("Resolving {} via {}", url, endpoint);

        let request = ApiRequest::new(HttpMethod::Post, endpoint)
            .with_headers(headers)
            .with_json(json!({ "media": { "url": url, "index": index } }));

        let response = send_tagged(
            self.inner.transport.as_ref(),
            request,
            None,
            &CancellationToken::new(),
        )
        .await?;

        if !response.is_success() {
            let body = response.text();
            let detail = if body.trim().is_empty() {
                response.status_text.clone()
            } else {
                body
            };

            return Err(AppError::ResolutionFailed {
                url: url.to_string(),
                detail: detail.replace('\n', "\n  "),
            });
        }

        response.json()
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];

        if let Ok(Some(token)) = self.inner.credentials.access_token() {
            headers.push(("authorization".to_string(), format!("Bearer {}", token)));
        }

        headers
    }

    /// Content type by priority: resolution metadata, extension, HEAD.
    pub async fn content_type(&self, url: &str) -> AppResult<Option<String>> {
        let resolved = self.resolve_url(url, None).await?;
        let accessible_url = proxy::proxied_url_for(&self.inner.config, &resolved.origin);
        self.content_type_for(&resolved, &accessible_url).await
    }

    async fn content_type_for(
        &self,
        resolved: &ResolvedUrl,
        accessible_url: &str,
    ) -> AppResult<Option<String>> {
        if let Some(content_type) = resolved.expected_content_type() {
            return Ok(Some(content_type.to_string()));
        }

        if let Some(content_type) = proxy::guess_content_type(&resolved.origin) {
            return Ok(Some(content_type.to_string()));
        }

        self.fetch_content_type(accessible_url).await
    }

    async fn fetch_content_type(&self, accessible_url: &str) -> AppResult<Option<String>> {
        let response = send_tagged(
            self.inner.transport.as_ref(),
            ApiRequest::head(accessible_url),
            None,
            &CancellationToken::new(),
        )
        .await?;

        if !response.is_success() {
            return Err(AppError::transport(
                accessible_url,
                Some(response.status),
                format!("HEAD request failed with status {}", response.status),
            ));
        }

        Ok(response.header("content-type").map(str::to_string))
    }

    /// Full resolution of a media URL, including archive unpacking. The whole
    /// result is cached per (absolute url, index).
    pub async fn resolve_media(&self, url: &str, index: Option<u32>) -> AppResult<Arc<ResolvedMedia>> {
        let config = &self.inner.config;
        let editor_origin = url::Url::parse(&config.server_url)?;
        let absolute = editor_origin.join(url)?;
        let absolute_url = absolute.to_string();

        if absolute.origin() == editor_origin.origin() {
            log::debug!("{} is served by the editor origin, no resolution needed", absolute_url);
            return Ok(Arc::new(ResolvedMedia {
                canonical_url: absolute_url.clone(),
                accessible_url: absolute_url,
                content_type: None,
                meta: None,
                files: None,
            }));
        }

        let resolver = self.clone();
        let key = cache_key(&absolute_url, index);
        let request = self
            .inner
            .media_cache
            .get_or_start(&key, move || async move {
                resolver.load_media(absolute_url, index).await.map(Arc::new)
            });

        cache::join(request).await
    }

    async fn load_media(&self, absolute_url: String, index: Option<u32>) -> AppResult<ResolvedMedia> {
        let (resolved, accessible_url, content_type) = async {
            let resolved = self.resolve_url(&absolute_url, index).await?;
            let accessible_url = proxy::proxied_url_for(&self.inner.config, &resolved.origin);
            let content_type = self.content_type_for(&resolved, &accessible_url).await?;
            Ok::<_, AppError>((resolved, accessible_url, content_type))
        }
        .await
        .map_err(|e| AppError::media_resolution(&absolute_url, e))?;

        if content_type.as_deref() == Some(GLTF_ZIP_CONTENT_TYPE) {
            let files = self
                .inner
                .unpacker
                .unpack(&accessible_url)
                .await
                .map_err(|e| AppError::unpack(&accessible_url, e))?;

            let entry_url = files.get(ARCHIVE_ENTRY_POINT).cloned().ok_or_else(|| {
                AppError::unpack(
                    &accessible_url,
                    AppError::validation(
                        "archive",
                        &format!("Archive has no {} entry", ARCHIVE_ENTRY_POINT),
                    ),
                )
            })?;

            return Ok(ResolvedMedia {
                canonical_url: resolved.origin,
                accessible_url: entry_url,
                content_type,
                meta: resolved.meta,
                files: Some(files),
            });
        }

        log::info!(
            "Resolved {} -> {} ({})",
            absolute_url,
            accessible_url,
            content_type.as_deref().unwrap_or("unknown type")
        );

        Ok(ResolvedMedia {
            canonical_url: resolved.origin,
            accessible_url,
            content_type,
            meta: resolved.meta,
            files: None,
        })
    }
}
