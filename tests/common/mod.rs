#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use spoke_publisher::credentials::{CredentialStore, UserInfo};
use spoke_publisher::errors::{AppError, AppResult};
use spoke_publisher::resolver::ZipArchiveUnpacker;
use spoke_publisher::transport::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, ProgressCallback, RequestBody,
};
use spoke_publisher::uploader::{Blob, ThumbnailGenerator};
use spoke_publisher::{ApiClient, ApiConfig};

pub const API: &str = "https://api.test";
pub const MEDIA: &str = "https://media.test";
pub const PROXY: &str = "https://proxy.test";
pub const EDITOR: &str = "https://editor.test";

pub fn test_config() -> ApiConfig {
    ApiConfig {
        reticulum_server: API.to_string(),
        media_server: MEDIA.to_string(),
        cors_proxy_server: Some(PROXY.to_string()),
        thumbnail_server: "https://thumbs.test".to_string(),
        hubs_server: "hubs.test".to_string(),
        non_cors_proxy_domains: vec!["api.test".to_string()],
        server_url: EDITOR.to_string(),
        ..ApiConfig::default()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub authorization: Option<String>,
    pub json: Option<Value>,
    pub at: Instant,
}

type Handler = dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync;

/// In-memory backend. Every request is recorded with the (tokio) time it
/// arrived; the handler decides the response.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, handler)
    }

    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn matching(&self, method: HttpMethod, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(
        &self,
        request: ApiRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<ApiResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            authorization: request.header("authorization").map(str::to_string),
            json: request.json_body().cloned(),
            at: Instant::now(),
        });

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::aborted("Request")),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if let (Some(progress), RequestBody::Form(_)) = (&progress, &request.body) {
            progress(0.5);
            progress(0.25);
            progress(1.0);
        }

        if cancel.is_cancelled() {
            return Err(AppError::aborted("Request"));
        }

        Ok((self.handler)(&request))
    }
}

pub fn json_response(status: u16, body: Value) -> ApiResponse {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());

    ApiResponse {
        status,
        status_text: status_text(status).to_string(),
        headers,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn status_response(status: u16, body: &str) -> ApiResponse {
    ApiResponse {
        status,
        status_text: status_text(status).to_string(),
        headers: HashMap::new(),
        body: body.as_bytes().to_vec(),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Media endpoint reply for uploads, numbered by call.
pub fn upload_response(n: usize) -> ApiResponse {
    json_response(
        200,
        json!({ "file_id": format!("file-{}", n), "meta": { "access_token": format!("token-{}", n) } }),
    )
}

#[derive(Default)]
pub struct MemoryCredentials {
    token: Mutex<Option<String>>,
    email: Mutex<Option<String>>,
    user_info: Mutex<Option<UserInfo>>,
}

impl MemoryCredentials {
    pub fn logged_in(token: &str) -> Arc<Self> {
        let credentials = Self::default();
        *credentials.token.lock().unwrap() = Some(token.to_string());
        Arc::new(credentials)
    }

    pub fn logged_out() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CredentialStore for MemoryCredentials {
    fn access_token(&self) -> AppResult<Option<String>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn access_key(&self) -> AppResult<Option<String>> {
        Ok(None)
    }

    fn email(&self) -> AppResult<Option<String>> {
        Ok(self.email.lock().unwrap().clone())
    }

    fn save_credentials(&self, email: &str, token: &str) -> AppResult<()> {
        *self.email.lock().unwrap() = Some(email.to_string());
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.token.lock().unwrap() = None;
        *self.email.lock().unwrap() = None;
        Ok(())
    }

    fn user_info(&self) -> AppResult<Option<UserInfo>> {
        Ok(self.user_info.lock().unwrap().clone())
    }

    fn set_user_info(&self, info: &UserInfo) -> AppResult<()> {
        *self.user_info.lock().unwrap() = Some(info.clone());
        Ok(())
    }
}

pub struct StaticThumbnailer;

#[async_trait]
impl ThumbnailGenerator for StaticThumbnailer {
    async fn generate_file_thumbnail(&self, _file: &Blob) -> AppResult<Blob> {
        Ok(Blob::named("thumb.png", "image/png", vec![1, 2, 3]))
    }
}

pub fn scratch_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("spoke-publisher-{}-{}", label, uuid::Uuid::new_v4()))
}

pub fn client_with(
    config: ApiConfig,
    transport: Arc<MockTransport>,
    credentials: Arc<MemoryCredentials>,
) -> ApiClient {
    let unpacker = Arc::new(ZipArchiveUnpacker::new(transport.clone(), scratch_dir("archives")));
    ApiClient::new(config, transport, credentials, unpacker)
}

pub fn client(transport: Arc<MockTransport>) -> ApiClient {
    client_with(test_config(), transport, MemoryCredentials::logged_in("test-token"))
}
