use async_trait::async_trait;
use reqwest::{multipart, Body, Client};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};

/// Size of the body slices handed to the connection, and the granularity of
/// upload progress reports.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Receives the fraction (0.0..=1.0) of a request body sent so far.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Multipart form of text fields
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sends one request to the backend. Implementations must return any HTTP
/// status as a response and abort promptly once `cancel` fires.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: ApiRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<ApiResponse>;
}

/// Send through `transport`, tagging failures with the request URL.
/// Cancellations pass through unchanged.
pub async fn send_tagged(
    transport: &dyn HttpTransport,
    request: ApiRequest,
    progress: Option<ProgressCallback>,
    cancel: &CancellationToken,
) -> AppResult<ApiResponse> {
    let url = request.url.clone();

    match transport.send(request, progress, cancel).await {
        Err(e) if !e.is_aborted() => {
            let detail = match &e {
                AppError::Network(err) if err.is_connect() => {
                    "connection failed (possibly blocked by a proxy or CORS policy)".to_string()
                }
                other => other.to_string(),
            };
            Err(AppError::Transport {
                url,
                status: None,
                detail,
                source: Some(Box::new(e)),
            })
        }
        result => result,
    }
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    async fn exchange(
        &self,
        request: ApiRequest,
        progress: Option<ProgressCallback>,
    ) -> AppResult<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.as_str());

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
            RequestBody::Form(fields) => builder.multipart(build_form(fields, progress)),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: ApiRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> AppResult<ApiResponse> {
        if cancel.is_cancelled() {
            return Err(AppError::aborted("Request"));
        }

        log::debug!("{} {}", request.method, request.url);
        let url = request.url.clone();

        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Request to {} cancelled in flight", url);
                Err(AppError::aborted("Request"))
            }
            result = self.exchange(request, progress) => result,
        }
    }
}

fn build_form(fields: Vec<(String, String)>, progress: Option<ProgressCallback>) -> multipart::Form {
    let mut form = multipart::Form::new();

    for (name, value) in fields {
        form = form.part(name, streamed_part(value.into_bytes(), progress.clone()));
    }

    form
}

/// Streams `data` in fixed slices, reporting the sent fraction as each slice
/// is handed over.
fn streamed_part(data: Vec<u8>, progress: Option<ProgressCallback>) -> multipart::Part {
    let total = data.len() as u64;
    let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut sent = 0u64;

    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(callback) = &progress {
            callback(sent as f64 / total.max(1) as f64);
        }
        Ok::<Vec<u8>, std::io::Error>(chunk)
    }));

    multipart::Part::stream_with_length(Body::wrap_stream(stream), total)
}
