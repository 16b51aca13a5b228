use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{self, ApiConfig};
use crate::errors::{AppError, AppResult};
use crate::security::{FileSystemGuard, InputValidator};
use crate::transport::{send_tagged, ApiRequest, HttpTransport};

/// Entry the editor loads from an unpacked Sketchfab archive.
pub const ARCHIVE_ENTRY_POINT: &str = "scene.gltf";

/// Unpacks zip-packaged models. Returns archive entry names mapped to URLs
/// the loader can read; one of them is `ARCHIVE_ENTRY_POINT`.
#[async_trait]
pub trait ArchiveUnpacker: Send + Sync {
    async fn unpack(&self, accessible_url: &str) -> AppResult<HashMap<String, String>>;
}

/// Downloads the archive and extracts it under a fresh directory, exposing
/// each entry as a `file://` URL. The total extracted size is capped.
pub struct ZipArchiveUnpacker {
    transport: Arc<dyn HttpTransport>,
    root: PathBuf,
    max_extracted_bytes: u64,
}

impl ZipArchiveUnpacker {
    pub fn new(transport: Arc<dyn HttpTransport>, root: PathBuf) -> Self {
        Self {
            transport,
            root,
            max_extracted_bytes: ApiConfig::default().max_upload_size_bytes(),
        }
    }

    pub fn in_temp_dir(transport: Arc<dyn HttpTransport>, config: &ApiConfig) -> AppResult<Self> {
        Ok(Self::new(transport, config::get_temp_directory()?.join("archives"))
            .with_limit(config.max_upload_size_bytes()))
    }

    pub fn with_limit(mut self, max_extracted_bytes: u64) -> Self {
        self.max_extracted_bytes = max_extracted_bytes;
        self
    }

    /// Remove every archive extracted so far.
    pub fn cleanup(&self) -> AppResult<()> {
        FileSystemGuard::cleanup_extraction_root(&self.root)
    }
}

#[async_trait]
impl ArchiveUnpacker for ZipArchiveUnpacker {
    async fn unpack(&self, accessible_url: &str) -> AppResult<HashMap<String, String>> {
        let response = send_tagged(
            self.transport.as_ref(),
            ApiRequest::get(accessible_url),
            None,
            &CancellationToken::new(),
        )
        .await?;

        if !response.is_success() {
            return Err(AppError::transport(
                accessible_url,
                Some(response.status),
                format!("Archive download failed with status {}", response.status),
            ));
        }

        let target = FileSystemGuard::create_extraction_dir(&self.root)?;
        let body = response.body;
        let limit = self.max_extracted_bytes;

        let files = tokio::task::spawn_blocking(move || extract_archive(body, target, limit))
            .await
            .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        if !files.contains_key(ARCHIVE_ENTRY_POINT) {
            return Err(AppError::validation(
                "archive",
                &format!("Archive has no {} entry", ARCHIVE_ENTRY_POINT),
            ));
        }

        log::info!("Unpacked {} files from {}", files.len(), accessible_url);
        Ok(files)
    }
}

fn extract_archive(body: Vec<u8>, target: PathBuf, limit: u64) -> AppResult<HashMap<String, String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body))?;
    let mut files = HashMap::new();
    let mut remaining = limit;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let relative = InputValidator::safe_entry_path(&name)?;
        let destination = target.join(&relative);

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Declared sizes come from the archive and are not trusted.
        let mut contents = Vec::new();
        (&mut entry)
            .take(remaining.saturating_add(1))
            .read_to_end(&mut contents)?;
        let written = contents.len() as u64;
        if written > remaining {
            return Err(AppError::validation(
                "archive",
                &format!("Archive expands beyond the {} byte limit", limit),
            ));
        }
        remaining -= written;

        std::fs::write(&destination, contents)?;

        let url = Url::from_file_path(&destination).map_err(|_| {
            AppError::validation("entry", &format!("Cannot address {}", destination.display()))
        })?;

        log::debug!("Extracted {} -> {}", name, destination.display());
        files.insert(name, url.to_string());
    }

    Ok(files)
}
