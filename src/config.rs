use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

const APP_DIR_NAME: &str = "Spoke Publisher";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Main API server (projects, scenes, assets, media uploads)
    pub reticulum_server: String,
    /// Media search and Sketchfab resolution backend
    pub media_server: String,
    pub cors_proxy_server: Option<String>,
    pub thumbnail_server: String,
    pub hubs_server: String,
    /// Hosts that can be fetched directly without the CORS proxy
    pub non_cors_proxy_domains: Vec<String>,
    /// Origin the editor itself is served from
    pub server_url: String,
    pub max_upload_size_mb: u64,
    pub asset_request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub project_id: Option<String>,
    pub custom_data: Option<serde_json::Value>,
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            reticulum_server: "https://hubs.local:4000".to_string(),
            media_server: "https://hubs.local:4000".to_string(),
            cors_proxy_server: Some("https://hubs-proxy.local:4000".to_string()),
            thumbnail_server: "https://nearspark-dev.reticulum.io".to_string(),
            hubs_server: "hubs.local:8080".to_string(),
            non_cors_proxy_domains: vec!["hubs.local".to_string()],
            server_url: "https://hubs.local:9090".to_string(),
            max_upload_size_mb: 128,
            asset_request_interval_ms: 1100,
            request_timeout_secs: 120,
            project_id: None,
            custom_data: None,
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.reticulum_server.trim_end_matches('/'), path)
    }

    pub fn media_url(&self, path: &str) -> String {
        format!("{}{}", self.media_server.trim_end_matches('/'), path)
    }

    pub fn cors_proxy_prefix(&self) -> Option<&str> {
        self.cors_proxy_server
            .as_deref()
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
    }

    /// Non-proxy domains, always including the CORS proxy's own host.
    pub fn direct_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .non_cors_proxy_domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        if let Some(host) = self
            .cors_proxy_prefix()
            .and_then(|p| url::Url::parse(p).ok())
            .and_then(|u| u.host_str().map(str::to_string))
        {
            domains.push(host);
        }

        domains
    }

    /// Configured project id, or the last segment of the editor page path.
    pub fn project_id_for(&self, page_path: &str) -> Option<String> {
        if let Some(id) = self.project_id.as_ref().filter(|id| !id.is_empty()) {
            return Some(id.clone());
        }

        page_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

pub fn get_data_directory() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Could not find data directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn get_temp_directory() -> AppResult<PathBuf> {
    let temp_dir = std::env::temp_dir().join("spoke_publisher");
    fs::create_dir_all(&temp_dir)?;
    Ok(temp_dir)
}

pub fn load_config() -> AppResult<ApiConfig> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> AppResult<ApiConfig> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: ApiConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            ApiConfig::default()
        });

        validate_config(&config)?;

        Ok(config)
    } else {
        let default_config = ApiConfig::default();
        save_config_to(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &ApiConfig) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &ApiConfig) -> AppResult<()> {
    validate_config(config)?;

    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

fn validate_server(field: &str, value: &str) -> AppResult<()> {
    let parsed = url::Url::parse(value)
        .map_err(|_| AppError::validation(field, "Must be an absolute URL"))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::validation(field, "Must use http or https"));
    }

    Ok(())
}

pub fn validate_config(config: &ApiConfig) -> AppResult<()> {
    validate_server("reticulum_server", &config.reticulum_server)?;
    validate_server("media_server", &config.media_server)?;
    validate_server("thumbnail_server", &config.thumbnail_server)?;
    validate_server("server_url", &config.server_url)?;

    if let Some(proxy) = config.cors_proxy_prefix() {
        validate_server("cors_proxy_server", proxy)?;
    }

    if config.hubs_server.trim().is_empty() {
        return Err(AppError::validation("hubs_server", "Cannot be empty"));
    }

    if config.max_upload_size_mb == 0 {
        return Err(AppError::validation(
            "max_upload_size_mb",
            "Must be greater than 0",
        ));
    }

    if config.asset_request_interval_ms < 100 {
        return Err(AppError::validation(
            "asset_request_interval_ms",
            "Must be at least 100ms",
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation(
            "request_timeout_secs",
            "Must be greater than 0",
        ));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}
