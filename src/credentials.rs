use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub creator_attribution: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCredentials {
    access_token: Option<String>,
    access_key: Option<String>,
    email: Option<String>,
    saved_at: Option<DateTime<Utc>>,
    user_info: Option<UserInfo>,
}

/// Persisted login state. Read-only for the client apart from saving
/// credentials after a login and clearing them on logout.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> AppResult<Option<String>>;
    fn access_key(&self) -> AppResult<Option<String>>;
    fn email(&self) -> AppResult<Option<String>>;
    fn save_credentials(&self, email: &str, token: &str) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
    fn user_info(&self) -> AppResult<Option<UserInfo>>;
    fn set_user_info(&self, info: &UserInfo) -> AppResult<()>;
}

pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn open_default() -> AppResult<Self> {
        Ok(Self::at(config::get_data_directory()?.join("credentials.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> AppResult<PersistedCredentials> {
        if !self.path.exists() {
            return Ok(PersistedCredentials::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Credentials(format!(
                "Credential store {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn update<F>(&self, f: F) -> AppResult<()>
    where
        F: FnOnce(&mut PersistedCredentials),
    {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Credential store lock poisoned (non-critical), recovering");
                poisoned.into_inner()
            }
        };

        let mut stored = self.read()?;
        f(&mut stored);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> AppResult<Option<String>> {
        Ok(self.read()?.access_token)
    }

    fn access_key(&self) -> AppResult<Option<String>> {
        Ok(self.read()?.access_key)
    }

    fn email(&self) -> AppResult<Option<String>> {
        Ok(self.read()?.email)
    }

    fn save_credentials(&self, email: &str, token: &str) -> AppResult<()> {
        self.update(|stored| {
            stored.email = Some(email.to_string());
            stored.access_token = Some(token.to_string());
            stored.saved_at = Some(Utc::now());
        })?;
        log::info!("Saved credentials for {}", email);
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        self.update(|stored| {
            stored.access_token = None;
            stored.access_key = None;
            stored.email = None;
            stored.saved_at = None;
        })
    }

    fn user_info(&self) -> AppResult<Option<UserInfo>> {
        Ok(self.read()?.user_info)
    }

    fn set_user_info(&self, info: &UserInfo) -> AppResult<()> {
        self.update(|stored| stored.user_info = Some(info.clone()))
    }
}

/// Account id (`sub` claim) of a JWT access token. The signature is not
/// checked; the server does that on every request.
pub fn decode_account_id(token: &str) -> AppResult<String> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::Credentials("Access token is not a JWT".to_string()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AppError::Credentials(format!("Invalid token payload: {}", e)))?;

    let claims: serde_json::Value = serde_json::from_slice(&decoded)?;

    match claims.get("sub") {
        Some(serde_json::Value::String(sub)) => Ok(sub.clone()),
        Some(serde_json::Value::Number(sub)) => Ok(sub.to_string()),
        _ => Err(AppError::Credentials(
            "Access token has no subject".to_string(),
        )),
    }
}
