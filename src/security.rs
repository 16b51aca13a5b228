use regex::Regex;
use std::path::{Component, Path, PathBuf};

use crate::errors::{AppError, AppResult};

pub struct InputValidator;

impl InputValidator {
    pub fn validate_media_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("url", "Media URL cannot be empty"));
        }

        if trimmed.len() > 2048 {
            return Err(AppError::validation("url", "Media URL too long"));
        }

        Ok(())
    }

    pub fn validate_project_id(project_id: &str) -> AppResult<()> {
        let safe_id = Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").unwrap();
        if !safe_id.is_match(project_id) {
            return Err(AppError::validation(
                "project_id",
                "Project id contains invalid characters",
            ));
        }

        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let unsafe_chars = Regex::new(r#"[<>:"\\|?*\x00-\x1f]"#).unwrap();
        let sanitized = unsafe_chars.replace_all(filename.trim(), "_");

        if sanitized.len() > 255 {
            let mut end = 252;
            while !sanitized.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &sanitized[..end])
        } else {
            sanitized.to_string()
        }
    }

    /// Archive entry names become relative paths; traversal and absolute
    /// entries are rejected.
    pub fn safe_entry_path(entry_name: &str) -> AppResult<PathBuf> {
        let sanitized = Self::sanitize_filename(entry_name);
        let path = Path::new(&sanitized);

        let mut safe = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => safe.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(AppError::validation(
                        "entry",
                        &format!("Unsafe archive entry: {}", entry_name),
                    ))
                }
            }
        }

        if safe.as_os_str().is_empty() {
            return Err(AppError::validation("entry", "Empty archive entry name"));
        }

        Ok(safe)
    }
}

pub struct FileSystemGuard;

impl FileSystemGuard {
    /// Fresh directory under the temp dir for one extracted archive.
    pub fn create_extraction_dir(root: &Path) -> AppResult<PathBuf> {
        let dir = root.join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn cleanup_extraction_root(root: &Path) -> AppResult<()> {
        if root.exists() {
            std::fs::remove_dir_all(root)?;
        }
        Ok(())
    }
}
