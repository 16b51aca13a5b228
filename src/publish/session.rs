use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::models::UploadResult;
use crate::uploader::Blob;

pub const SCREENSHOT_UPLOAD: &str = "screenshot";
pub const GLB_UPLOAD: &str = "glb";
pub const SCENE_UPLOAD: &str = "scene";

/// State of one publish attempt. A restart after re-login starts a fresh
/// session, so nothing uploaded by an earlier attempt is reused.
pub struct PublishSession {
    cancel: CancellationToken,
    pub screenshot: Option<Blob>,
    pub scene: Option<Blob>,
    pub glb: Option<Blob>,
    uploads: HashMap<&'static str, UploadResult>,
}

impl PublishSession {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            screenshot: None,
            scene: None,
            glb: None,
            uploads: HashMap::new(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Step boundary check.
    pub fn check(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            Err(AppError::aborted("Publish project"))
        } else {
            Ok(())
        }
    }

    pub fn record_upload(&mut self, name: &'static str, result: UploadResult) {
        log::debug!("Publish upload '{}' stored as {}", name, result.file_id);
        self.uploads.insert(name, result);
    }

    pub fn upload(&self, name: &str) -> AppResult<&UploadResult> {
        self.uploads
            .get(name)
            .ok_or_else(|| AppError::validation("upload", &format!("Missing {} upload", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_follows_parent_cancellation() {
        let parent = CancellationToken::new();
        let session = PublishSession::new(&parent);
        assert!(session.check().is_ok());

        parent.cancel();
        let error = session.check().unwrap_err();
        assert!(error.is_aborted());
        assert_eq!(error.to_string(), "Publish project aborted");
    }

    #[test]
    fn test_uploads_are_recorded_by_name() {
        let mut session = PublishSession::new(&CancellationToken::new());
        assert!(session.upload(GLB_UPLOAD).is_err());

        session.record_upload(
            GLB_UPLOAD,
            UploadResult {
                file_id: "f1".to_string(),
                access_token: "t1".to_string(),
            },
        );
        assert_eq!(session.upload(GLB_UPLOAD).unwrap().file_id, "f1");
    }
}
