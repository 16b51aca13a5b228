use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::errors::{AppError, AppResult};
use crate::events::ClientEvent;
use crate::models::{Project, UploadResult};
use crate::publish::collaborators::{
    Prompts, SceneEditor, PROJECT_THUMBNAIL_HEIGHT, PROJECT_THUMBNAIL_WIDTH,
};
use crate::security::InputValidator;
use crate::transport::{ApiRequest, HttpMethod};
use crate::uploader::Blob;

fn check_save(cancel: &CancellationToken) -> AppResult<()> {
    if cancel.is_cancelled() {
        Err(AppError::aborted("Save project"))
    } else {
        Ok(())
    }
}

impl ApiClient {
    /// Upload a fresh thumbnail and scene document and point the project at
    /// them. A 401 from the update asks for login and starts over.
    pub async fn save_project(
        &self,
        project_id: &str,
        editor: &dyn SceneEditor,
        prompts: &dyn Prompts,
        cancel: &CancellationToken,
    ) -> AppResult<Project> {
        InputValidator::validate_project_id(project_id)?;
        self.events.emit(ClientEvent::ProjectSaving);

        loop {
            self.ensure_authenticated(prompts).await?;
            check_save(cancel)?;

            let thumbnail = editor
                .take_screenshot(PROJECT_THUMBNAIL_WIDTH, PROJECT_THUMBNAIL_HEIGHT)
                .await?;
            check_save(cancel)?;

            let mut project = self.upload_project_files(editor, &thumbnail, cancel).await?;

            if let Some(scene_id) = editor.scene_metadata().scene_id {
                project.insert("scene_id".to_string(), Value::String(scene_id));
            }

            let request = ApiRequest::new(
                HttpMethod::Patch,
                self.config
                    .api_url(&format!("/api/v1/projects/{}", project_id)),
            )
            .with_headers(self.headers(true))
            .with_json(json!({ "project": project }));

            let result = self.fetch_json(request, cancel).await;
            check_save(cancel)?;

            match result {
                Ok(json) => {
                    let saved: Project = serde_json::from_value(json)?;
                    log::info!("Saved project {}", saved.project_id);
                    self.events.emit(ClientEvent::ProjectSaved);
                    return Ok(saved);
                }
                Err(e) if e.is_authentication_required() => {
                    log::warn!("Session expired while saving project {}", project_id);
                    self.prompt_login(prompts).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create a project from the editor's scene with an explicit thumbnail,
    /// optionally remixing `parent_scene_id`.
    pub async fn create_project(
        &self,
        editor: &dyn SceneEditor,
        parent_scene_id: Option<&str>,
        thumbnail: &Blob,
        prompts: &dyn Prompts,
        cancel: &CancellationToken,
    ) -> AppResult<Project> {
        self.events.emit(ClientEvent::ProjectSaving);

        loop {
            self.ensure_authenticated(prompts).await?;
            check_save(cancel)?;

            let mut project = self.upload_project_files(editor, thumbnail, cancel).await?;

            if let Some(parent_scene_id) = parent_scene_id {
                project.insert(
                    "parent_scene_id".to_string(),
                    Value::String(parent_scene_id.to_string()),
                );
            }

            let request = ApiRequest::new(HttpMethod::Post, self.config.api_url("/api/v1/projects"))
                .with_headers(self.headers(true))
                .with_json(json!({ "project": project }));

            let result = self.fetch_json(request, cancel).await;
            check_save(cancel)?;

            match result {
                Ok(json) => {
                    let created: Project = serde_json::from_value(json)?;
                    log::info!("Created project {}", created.project_id);
                    self.events.emit(ClientEvent::ProjectSaved);
                    return Ok(created);
                }
                Err(e) if e.is_authentication_required() => {
                    log::warn!("Session expired while creating project");
                    self.prompt_login(prompts).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upload_project_files(
        &self,
        editor: &dyn SceneEditor,
        thumbnail: &Blob,
        cancel: &CancellationToken,
    ) -> AppResult<Map<String, Value>> {
        let UploadResult {
            file_id: thumbnail_file_id,
            access_token: thumbnail_file_token,
        } = self.upload(thumbnail, None, cancel).await?;
        check_save(cancel)?;

        let scene = Blob::json(&editor.serialize_scene()?)?;
        let UploadResult {
            file_id: project_file_id,
            access_token: project_file_token,
        } = self.upload(&scene, None, cancel).await?;
        check_save(cancel)?;

        let mut project = Map::new();
        project.insert("name".to_string(), Value::String(editor.scene_name()));
        project.insert("thumbnail_file_id".to_string(), Value::String(thumbnail_file_id));
        project.insert("thumbnail_file_token".to_string(), Value::String(thumbnail_file_token));
        project.insert("project_file_id".to_string(), Value::String(project_file_id));
        project.insert("project_file_token".to_string(), Value::String(project_file_token));
        project.insert(
            "custom_data".to_string(),
            self.config.custom_data.clone().unwrap_or(Value::Null),
        );

        Ok(project)
    }
}
