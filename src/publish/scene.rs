use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::credentials::UserInfo;
use crate::errors::{AppError, AppResult};
use crate::events::ClientEvent;
use crate::models::{Project, PublishParams};
use crate::publish::collaborators::{
    ProgressUpdate, Prompts, PublishDialogRequest, SceneEditor, SCENE_SCREENSHOT_HEIGHT,
    SCENE_SCREENSHOT_WIDTH,
};
use crate::publish::session::{PublishSession, GLB_UPLOAD, SCENE_UPLOAD, SCREENSHOT_UPLOAD};
use crate::transport::{ApiRequest, HttpMethod, ProgressCallback};
use crate::uploader::progress_tracker::{monotonic, percent};
use crate::uploader::Blob;

const PUBLISHING: &str = "Publishing Scene";

enum Attempt {
    Published(Project),
    LoginRequired,
}

impl ApiClient {
    /// Save (if needed), export, upload and publish the project's scene.
    ///
    /// Runs strictly in sequence and checks `cancel` at every step boundary.
    /// If the final publish call comes back 401 the user is asked to log in
    /// and the whole workflow runs again, uploads included.
    pub async fn publish_project(
        &self,
        project: Project,
        editor: &dyn SceneEditor,
        prompts: Arc<dyn Prompts>,
        cancel: &CancellationToken,
    ) -> AppResult<Project> {
        let mut project = project;

        loop {
            match self
                .publish_attempt(&mut project, editor, &prompts, cancel)
                .await?
            {
                Attempt::Published(published) => return Ok(published),
                Attempt::LoginRequired => {
                    log::warn!(
                        "Session expired while publishing project {}, restarting after login",
                        project.project_id
                    );
                    self.prompt_login(prompts.as_ref()).await?;
                }
            }
        }
    }

    async fn publish_attempt(
        &self,
        project: &mut Project,
        editor: &dyn SceneEditor,
        prompts: &Arc<dyn Prompts>,
        cancel: &CancellationToken,
    ) -> AppResult<Attempt> {
        let mut session = PublishSession::new(cancel);

        // 1. Save
        if editor.scene_modified() {
            prompts.progress(ProgressUpdate::new("Saving Project", "Saving project...", true));
            let project_id = project.project_id.clone();
            *project = self
                .save_project(&project_id, editor, &**prompts, session.cancel_token())
                .await
                .map_err(|e| {
                    if e.is_aborted() {
                        AppError::aborted("Publish project")
                    } else {
                        e
                    }
                })?;
            session.check()?;
        }

        // 2. Authenticate
        self.ensure_authenticated(&**prompts).await?;
        session.check()?;

        // 3. Screenshot
        prompts.progress(ProgressUpdate::new(
            "Generating Project Screenshot",
            "Generating project screenshot...",
            false,
        ));
        let screenshot = editor
            .take_screenshot(SCENE_SCREENSHOT_WIDTH, SCENE_SCREENSHOT_HEIGHT)
            .await?;
        session.screenshot = Some(screenshot.clone());
        session.check()?;

        // 4. Publish parameters
        let request = PublishDialogRequest {
            screenshot,
            content_attributions: editor.content_attributions(),
            initial_params: self.initial_publish_params(project, editor),
        };
        let params = match prompts.publish_params(request).await {
            Some(params) => params,
            None => return Err(AppError::aborted("Publish project")),
        };

        editor.set_scene_metadata(&params);
        self.set_user_info(&UserInfo {
            creator_attribution: Some(params.creator_attribution.clone()),
        });
        session.check()?;

        // 5. Export, performance check, size gate
        prompts.progress(ProgressUpdate::new(PUBLISHING, "Exporting scene...", true));
        let exported = editor.export_scene(session.cancel_token()).await?;
        session.check()?;

        if !prompts.performance_check(&exported.scores).await {
            return Err(AppError::aborted("Publish project"));
        }

        session.scene = Some(Blob::json(&editor.serialize_scene()?)?);

        let size_mb = exported.glb.size_mb();
        let max_mb = self.config.max_upload_size_mb;
        if size_mb > max_mb as f64 {
            return Err(AppError::PayloadTooLarge { size_mb, max_mb });
        }
        session.glb = Some(exported.glb);

        // 6. Uploads
        self.upload_publish_files(&mut session, prompts).await?;

        // 7. Commit
        let screenshot = session.upload(SCREENSHOT_UPLOAD)?;
        let glb = session.upload(GLB_UPLOAD)?;
        let scene = session.upload(SCENE_UPLOAD)?;

        let body = json!({
            "scene": {
                "screenshot_file_id": screenshot.file_id,
                "screenshot_file_token": screenshot.access_token,
                "model_file_id": glb.file_id,
                "model_file_token": glb.access_token,
                "scene_file_id": scene.file_id,
                "scene_file_token": scene.access_token,
                "allow_remixing": params.allow_remixing,
                "allow_promotion": params.allow_promotion,
                "name": params.name,
                "attributions": {
                    "creator": params.creator_attribution.trim(),
                    "content": params.content_attributions,
                }
            }
        });

        let request = ApiRequest::new(
            HttpMethod::Post,
            self.config
                .api_url(&format!("/api/v1/projects/{}/publish", project.project_id)),
        )
        .with_headers(self.headers(true))
        .with_json(body);

        let result = self.fetch_json(request, session.cancel_token()).await;
        session.check()?;

        let json = match result {
            Ok(json) => json,
            Err(e) if e.is_authentication_required() => return Ok(Attempt::LoginRequired),
            Err(e) => return Err(e),
        };

        let published: Project = serde_json::from_value(json)?;

        match &published.scene {
            Some(scene) => {
                let scene_url = self.scene_url(&scene.scene_id);
                log::info!("Published scene {} at {}", scene.scene_id, scene_url);
                self.events.emit(ClientEvent::ProjectPublished {
                    scene_id: scene.scene_id.clone(),
                    scene_url,
                });
            }
            None => log::warn!(
                "Publish response for project {} has no scene",
                published.project_id
            ),
        }

        Ok(Attempt::Published(published))
    }

    /// Initial dialog values: the published scene wins over scene metadata,
    /// and stored user info fills in a missing creator attribution.
    fn initial_publish_params(&self, project: &Project, editor: &dyn SceneEditor) -> PublishParams {
        let metadata = editor.scene_metadata();

        let name = project
            .scene
            .as_ref()
            .and_then(|scene| scene.name.clone())
            .filter(|name| !name.is_empty())
            .or(metadata.name.filter(|name| !name.is_empty()))
            .unwrap_or_else(|| editor.scene_name());

        match &project.scene {
            Some(scene) => PublishParams {
                name,
                creator_attribution: scene.attributions.creator.clone().unwrap_or_default(),
                allow_remixing: scene.allow_remixing,
                allow_promotion: scene.allow_promotion,
                content_attributions: Vec::new(),
            },
            None => {
                let creator_attribution = metadata
                    .creator_attribution
                    .filter(|creator| !creator.is_empty())
                    .or_else(|| self.user_info().and_then(|info| info.creator_attribution))
                    .unwrap_or_default();

                PublishParams {
                    name,
                    creator_attribution,
                    allow_remixing: metadata.allow_remixing.unwrap_or(false),
                    allow_promotion: metadata.allow_promotion.unwrap_or(false),
                    content_attributions: Vec::new(),
                }
            }
        }
    }

    async fn upload_publish_files(
        &self,
        session: &mut PublishSession,
        prompts: &Arc<dyn Prompts>,
    ) -> AppResult<()> {
        let cancel = session.cancel_token().clone();

        prompts.progress(ProgressUpdate::new(PUBLISHING, "Uploading thumbnail...", true));
        let screenshot = session
            .screenshot
            .take()
            .ok_or_else(|| AppError::validation("screenshot", "No screenshot captured"))?;
        let uploaded = self.upload(&screenshot, None, &cancel).await?;
        session.record_upload(SCREENSHOT_UPLOAD, uploaded);
        session.check()?;

        let glb = session
            .glb
            .take()
            .ok_or_else(|| AppError::validation("glb", "No exported scene"))?;
        let reporter = prompts.clone();
        let progress: ProgressCallback = monotonic(Arc::new(move |fraction: f64| {
            reporter.progress(ProgressUpdate::new(
                PUBLISHING,
                format!("Uploading scene: {}%", percent(fraction)),
                true,
            ));
        }));
        let uploaded = self.upload(&glb, Some(progress), &cancel).await?;
        session.record_upload(GLB_UPLOAD, uploaded);
        session.check()?;

        let scene = session
            .scene
            .take()
            .ok_or_else(|| AppError::validation("scene", "No serialized scene"))?;
        let uploaded = self.upload(&scene, None, &cancel).await?;
        session.record_upload(SCENE_UPLOAD, uploaded);
        session.check()
    }

    /// Upload an optional screenshot and glb and create (or, with
    /// `scene_id`, update) a scene outside of any project. `params` are
    /// merged over the file references.
    pub async fn publish_glb_scene(
        &self,
        screenshot: Option<&Blob>,
        glb: Option<&Blob>,
        params: Map<String, Value>,
        scene_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<Value> {
        let mut scene = Map::new();

        if let Some(screenshot) = screenshot {
            let uploaded = self.upload(screenshot, None, cancel).await?;
            scene.insert("screenshot_file_id".to_string(), Value::String(uploaded.file_id));
            scene.insert("screenshot_file_token".to_string(), Value::String(uploaded.access_token));
        }

        if let Some(glb) = glb {
            let uploaded = self.upload(glb, None, cancel).await?;
            scene.insert("model_file_id".to_string(), Value::String(uploaded.file_id));
            scene.insert("model_file_token".to_string(), Value::String(uploaded.access_token));
        }

        scene.extend(params);

        let (method, path) = match scene_id {
            Some(scene_id) => (HttpMethod::Put, format!("/api/v1/scenes/{}", scene_id)),
            None => (HttpMethod::Post, "/api/v1/scenes".to_string()),
        };

        let request = ApiRequest::new(method, self.config.api_url(&path))
            .with_headers(self.headers(true))
            .with_json(json!({ "scene": scene }));

        self.fetch_json(request, cancel).await
    }
}
