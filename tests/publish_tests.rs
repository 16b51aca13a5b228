mod common;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use common::*;
use spoke_publisher::errors::{AppError, AppResult};
use spoke_publisher::events::ClientEvent;
use spoke_publisher::models::{Project, PublishParams, SceneMetadata};
use spoke_publisher::publish::{
    ExportedScene, LoginCredentials, ProgressUpdate, Prompts, PublishDialogRequest, SceneEditor,
};
use spoke_publisher::transport::HttpMethod;
use spoke_publisher::uploader::Blob;

const MEDIA_UPLOADS: &str = "https://api.test/api/v1/media";
const PUBLISH_ENDPOINT: &str = "https://api.test/api/v1/projects/project-1/publish";
const PROJECT_ENDPOINT: &str = "https://api.test/api/v1/projects/project-1";

struct FakeEditor {
    modified: bool,
    glb_size: usize,
    cancel_on_screenshot: Option<CancellationToken>,
    metadata: Mutex<SceneMetadata>,
}

impl FakeEditor {
    fn new() -> Self {
        Self {
            modified: false,
            glb_size: 1024,
            cancel_on_screenshot: None,
            metadata: Mutex::new(SceneMetadata {
                name: Some("Lobby".to_string()),
                ..SceneMetadata::default()
            }),
        }
    }
}

#[async_trait]
impl SceneEditor for FakeEditor {
    fn scene_modified(&self) -> bool {
        self.modified
    }

    fn scene_name(&self) -> String {
        "Untitled".to_string()
    }

    fn scene_metadata(&self) -> SceneMetadata {
        self.metadata.lock().unwrap().clone()
    }

    fn set_scene_metadata(&self, params: &PublishParams) {
        let mut metadata = self.metadata.lock().unwrap();
        metadata.name = Some(params.name.clone());
        metadata.creator_attribution = Some(params.creator_attribution.clone());
        metadata.allow_remixing = Some(params.allow_remixing);
        metadata.allow_promotion = Some(params.allow_promotion);
    }

    fn content_attributions(&self) -> Vec<Value> {
        vec![json!({ "name": "Chair", "author": "Ada" })]
    }

    fn serialize_scene(&self) -> AppResult<Value> {
        Ok(json!({ "version": 4, "entities": {} }))
    }

    async fn take_screenshot(&self, width: u32, height: u32) -> AppResult<Blob> {
        if let Some(cancel) = &self.cancel_on_screenshot {
            cancel.cancel();
        }
        Ok(Blob::named(
            &format!("screenshot-{}x{}.png", width, height),
            "image/png",
            vec![0; 16],
        ))
    }

    async fn export_scene(&self, _cancel: &CancellationToken) -> AppResult<ExportedScene> {
        Ok(ExportedScene {
            glb: Blob::named("scene.glb", "model/gltf-binary", vec![0; self.glb_size]),
            scores: json!({ "polygons": { "score": "Low" } }),
        })
    }
}

#[derive(Default)]
struct FakePrompts {
    decline_login: bool,
    decline_publish: bool,
    logins: AtomicUsize,
    dialogs: AtomicUsize,
    initial_params: Mutex<Option<PublishParams>>,
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Prompts for FakePrompts {
    async fn login(&self) -> Option<LoginCredentials> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.decline_login {
            None
        } else {
            Some(LoginCredentials {
                email: "ada@example.org".to_string(),
                token: "fresh-token".to_string(),
            })
        }
    }

    async fn publish_params(&self, request: PublishDialogRequest) -> Option<PublishParams> {
        self.dialogs.fetch_add(1, Ordering::SeqCst);
        *self.initial_params.lock().unwrap() = Some(request.initial_params.clone());

        if self.decline_publish {
            return None;
        }

        Some(PublishParams {
            creator_attribution: "  Ada  ".to_string(),
            content_attributions: request.content_attributions,
            ..request.initial_params
        })
    }

    async fn performance_check(&self, _scores: &Value) -> bool {
        true
    }

    fn progress(&self, update: ProgressUpdate) {
        self.messages.lock().unwrap().push(update.message);
    }
}

fn project() -> Project {
    serde_json::from_value(json!({ "project_id": "project-1", "name": "Lobby" })).unwrap()
}

fn published_project() -> Value {
    json!({
        "project_id": "project-1",
        "name": "Lobby",
        "scene": { "scene_id": "scene-9", "name": "Lobby" }
    })
}

/// Backend where uploads succeed, saves echo the project and the publish
/// endpoint answers 401 for the first `unauthorized_publishes` calls.
fn backend(unauthorized_publishes: usize) -> Arc<MockTransport> {
    let uploads = Arc::new(AtomicUsize::new(0));
    let publishes = Arc::new(AtomicUsize::new(0));

    MockTransport::new(move |request| {
        if request.url == MEDIA_UPLOADS {
            upload_response(uploads.fetch_add(1, Ordering::SeqCst) + 1)
        } else if request.url == PUBLISH_ENDPOINT {
            if publishes.fetch_add(1, Ordering::SeqCst) < unauthorized_publishes {
                status_response(401, "")
            } else {
                json_response(200, published_project())
            }
        } else if request.url == PROJECT_ENDPOINT {
            json_response(200, json!({ "project_id": "project-1", "name": "Lobby" }))
        } else {
            status_response(404, "")
        }
    })
}

#[tokio::test]
async fn test_publish_uploads_and_commits_scene() {
    let transport = backend(0);
    let client = client(transport.clone());
    let mut events = client.events().subscribe();
    let prompts = Arc::new(FakePrompts::default());

    let published = client
        .publish_project(project(), &FakeEditor::new(), prompts.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(published.scene.unwrap().scene_id, "scene-9");
    assert_eq!(transport.count(HttpMethod::Post, MEDIA_UPLOADS), 3);
    assert_eq!(transport.count(HttpMethod::Patch, PROJECT_ENDPOINT), 0);

    let commit = transport.matching(HttpMethod::Post, PUBLISH_ENDPOINT);
    assert_eq!(commit.len(), 1);
    let scene = &commit[0].json.as_ref().unwrap()["scene"];
    assert_eq!(scene["screenshot_file_id"], "file-1");
    assert_eq!(scene["model_file_id"], "file-2");
    assert_eq!(scene["scene_file_id"], "file-3");
    assert_eq!(scene["name"], "Lobby");
    assert_eq!(scene["attributions"]["creator"], "Ada");
    assert_eq!(scene["attributions"]["content"][0]["name"], "Chair");

    assert_eq!(
        events.recv().await.unwrap(),
        ClientEvent::ProjectPublished {
            scene_id: "scene-9".to_string(),
            scene_url: "https://hubs.test/scenes/scene-9".to_string(),
        }
    );

    let progress: Vec<String> = prompts
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.starts_with("Uploading scene"))
        .cloned()
        .collect();
    assert_eq!(progress, vec!["Uploading scene: 50%", "Uploading scene: 100%"]);
}

#[tokio::test]
async fn test_oversized_scene_fails_before_any_upload() {
    let transport = backend(0);
    let config = spoke_publisher::ApiConfig {
        max_upload_size_mb: 1,
        ..test_config()
    };
    let client = client_with(config, transport.clone(), MemoryCredentials::logged_in("t"));
    let editor = FakeEditor {
        glb_size: 2 * 1024 * 1024,
        ..FakeEditor::new()
    };

    let error = client
        .publish_project(project(), &editor, Arc::new(FakePrompts::default()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::PayloadTooLarge { max_mb: 1, .. }));
    assert_eq!(
        error.to_string(),
        "Scene is too large (2.00MB) to publish. Maximum size is 1MB."
    );
    assert_eq!(transport.count(HttpMethod::Post, MEDIA_UPLOADS), 0);
}

#[tokio::test]
async fn test_cancelling_during_screenshot_stops_before_the_dialog() {
    let transport = backend(0);
    let client = client(transport.clone());
    let cancel = CancellationToken::new();
    let editor = FakeEditor {
        cancel_on_screenshot: Some(cancel.clone()),
        ..FakeEditor::new()
    };
    let prompts = Arc::new(FakePrompts::default());

    let error = client
        .publish_project(project(), &editor, prompts.clone(), &cancel)
        .await
        .unwrap_err();

    assert!(error.is_aborted());
    assert_eq!(error.to_string(), "Publish project aborted");
    assert_eq!(prompts.dialogs.load(Ordering::SeqCst), 0);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_expired_session_reruns_the_whole_publish() {
    let transport = backend(1);
    let client = client(transport.clone());
    let editor = FakeEditor {
        modified: true,
        ..FakeEditor::new()
    };
    let prompts = Arc::new(FakePrompts::default());

    let published = client
        .publish_project(project(), &editor, prompts.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(published.scene.unwrap().scene_id, "scene-9");
    assert_eq!(prompts.logins.load(Ordering::SeqCst), 1);
    assert_eq!(transport.count(HttpMethod::Post, PUBLISH_ENDPOINT), 2);
    assert_eq!(transport.count(HttpMethod::Patch, PROJECT_ENDPOINT), 2);
    // Two save uploads and three publish uploads, per attempt
    assert_eq!(transport.count(HttpMethod::Post, MEDIA_UPLOADS), 10);

    let last_commit = transport.matching(HttpMethod::Post, PUBLISH_ENDPOINT).pop().unwrap();
    assert_eq!(last_commit.authorization.as_deref(), Some("Bearer fresh-token"));
}

#[tokio::test]
async fn test_declined_login_after_expiry_aborts() {
    let transport = backend(usize::MAX);
    let client = client(transport.clone());
    let prompts = Arc::new(FakePrompts {
        decline_login: true,
        ..FakePrompts::default()
    });

    let error = client
        .publish_project(project(), &FakeEditor::new(), prompts.clone(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(error.is_aborted());
    assert_eq!(transport.count(HttpMethod::Post, PUBLISH_ENDPOINT), 1);
}

#[tokio::test]
async fn test_declined_publish_dialog_aborts_without_uploads() {
    let transport = backend(0);
    let client = client(transport.clone());
    let prompts = Arc::new(FakePrompts {
        decline_publish: true,
        ..FakePrompts::default()
    });

    let error = client
        .publish_project(project(), &FakeEditor::new(), prompts, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(error.is_aborted());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_login_is_requested_when_logged_out() {
    let transport = backend(0);
    let client = client_with(test_config(), transport.clone(), MemoryCredentials::logged_out());
    let prompts = Arc::new(FakePrompts::default());

    client
        .publish_project(project(), &FakeEditor::new(), prompts.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(prompts.logins.load(Ordering::SeqCst), 1);
    assert!(client.is_authenticated());
    assert!(transport
        .requests()
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer fresh-token")));
}

#[tokio::test]
async fn test_stored_creator_fills_initial_params() {
    let transport = backend(0);
    let client = client(transport);
    client.set_user_info(&spoke_publisher::credentials::UserInfo {
        creator_attribution: Some("Grace".to_string()),
    });
    let prompts = Arc::new(FakePrompts::default());
    let editor = FakeEditor::new();

    client
        .publish_project(project(), &editor, prompts.clone(), &CancellationToken::new())
        .await
        .unwrap();

    let initial = prompts.initial_params.lock().unwrap().clone().unwrap();
    assert_eq!(initial.name, "Lobby");
    assert_eq!(initial.creator_attribution, "Grace");

    // The chosen attribution is remembered and written back to the scene
    assert_eq!(
        client.user_info().unwrap().creator_attribution.as_deref(),
        Some("  Ada  ")
    );
    assert_eq!(
        editor.scene_metadata().creator_attribution.as_deref(),
        Some("  Ada  ")
    );
}

#[tokio::test]
async fn test_save_project_patches_with_scene_id() {
    let transport = backend(0);
    let client = client(transport.clone());
    let mut events = client.events().subscribe();
    let editor = FakeEditor::new();
    editor.metadata.lock().unwrap().scene_id = Some("scene-9".to_string());

    client
        .save_project("project-1", &editor, &FakePrompts::default(), &CancellationToken::new())
        .await
        .unwrap();

    let patch = transport.matching(HttpMethod::Patch, PROJECT_ENDPOINT);
    let body = &patch[0].json.as_ref().unwrap()["project"];
    assert_eq!(body["name"], "Untitled");
    assert_eq!(body["thumbnail_file_id"], "file-1");
    assert_eq!(body["project_file_id"], "file-2");
    assert_eq!(body["scene_id"], "scene-9");

    assert_eq!(events.recv().await.unwrap(), ClientEvent::ProjectSaving);
    assert_eq!(events.recv().await.unwrap(), ClientEvent::ProjectSaved);
}

#[tokio::test]
async fn test_publish_glb_scene_updates_existing_scene() {
    let transport = MockTransport::new(|request| {
        if request.url == MEDIA_UPLOADS {
            upload_response(1)
        } else {
            json_response(200, json!({ "scenes": [{ "scene_id": "scene-3" }] }))
        }
    });
    let client = client(transport.clone());

    let mut params = serde_json::Map::new();
    params.insert("name".to_string(), json!("Imported"));

    let response = client
        .publish_glb_scene(
            None,
            Some(&Blob::named("a.glb", "model/gltf-binary", vec![0; 4])),
            params,
            Some("scene-3"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response["scenes"][0]["scene_id"], "scene-3");
    let put = transport.matching(HttpMethod::Put, "https://api.test/api/v1/scenes/scene-3");
    let scene = &put[0].json.as_ref().unwrap()["scene"];
    assert_eq!(scene["model_file_id"], "file-1");
    assert_eq!(scene["name"], "Imported");
    assert!(scene.get("screenshot_file_id").is_none());
}
