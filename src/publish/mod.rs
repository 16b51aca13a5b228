pub mod collaborators;
pub mod project;
pub mod scene;
pub mod session;

use crate::api::ApiClient;
use crate::errors::{AppError, AppResult};

pub use collaborators::{
    ExportedScene, LoginCredentials, ProgressUpdate, Prompts, PublishDialogRequest, SceneEditor,
};
pub use session::PublishSession;

impl ApiClient {
    /// Show the login prompt and store what it returns. Backing out of the
    /// prompt aborts the surrounding operation.
    pub async fn prompt_login(&self, prompts: &dyn Prompts) -> AppResult<()> {
        match prompts.login().await {
            Some(credentials) => {
                log::info!("Logged in as {}", credentials.email);
                self.complete_login(&credentials.email, &credentials.token)
            }
            None => Err(AppError::aborted("Login")),
        }
    }

    pub async fn ensure_authenticated(&self, prompts: &dyn Prompts) -> AppResult<()> {
        if self.is_authenticated() {
            return Ok(());
        }

        log::info!("Not authenticated, asking for login");
        self.prompt_login(prompts).await
    }
}
