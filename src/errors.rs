use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// User or caller initiated cancellation. Never logged as an error.
    #[error("{operation} aborted")]
    Aborted { operation: String },

    #[error("Error resolving url \"{url}\":\n  {detail}")]
    ResolutionFailed { url: String, detail: String },

    #[error("Error resolving media \"{url}\"")]
    MediaResolution {
        url: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Error loading archive \"{url}\"")]
    Unpack {
        url: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Not authenticated: {url}")]
    AuthenticationRequired { url: String },

    #[error("Scene is too large ({size_mb:.2}MB) to publish. Maximum size is {max_mb}MB.")]
    PayloadTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Failed to fetch \"{url}\": {detail}")]
    Transport {
        url: String,
        status: Option<u16>,
        detail: String,
        #[source]
        source: Option<Box<AppError>>,
    },

    #[error("{context}: {message}")]
    UnexpectedResponse { context: String, message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Error loading image {url}")]
    ImageLoad {
        url: String,
        #[source]
        source: Box<AppError>,
    },

    /// Failure shared between every caller of a deduplicated request.
    #[error(transparent)]
    Cached(Arc<AppError>),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn aborted(operation: &str) -> Self {
        Self::Aborted {
            operation: operation.to_string(),
        }
    }

    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn authentication_required(url: &str) -> Self {
        Self::AuthenticationRequired {
            url: url.to_string(),
        }
    }

    pub fn unexpected(context: &str, message: &str) -> Self {
        Self::UnexpectedResponse {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    pub fn transport(url: &str, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            status,
            detail: detail.into(),
            source: None,
        }
    }

    pub fn media_resolution(url: &str, source: AppError) -> Self {
        Self::MediaResolution {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    pub fn unpack(url: &str, source: AppError) -> Self {
        Self::Unpack {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    /// True for cancellations anywhere in the chain, so callers can skip
    /// error UI for user-initiated aborts.
    pub fn is_aborted(&self) -> bool {
        match self {
            AppError::Aborted { .. } => true,
            AppError::Cached(inner) => inner.is_aborted(),
            AppError::MediaResolution { source, .. }
            | AppError::Unpack { source, .. }
            | AppError::ImageLoad { source, .. } => source.is_aborted(),
            AppError::Transport {
                source: Some(source),
                ..
            } => source.is_aborted(),
            _ => false,
        }
    }

    pub fn is_authentication_required(&self) -> bool {
        match self {
            AppError::AuthenticationRequired { .. } => true,
            AppError::Cached(inner) => inner.is_authentication_required(),
            _ => false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::PayloadTooLarge { .. }
                | AppError::Validation { .. }
                | AppError::Config(_)
                | AppError::Url(_)
        )
    }
}

/// Render an error and all of its causes, outermost first.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();

    while let Some(cause) = current {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }

    rendered
}
