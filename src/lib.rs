pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod models;
pub mod nodes;
pub mod proxy;
pub mod publish;
pub mod resolver;
pub mod security;
pub mod transport;
pub mod uploader;

pub use api::ApiClient;
pub use config::ApiConfig;
pub use errors::{AppError, AppResult};
pub use resolver::{MediaResolver, ResolvedMedia, ResolvedUrl};
