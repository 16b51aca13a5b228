pub mod asset_queue;
pub mod media_upload;
pub mod progress_tracker;
pub mod rate_limiter;
pub mod thumbnail;

pub use asset_queue::asset_entries;
pub use media_upload::{blob_to_data_url, Blob};
pub use progress_tracker::BatchProgressCallback;
pub use rate_limiter::RateLimiter;
pub use thumbnail::{ImageThumbnailer, ThumbnailGenerator};
