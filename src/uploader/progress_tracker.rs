use std::sync::{Arc, Mutex};

use crate::transport::ProgressCallback;

/// Receives `(item_number, total_items, current_item_fraction)` during a
/// batch upload.
pub type BatchProgressCallback = Arc<dyn Fn(usize, usize, f64) + Send + Sync>;

/// Wrap `callback` so it only ever sees values in 0.0..=1.0 that never go
/// backwards. Transports may report out of order or overshoot on retries.
pub fn monotonic(callback: ProgressCallback) -> ProgressCallback {
    let last = Mutex::new(0.0f64);

    Arc::new(move |progress: f64| {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            return;
        };

        let forward = match last.lock() {
            Ok(mut last) => {
                if progress >= *last {
                    *last = progress;
                    Some(progress)
                } else {
                    None
                }
            }
            Err(e) => {
                log::warn!("Failed to acquire progress lock (non-critical): {}", e);
                None
            }
        };

        if let Some(progress) = forward {
            callback(progress);
        }
    })
}

/// Per-item callback for one file of a batch.
pub fn batch_item(
    callback: BatchProgressCallback,
    item_number: usize,
    total: usize,
) -> ProgressCallback {
    Arc::new(move |progress: f64| callback(item_number, total, progress))
}

/// Human-readable percentage used in progress messages.
pub fn percent(progress: f64) -> u32 {
    (progress.clamp(0.0, 1.0) * 100.0).floor() as u32
}
