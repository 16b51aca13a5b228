use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{AppError, AppResult};

pub type SharedRequest<V> = Shared<BoxFuture<'static, Result<V, Arc<AppError>>>>;

/// Process-lifetime cache of in-flight and finished requests. The entry is
/// the shared future itself, so every caller for a key awaits one request
/// and sees the same outcome, success or failure. Entries are never evicted;
/// `invalidate` and `clear` drop them explicitly.
pub struct RequestCache<V: Clone> {
    name: &'static str,
    entries: Mutex<HashMap<String, SharedRequest<V>>>,
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedRequest<V>>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => {
                log::warn!("{} cache lock poisoned (non-critical), recovering", self.name);
                poisoned.into_inner()
            }
        }
    }

    /// Return the pending or finished request for `key`, starting one with
    /// `start` only when none exists. Lookup and insert happen under a single
    /// lock acquisition.
    pub fn get_or_start<F, Fut>(&self, key: &str, start: F) -> SharedRequest<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<V>> + Send + 'static,
    {
        let mut entries = self.lock();

        if let Some(existing) = entries.get(key) {
            log::debug!("{} cache hit for {}", self.name, key);
            return existing.clone();
        }

        log::debug!("{} cache miss for {}", self.name, key);
        let request = start().map_err(Arc::new).boxed().shared();
        entries.insert(key.to_string(), request.clone());
        request
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Await a cached request, turning a shared failure back into an `AppError`.
pub async fn join<V: Clone>(request: SharedRequest<V>) -> AppResult<V> {
    request.await.map_err(AppError::Cached)
}
