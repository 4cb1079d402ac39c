use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::server::error::AppResult;
use crate::server::services::upstream_services::{
    DynUpstreamService, UpstreamResponse, UpstreamServiceTrait,
};

pub type DynResponseCacheService = Arc<dyn ResponseCacheServiceTrait + Send + Sync>;

/// how long a waiter sits on an in-flight fetch before trying on its own
const INFLIGHT_WAIT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ResponseCacheServiceTrait {
    /// return the cached response for `(url, user_agent)` while it is younger
    /// than the TTL, otherwise fetch, store, and return it. Concurrent misses
    /// for one key collapse into a single upstream request.
    async fn get_or_fetch(&self, url: &str, user_agent: &str)
    -> AppResult<Arc<UpstreamResponse>>;

    /// drop every entry, returns how many were held
    async fn clear(&self) -> usize;
}

pub struct ResponseCacheService {
    upstream: DynUpstreamService,
    ttl: Duration,
    // staleness is only checked on read, stale entries sit around until
    // overwritten or cleared
    entries: Mutex<HashMap<String, (Instant, Arc<UpstreamResponse>)>>,
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ResponseCacheService {
    pub fn new(upstream: DynUpstreamService, ttl: Duration) -> Self {
        Self {
            upstream,
            ttl,
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(url: &str, user_agent: &str) -> String {
        format!("{}:{}", url, user_agent)
    }

    fn lookup_fresh(&self, key: &str) -> Option<Arc<UpstreamResponse>> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.get(key).and_then(|(inserted, response)| {
            (inserted.elapsed() < self.ttl).then(|| response.clone())
        })
    }

    /// either become the fetcher for this key or get the notifier to wait on
    fn claim_or_join(&self, key: &str) -> Option<Arc<Notify>> {
        let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
        match inflight.get(key) {
            Some(notify) => Some(notify.clone()),
            None => {
                inflight.insert(key.to_string(), Arc::new(Notify::new()));
                None
            }
        }
    }

    fn release(&self, key: &str) {
        let notify = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            inflight.remove(key)
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }

    fn store(&self, key: &str, response: UpstreamResponse) -> Arc<UpstreamResponse> {
        let entry = Arc::new(response);
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.to_string(), (Instant::now(), entry.clone()));
        entry
    }
}

/// releases the claimed key when the fetch ends, however it ends; the handler
/// future is dropped when the player aborts the request, and that must not
/// leave the key claimed forever
struct InflightGuard<'a> {
    cache: &'a ResponseCacheService,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.cache.release(self.key);
    }
}

#[async_trait]
impl ResponseCacheServiceTrait for ResponseCacheService {
    async fn get_or_fetch(
        &self,
        url: &str,
        user_agent: &str,
    ) -> AppResult<Arc<UpstreamResponse>> {
        let key = Self::cache_key(url, user_agent);

        if let Some(cached) = self.lookup_fresh(&key) {
            debug!("response cache HIT for {}", url);
            return Ok(cached);
        }

        // someone else is fetching this key, wait for them and re-check
        while let Some(notify) = self.claim_or_join(&key) {
            debug!("joining in-flight fetch for {}", url);
            if tokio::time::timeout(INFLIGHT_WAIT, notify.notified())
                .await
                .is_err()
            {
                // the fetcher is stuck or gone, stop waiting and go direct
                warn!("timed out waiting on in-flight fetch for {}, fetching directly", url);
                let response = self.upstream.fetch(url, user_agent).await?;
                return Ok(self.store(&key, response));
            }

            if let Some(cached) = self.lookup_fresh(&key) {
                debug!("response cache HIT for {}", url);
                return Ok(cached);
            }
            // the fetcher failed, take a turn at claiming the key
        }

        // the guard releases the key even if this future is dropped mid-fetch
        let _guard = InflightGuard {
            cache: self,
            key: &key,
        };

        debug!("response cache MISS for {}", url);
        // failures propagate uncached so the next request retries upstream
        let response = self.upstream.fetch(url, user_agent).await?;
        Ok(self.store(&key, response))
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let count = entries.len();
        entries.clear();
        info!("response cache cleared ({} entries)", count);
        count
    }
}
