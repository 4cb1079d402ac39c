use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::server::services::playlist_services::PlaylistService;
use crate::server::services::response_cache_services::ResponseCacheService;
use crate::server::services::upstream_services::UpstreamService;

use super::{DynPlaylistService, DynResponseCacheService, DynUpstreamService};

/// everything a handler needs, injected as one Extension; the raw upstream
/// fetcher is owned by the response cache, handlers always go through it
#[derive(Clone)]
pub struct AppServices {
    pub response_cache: DynResponseCacheService,
    pub playlist: DynPlaylistService,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting proxy services...");

        let upstream = Arc::new(UpstreamService::new(config.clone())?) as DynUpstreamService;

        let response_cache = Arc::new(ResponseCacheService::new(
            upstream,
            Duration::from_secs(config.cache_ttl_secs),
        )) as DynResponseCacheService;

        let playlist = Arc::new(PlaylistService::new(config.clone())?) as DynPlaylistService;

        Ok(Self {
            response_cache,
            playlist,
            config,
        })
    }
}
