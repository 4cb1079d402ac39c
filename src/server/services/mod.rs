pub mod app_services;
pub mod playlist_services;
pub mod response_cache_services;
pub mod upstream_services;

pub use app_services::AppServices;
pub use playlist_services::DynPlaylistService;
pub use response_cache_services::DynResponseCacheService;
pub use upstream_services::DynUpstreamService;
