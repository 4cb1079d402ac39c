use axum::{
    Extension, Json, Router,
    extract::Path,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::server::{
    error::{AppResult, Error},
    extractors::{ClientInfo, is_private_caller},
    services::AppServices,
    services::playlist_services::{ChannelDirectory, PlaylistServiceTrait, parse_channels},
};

pub struct ChannelsController;

impl ChannelsController {
    pub fn app() -> Router {
        Router::new()
            .route("/api/channels", get(Self::api_channels))
            .route("/api/stream/{channel_id}", get(Self::api_stream))
            .route("/channels", get(Self::local_channels))
            .route("/refresh-playlist", get(Self::refresh_playlist))
    }

    async fn api_channels(
        Extension(services): Extension<AppServices>,
    ) -> AppResult<Json<ChannelDirectory>> {
        let directory = services.playlist.channel_directory().await.inspect_err(|e| {
            error!("channel directory unavailable: {}", e);
        })?;

        Ok(Json(directory))
    }

    /// resolve a channel by its playlist position and bounce the player to the
    /// proxy, everything after this redirect flows through /proxy
    async fn api_stream(
        Path(channel_id): Path<usize>,
        Extension(services): Extension<AppServices>,
    ) -> AppResult<Response> {
        let channel = services.playlist.channel_by_id(channel_id).await?;

        info!("redirecting channel {} ({}) to proxy", channel_id, channel.name);

        let location = format!("/proxy?url={}", urlencoding::encode(&channel.url));
        let mut response = StatusCode::FOUND.into_response();
        response.headers_mut().insert(
            header::LOCATION,
            HeaderValue::from_str(&location)
                .map_err(|e| Error::UpstreamUnexpected(e.to_string()))?,
        );

        Ok(response)
    }

    /// legacy directory read from a local .m3u file, same shape as
    /// /api/channels minus last_update; a missing file is an empty directory
    async fn local_channels(
        Extension(services): Extension<AppServices>,
    ) -> Json<ChannelDirectory> {
        let path = &services.config.local_playlist_path;

        let channels = match tokio::fs::read_to_string(path).await {
            Ok(text) => parse_channels(&text),
            Err(e) => {
                warn!("local playlist {} unreadable: {}", path, e);
                Vec::new()
            }
        };

        Json(ChannelDirectory::from_channels(channels, None))
    }

    async fn refresh_playlist(
        client: ClientInfo,
        Extension(services): Extension<AppServices>,
    ) -> AppResult<Json<serde_json::Value>> {
        if !is_private_caller(client.ip.as_deref()) {
            info!("refresh-playlist denied for {:?}", client.ip);
            return Err(Error::Forbidden);
        }

        services.playlist.invalidate().await;
        let directory = services.playlist.channel_directory().await?;

        info!(
            "playlist refreshed by {:?}, {} channels",
            client.ip,
            directory.channels.len()
        );

        Ok(Json(json!({
            "status": "ok",
            "channels": directory.channels.len(),
            "last_update": directory.last_update,
        })))
    }
}
