use axum::{
    Extension, Json, Router,
    body::Body,
    extract::Query,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::server::{
    error::{AppResult, Error},
    extractors::{ClientInfo, is_private_caller},
    rewrite::{ManifestKind, rewrite_dash, rewrite_hls},
    services::AppServices,
    services::response_cache_services::ResponseCacheServiceTrait,
    services::upstream_services::UpstreamResponse,
    utils::url_utils::{SanitizedUrl, sanitize_url},
};

#[derive(Deserialize)]
struct ProxyQuery {
    #[serde(default)]
    url: String,
}

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const DASH_CONTENT_TYPE: &str = "application/dash+xml";

// upstream cache headers are dropped from media responses before the
// no-store set below is forced
const CACHE_HEADERS: [&str; 3] = ["cache-control", "pragma", "expires"];

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route("/proxy", get(Self::proxy_get))
            .route("/clear-cache", get(Self::clear_cache))
    }

    /// manifests must never be cached anywhere between us and the player, a
    /// stale segment list stalls the stream
    fn no_store_headers(headers: &mut HeaderMap) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    fn manifest_response(body: String, content_type: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        Self::no_store_headers(&mut headers);
        (StatusCode::OK, headers, body).into_response()
    }

    async fn proxy_get(
        client: ClientInfo,
        Extension(services): Extension<AppServices>,
        Query(params): Query<ProxyQuery>,
    ) -> AppResult<Response> {
        let started = std::time::Instant::now();

        let clean_url = match sanitize_url(&params.url)? {
            SanitizedUrl::Url(url) => url,
            SanitizedUrl::Empty => {
                debug!("proxy request without a url from {:?}", client.ip);
                return Err(Error::EmptyUrl);
            }
        };

        let user_agent = client
            .user_agent
            .as_deref()
            .unwrap_or(&services.config.fallback_user_agent)
            .to_string();

        let upstream = services
            .response_cache
            .get_or_fetch(&clean_url, &user_agent)
            .await
            .inspect_err(|e| {
                error!(
                    "proxy fetch failed for {} (client {:?}, {:?} elapsed): {}",
                    clean_url,
                    client.ip,
                    started.elapsed(),
                    e
                );
            })?;

        let content_type = upstream.content_type().to_string();

        let response = match ManifestKind::detect(&content_type, &clean_url) {
            ManifestKind::Hls => {
                debug!("rewriting HLS manifest from {}", clean_url);
                Self::manifest_response(
                    rewrite_hls(&upstream.body_text(), &clean_url),
                    HLS_CONTENT_TYPE,
                )
            }
            ManifestKind::Dash => {
                debug!("rewriting DASH manifest from {}", clean_url);
                Self::manifest_response(
                    rewrite_dash(&upstream.body_text(), &clean_url),
                    DASH_CONTENT_TYPE,
                )
            }
            ManifestKind::None => Self::passthrough(&content_type, &upstream),
        };

        debug!(
            "proxied {} ({}) in {:?}",
            clean_url,
            content_type,
            started.elapsed()
        );

        Ok(response)
    }

    /// forward the body untouched; media types additionally lose any upstream
    /// caching directives so players refetch segments after playlist refresh
    fn passthrough(content_type: &str, upstream: &UpstreamResponse) -> Response {
        let is_media = {
            let ct = content_type.to_ascii_lowercase();
            ct.contains("video/") || ct.contains("mp2t") || ct.contains("mp4")
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &upstream.headers {
            if is_media && CACHE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        if is_media {
            Self::no_store_headers(&mut headers);
        }

        let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
        (status, headers, Body::from(upstream.body.clone())).into_response()
    }

    async fn clear_cache(
        client: ClientInfo,
        Extension(services): Extension<AppServices>,
    ) -> AppResult<Json<serde_json::Value>> {
        if !is_private_caller(client.ip.as_deref()) {
            info!("clear-cache denied for {:?}", client.ip);
            return Err(Error::Forbidden);
        }

        let cleared = services.response_cache.clear().await;
        info!("cleared {} cached responses for {:?}", cleared, client.ip);

        Ok(Json(json!({
            "status": "ok",
            "cleared_entries": cleared,
        })))
    }
}
