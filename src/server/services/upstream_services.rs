use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use reqwest::header;
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};

pub type DynUpstreamService = Arc<dyn UpstreamServiceTrait + Send + Sync>;

/// a terminal upstream response with the headers the proxy is allowed to
/// forward, anything invalidated by rewriting or re-framing is already gone
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// outcome of the redirect-following stage, named so the fallback path is a
/// first-class result rather than a hidden catch branch
enum FetchOutcome {
    Followed(reqwest::Response),
    DirectFallback(reqwest::Response),
}

#[automock]
#[async_trait]
pub trait UpstreamServiceTrait {
    /// GET the URL with the spoofed header set, following redirects manually,
    /// and return the filtered terminal response. Non-2xx terminal statuses
    /// are classified as errors carrying the upstream status.
    async fn fetch(&self, url: &str, user_agent: &str) -> AppResult<UpstreamResponse>;
}

pub struct UpstreamService {
    http: reqwest::Client,
    config: Arc<AppConfig>,
}

// invalidated by rewriting and by the response re-framing, never forwarded
const STRIPPED_HEADERS: [&str; 3] = ["content-encoding", "content-length", "transfer-encoding"];

impl UpstreamService {
    pub fn new(config: Arc<AppConfig>) -> Result<Self, reqwest::Error> {
        // redirects are followed by hand so the hop bound and Location
        // resolution stay under our control; a client that cannot be built
        // with these settings is a startup failure, not something to paper
        // over with a default client
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { http, config })
    }

    /// the upstream CDN caches aggressively, a per-request timestamp defeats
    /// that; the proxy's own cache is keyed before this is appended
    fn with_nocache(url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}_nocache={}",
            url,
            separator,
            chrono::Utc::now().timestamp()
        )
    }

    fn get_once(&self, url: &str, user_agent: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, &self.config.accept_language)
            .header(header::ORIGIN, &self.config.upstream_origin)
            .header(header::REFERER, &self.config.upstream_referer)
    }

    fn classify(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::UpstreamTimeout
        } else if e.is_connect() {
            Error::UpstreamConnection
        } else {
            Error::UpstreamUnexpected(e.to_string())
        }
    }

    /// resolve a `Location` header against the URL that produced it
    fn resolve_location(current: &str, location: &str) -> AppResult<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(location.to_string());
        }

        url::Url::parse(current)
            .and_then(|base| base.join(location))
            .map(|u| u.to_string())
            .map_err(|e| Error::UpstreamUnexpected(format!("bad redirect location: {}", e)))
    }

    async fn follow_redirects(
        &self,
        url: &str,
        user_agent: &str,
    ) -> AppResult<reqwest::Response> {
        let mut current = url.to_string();
        let mut hops: u32 = 0;

        loop {
            let response = self
                .get_once(&current, user_agent)
                .send()
                .await
                .map_err(Self::classify)?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    hops += 1;
                    if hops > self.config.max_redirects {
                        return Err(Error::TooManyRedirects(self.config.max_redirects));
                    }

                    let next = Self::resolve_location(&current, location)?;
                    debug!("redirect {} -> {} (hop {})", current, next, hops);
                    current = next;
                    continue;
                }
            }

            return Ok(response);
        }
    }

    /// two-stage fetch: follow redirects by hand, and when that stage fails on
    /// transport (not on the hop bound, which must stay visible) degrade to a
    /// single plain GET before giving up
    async fn fetch_with_fallback(&self, url: &str, user_agent: &str) -> AppResult<FetchOutcome> {
        match self.follow_redirects(url, user_agent).await {
            Ok(response) => Ok(FetchOutcome::Followed(response)),
            Err(e @ Error::TooManyRedirects(_)) => Err(e),
            Err(e) => {
                warn!("manual redirect stage failed ({}), retrying direct: {}", e, url);
                let response = self
                    .get_once(url, user_agent)
                    .send()
                    .await
                    .map_err(Self::classify)?;
                Ok(FetchOutcome::DirectFallback(response))
            }
        }
    }
}

#[async_trait]
impl UpstreamServiceTrait for UpstreamService {
    async fn fetch(&self, url: &str, user_agent: &str) -> AppResult<UpstreamResponse> {
        let started = std::time::Instant::now();
        let outbound = Self::with_nocache(url);

        let response = match self.fetch_with_fallback(&outbound, user_agent).await? {
            FetchOutcome::Followed(r) => r,
            FetchOutcome::DirectFallback(r) => r,
        };

        let status = response.status();
        if !status.is_success() {
            error!(
                "upstream error {} for {} after {:?}",
                status,
                url,
                started.elapsed()
            );
            return Err(Error::UpstreamHttp {
                status: status.as_u16(),
            });
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| {
                !STRIPPED_HEADERS
                    .iter()
                    .any(|stripped| name.as_str().eq_ignore_ascii_case(stripped))
            })
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(Self::classify)?.to_vec();

        debug!(
            "fetched {} ({} bytes, status {}) in {:?}",
            url,
            body.len(),
            status,
            started.elapsed()
        );

        Ok(UpstreamResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nocache_uses_the_right_separator() {
        assert!(UpstreamService::with_nocache("https://a.b/x.m3u8").contains("?_nocache="));
        assert!(UpstreamService::with_nocache("https://a.b/x.m3u8?tok=1").contains("&_nocache="));
    }

    #[test]
    fn location_resolution() {
        assert_eq!(
            UpstreamService::resolve_location("https://a.b/c/d", "https://x.y/z").unwrap(),
            "https://x.y/z"
        );
        assert_eq!(
            UpstreamService::resolve_location("https://a.b/c/d", "/other").unwrap(),
            "https://a.b/other"
        );
        assert_eq!(
            UpstreamService::resolve_location("https://a.b/c/d", "next").unwrap(),
            "https://a.b/c/next"
        );
    }

    #[test]
    fn content_type_lookup_is_case_insensitive() {
        let response = UpstreamResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "video/mp2t".into())],
            body: vec![],
        };
        assert_eq!(response.content_type(), "video/mp2t");
    }
}
