use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};

pub type DynPlaylistService = Arc<dyn PlaylistServiceTrait + Send + Sync>;

static GROUP_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"group-title="([^"]+)""#).expect("static regex should compile"));

static TVG_LOGO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"tvg-logo="([^"]+)""#).expect("static regex should compile"));

const DEFAULT_GROUP: &str = "Без категории";

#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    pub id: usize,
    pub name: String,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub url: String,
}

/// the JSON shape of the channel directory endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDirectory {
    pub channels: Vec<Channel>,
    pub categories: HashMap<String, Vec<Channel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
}

impl ChannelDirectory {
    pub fn from_channels(channels: Vec<Channel>, last_update: Option<i64>) -> Self {
        let mut categories: HashMap<String, Vec<Channel>> = HashMap::new();
        for channel in &channels {
            categories
                .entry(channel.group.clone())
                .or_default()
                .push(channel.clone());
        }
        Self {
            channels,
            categories,
            last_update,
        }
    }
}

/// sequential `#EXTINF` / URL line pairing, the format the upstream provider
/// actually emits; an `#EXTINF` with no URL before the next `#EXTINF` is
/// dropped
pub fn parse_channels(playlist: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<(String, String, Option<String>)> = None;

    for line in playlist.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            let group = GROUP_TITLE_RE
                .captures(info)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| DEFAULT_GROUP.to_string());
            let logo = TVG_LOGO_RE.captures(info).map(|caps| caps[1].to_string());

            // the display name is whatever follows the first comma
            pending = info
                .split_once(',')
                .map(|(_, name)| (name.trim().to_string(), group, logo));
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some((name, group, logo)) = pending.take() {
                channels.push(Channel {
                    id: channels.len() + 1,
                    name,
                    group,
                    logo,
                    url: line.to_string(),
                });
            }
        }
    }

    channels
}

/// a cached copy of the upstream playlist text
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    pub text: String,
    pub fetched_at: i64,
}

#[automock]
#[async_trait]
pub trait PlaylistServiceTrait {
    /// cached or freshly-downloaded playlist text; a stale copy is served when
    /// the refetch fails and one exists
    async fn fetch(&self) -> AppResult<PlaylistSnapshot>;

    /// force the next fetch to hit upstream
    async fn invalidate(&self);

    async fn channel_directory(&self) -> AppResult<ChannelDirectory>;

    /// channels are addressed by their 1-based position in the playlist
    async fn channel_by_id(&self, id: usize) -> AppResult<Channel>;
}

pub struct PlaylistService {
    http: reqwest::Client,
    config: Arc<AppConfig>,
    // single global slot, tokio mutex because the refill happens under it
    slot: tokio::sync::Mutex<Option<PlaylistSnapshot>>,
}

impl PlaylistService {
    pub fn new(config: Arc<AppConfig>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(config.fallback_user_agent.clone())
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config,
            slot: tokio::sync::Mutex::new(None),
        })
    }

    async fn download(&self) -> AppResult<String> {
        let response = self
            .http
            .get(&self.config.playlist_url)
            .send()
            .await
            .map_err(|e| {
                error!("playlist download failed: {}", e);
                Error::PlaylistUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            error!("playlist upstream returned {}", response.status());
            return Err(Error::PlaylistUnavailable(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        response.text().await.map_err(|e| {
            error!("playlist body read failed: {}", e);
            Error::PlaylistUnavailable(e.to_string())
        })
    }
}

#[async_trait]
impl PlaylistServiceTrait for PlaylistService {
    async fn fetch(&self) -> AppResult<PlaylistSnapshot> {
        let mut slot = self.slot.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(snapshot) = slot.as_ref() {
            let age = now - snapshot.fetched_at;
            if age < self.config.playlist_ttl_secs as i64 {
                return Ok(snapshot.clone());
            }
            info!("playlist cache is stale ({}s old), refetching", age);
        }

        match self.download().await {
            Ok(text) => {
                info!("downloaded playlist ({} bytes)", text.len());
                let snapshot = PlaylistSnapshot {
                    text,
                    fetched_at: now,
                };
                *slot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => match slot.as_ref() {
                // a stale directory beats no directory
                Some(stale) => {
                    warn!("playlist refetch failed ({}), serving stale copy", e);
                    Ok(stale.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        *slot = None;
        info!("playlist cache invalidated");
    }

    async fn channel_directory(&self) -> AppResult<ChannelDirectory> {
        let snapshot = self.fetch().await?;
        let channels = parse_channels(&snapshot.text);
        Ok(ChannelDirectory::from_channels(
            channels,
            Some(snapshot.fetched_at),
        ))
    }

    async fn channel_by_id(&self, id: usize) -> AppResult<Channel> {
        let snapshot = self.fetch().await?;
        parse_channels(&snapshot.text)
            .into_iter()
            .find(|channel| channel.id == id)
            .ok_or(Error::ChannelNotFound(id))
    }
}
