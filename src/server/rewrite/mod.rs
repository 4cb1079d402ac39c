pub mod dash;
pub mod hls;

pub use dash::rewrite_dash;
pub use hls::rewrite_hls;

/// which rewrite path an upstream response takes, decided from the response
/// content type with the URL suffix as a fallback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManifestKind {
    Hls,
    Dash,
    None,
}

impl ManifestKind {
    pub fn detect(content_type: &str, url: &str) -> Self {
        // upstreams answer with vnd.apple.mpegurl, x-mpegurl or audio/mpegurl
        let content_type = content_type.to_ascii_lowercase();

        if content_type.contains("mpegurl") || has_suffix(url, ".m3u8") {
            ManifestKind::Hls
        } else if content_type.contains("dash+xml") || has_suffix(url, ".mpd") {
            ManifestKind::Dash
        } else {
            ManifestKind::None
        }
    }
}

/// suffix match tolerant of a trailing query string
fn has_suffix(url: &str, suffix: &str) -> bool {
    url.ends_with(suffix) || url.contains(&format!("{}?", suffix))
}
