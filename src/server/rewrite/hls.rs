//! HLS manifest rewriter.
//!
//! Works line by line: every URI the player would fetch next is replaced with
//! a `/proxy?url=` wrapped absolute URL, and two buffering hints are applied
//! to media playlists (doubled target duration, a synthetic VOD marker).
//! Misrepresenting a live stream as VOD is deliberate: players then buffer
//! aggressively instead of chasing the live edge.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::server::utils::url_utils::{base_url_of, proxy_wrap, resolve_reference};

static URI_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]+)""#).expect("static regex should compile"));

static BARE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(https?://[^"\s,]+)"#).expect("static regex should compile"));

const TARGET_DURATION_TAG: &str = "#EXT-X-TARGETDURATION:";

/// what a single manifest line is, in rewrite priority order
#[derive(Debug, PartialEq)]
enum HlsLine<'a> {
    /// media playlists only: `#EXT-X-TARGETDURATION:<n>`
    TargetDuration(&'a str),
    /// comment with nothing resolvable in it
    PlainComment,
    /// carries a `URI="..."` attribute (keys, media renditions)
    UriAttribute,
    /// comment with one or more embedded absolute URLs
    CommentWithUrl,
    /// non-comment line referencing a segment or child playlist by suffix
    SegmentReference,
    /// master playlists only: any other non-blank non-comment line is a
    /// variant URI even without a recognised suffix
    VariantReference,
    /// anything else passes through
    Other,
}

fn classify<'a>(line: &'a str, is_master: bool) -> HlsLine<'a> {
    let trimmed = line.trim();

    if !is_master {
        if let Some(value) = trimmed.strip_prefix(TARGET_DURATION_TAG) {
            return HlsLine::TargetDuration(value);
        }
    }

    if line.starts_with('#') {
        if line.contains("URI=") {
            return HlsLine::UriAttribute;
        }
        if line.contains("http://") || line.contains("https://") {
            return HlsLine::CommentWithUrl;
        }
        return HlsLine::PlainComment;
    }

    if trimmed.ends_with(".ts")
        || trimmed.ends_with(".m3u8")
        || trimmed.contains(".ts?")
        || trimmed.contains(".m3u8?")
    {
        return HlsLine::SegmentReference;
    }

    if is_master && !trimmed.is_empty() {
        return HlsLine::VariantReference;
    }

    HlsLine::Other
}

fn rewrite_line(line: &str, base_url: &str, is_master: bool) -> String {
    match classify(line, is_master) {
        HlsLine::TargetDuration(value) => match value.trim().parse::<u64>() {
            Ok(n) => format!("{}{}", TARGET_DURATION_TAG, n * 2),
            // unparsable duration, leave it alone
            Err(_) => line.to_string(),
        },
        HlsLine::PlainComment | HlsLine::Other => line.to_string(),
        HlsLine::UriAttribute => URI_ATTR_RE
            .replace_all(line, |caps: &regex::Captures| {
                format!(
                    r#"URI="{}""#,
                    proxy_wrap(&resolve_reference(base_url, &caps[1]))
                )
            })
            .into_owned(),
        HlsLine::CommentWithUrl => BARE_URL_RE
            .replace_all(line, |caps: &regex::Captures| proxy_wrap(&caps[1]))
            .into_owned(),
        HlsLine::SegmentReference | HlsLine::VariantReference => {
            proxy_wrap(&resolve_reference(base_url, line.trim()))
        }
    }
}

/// rewrite an HLS manifest fetched from `source_url`
pub fn rewrite_hls(manifest: &str, source_url: &str) -> String {
    let base_url = base_url_of(source_url);
    let is_master = manifest.lines().any(|l| l.contains("#EXT-X-STREAM-INF"));

    let mut lines: Vec<String> = manifest
        .lines()
        .map(|line| rewrite_line(line, &base_url, is_master))
        .collect();

    if !is_master
        && !manifest.contains("#EXT-X-PLAYLIST-TYPE:VOD")
        && !manifest.contains("#EXT-X-ENDLIST")
    {
        insert_vod_marker(&mut lines);
    }

    lines.join("\n")
}

/// place `#EXT-X-PLAYLIST-TYPE:VOD` right before the first content line, i.e.
/// the first `#EXTINF` or the first non-blank non-comment line
fn insert_vod_marker(lines: &mut Vec<String>) {
    let position = lines.iter().position(|l| {
        let trimmed = l.trim();
        trimmed.starts_with("#EXTINF") || (!trimmed.is_empty() && !trimmed.starts_with('#'))
    });

    match position {
        Some(i) => lines.insert(i, "#EXT-X-PLAYLIST-TYPE:VOD".to_string()),
        None => lines.push("#EXT-X-PLAYLIST-TYPE:VOD".to_string()),
    }
}
