//! DASH manifest rewriter.
//!
//! Unlike HLS there is no line structure worth preserving, the `.mpd` is XML
//! and the only things the player fetches are `initialization=`/`media=`
//! template attributes plus the occasional bare segment URL, so two regex
//! passes over the whole document are enough.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::server::utils::url_utils::{base_url_of, proxy_wrap, resolve_reference};

static SEGMENT_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(initialization|media)="([^"]+)""#).expect("static regex should compile")
});

static BARE_MEDIA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>]+\.(?:m4s|mp4)"#).expect("static regex should compile")
});

/// rewrite a DASH manifest fetched from `source_url`
pub fn rewrite_dash(manifest: &str, source_url: &str) -> String {
    let base_url = base_url_of(source_url);

    let attrs_rewritten = SEGMENT_ATTR_RE.replace_all(manifest, |caps: &regex::Captures| {
        format!(
            r#"{}="{}""#,
            &caps[1],
            proxy_wrap(&resolve_reference(&base_url, &caps[2]))
        )
    });

    // attribute values wrapped above are percent-encoded, so this second pass
    // cannot double-wrap them
    BARE_MEDIA_URL_RE
        .replace_all(&attrs_rewritten, |caps: &regex::Captures| {
            proxy_wrap(&caps[0])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.example.com/live/stream.mpd";

    #[test]
    fn media_template_is_wrapped() {
        let manifest = r#"<SegmentTemplate media="chunk_$Number$.m4s" startNumber="1"/>"#;
        let out = rewrite_dash(manifest, BASE);

        assert!(out.contains(&format!(
            r#"media="{}""#,
            proxy_wrap("https://cdn.example.com/live/chunk_$Number$.m4s")
        )));
        assert!(out.contains(r#"startNumber="1""#));
    }

    #[test]
    fn initialization_attribute_is_wrapped() {
        let manifest = r#"<SegmentTemplate initialization="init.mp4"/>"#;
        let out = rewrite_dash(manifest, BASE);

        assert!(out.contains(&format!(
            r#"initialization="{}""#,
            proxy_wrap("https://cdn.example.com/live/init.mp4")
        )));
    }

    #[test]
    fn absolute_attribute_value_is_not_rebased() {
        let manifest = r#"<SegmentTemplate media="https://other.cdn/seg_$Number$.m4s"/>"#;
        let out = rewrite_dash(manifest, BASE);

        assert!(out.contains(&format!(
            r#"media="{}""#,
            proxy_wrap("https://other.cdn/seg_$Number$.m4s")
        )));
    }

    #[test]
    fn bare_segment_url_is_wrapped() {
        let manifest = "<BaseURL>https://cdn.example.com/live/seg42.m4s</BaseURL>";
        let out = rewrite_dash(manifest, BASE);

        assert!(out.contains(&proxy_wrap("https://cdn.example.com/live/seg42.m4s")));
        assert!(!out.contains(">https://cdn.example.com"));
    }

    #[test]
    fn unrelated_attributes_untouched() {
        let manifest = r#"<MPD minBufferTime="PT1.5S" profiles="urn:mpeg:dash:profile"/>"#;
        assert_eq!(rewrite_dash(manifest, BASE), manifest);
    }
}
