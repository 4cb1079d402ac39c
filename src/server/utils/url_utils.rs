use once_cell::sync::Lazy;
use regex::Regex;

use crate::server::error::{AppResult, Error};

static NESTED_PROXY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"proxy\?url=([^&]+)").expect("static regex should compile"));

/// outcome of sanitizing the raw `?url=` query value
///
/// an empty value is kept apart from a malformed one: the first means the
/// client forgot the parameter, the second means it sent garbage
#[derive(Debug, PartialEq)]
pub enum SanitizedUrl {
    Empty,
    Url(String),
}

/// collapse any number of nested `proxy?url=` wrappers and validate the scheme
///
/// rewritten manifests can end up double-wrapping a URL (a rewritten manifest
/// gets rewritten again), which would bounce requests through the proxy
/// forever, so every layer is peeled before the URL is touched
pub fn sanitize_url(raw: &str) -> AppResult<SanitizedUrl> {
    if raw.is_empty() {
        return Ok(SanitizedUrl::Empty);
    }

    let mut url = raw.to_string();
    while url.contains("proxy?url=") {
        match NESTED_PROXY_RE.captures(&url) {
            Some(caps) => {
                let inner = &caps[1];
                url = match urlencoding::decode(inner) {
                    Ok(decoded) => decoded.into_owned(),
                    // not valid percent-encoding, keep the raw capture
                    Err(_) => inner.to_string(),
                };
            }
            None => break,
        }
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(SanitizedUrl::Url(url))
    } else {
        Err(Error::InvalidUrl(raw.to_string()))
    }
}

/// wrap an absolute URL so the next fetch comes back through us
pub fn proxy_wrap(absolute: &str) -> String {
    format!("/proxy?url={}", urlencoding::encode(absolute))
}

/// the manifest's URL with its final path segment removed, used as the base
/// for resolving relative references
pub fn base_url_of(url: &str) -> String {
    match url.rsplit_once('/') {
        // keep the scheme's double slash intact for degenerate inputs
        Some((head, _)) if head.len() > "https:/".len() => format!("{}/", head),
        _ => url.to_string(),
    }
}

/// resolve a manifest reference against the base, absolute references pass
/// through untouched
pub fn resolve_reference(base: &str, reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }

    match url::Url::parse(base).and_then(|b| b.join(trimmed)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            tracing::error!("failed to resolve '{}' against '{}': {}", trimmed, base, e);
            trimmed.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_nested_proxy_layers() {
        let original = "https://a.b/c/stream.m3u8";
        let mut wrapped = original.to_string();
        for _ in 0..4 {
            wrapped = format!("/proxy?url={}", urlencoding::encode(&wrapped));
        }

        assert_eq!(
            sanitize_url(&wrapped).unwrap(),
            SanitizedUrl::Url(original.to_string())
        );
    }

    #[test]
    fn zero_layers_is_identity() {
        assert_eq!(
            sanitize_url("https://a.b/c").unwrap(),
            SanitizedUrl::Url("https://a.b/c".to_string())
        );
    }

    #[test]
    fn empty_input_is_the_empty_sentinel() {
        assert_eq!(sanitize_url("").unwrap(), SanitizedUrl::Empty);
    }

    #[test]
    fn bad_scheme_is_invalid() {
        assert!(matches!(
            sanitize_url("ftp://a.b/c"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            sanitize_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn base_url_strips_last_segment() {
        assert_eq!(
            base_url_of("https://a.b/c/playlist.m3u8"),
            "https://a.b/c/"
        );
    }

    #[test]
    fn relative_reference_resolves_against_base() {
        assert_eq!(
            resolve_reference("https://a.b/c/", "seg1.ts"),
            "https://a.b/c/seg1.ts"
        );
        assert_eq!(
            resolve_reference("https://a.b/c/", "/root.ts"),
            "https://a.b/root.ts"
        );
        assert_eq!(
            resolve_reference("https://a.b/c/", "https://x.y/z.ts"),
            "https://x.y/z.ts"
        );
    }
}
