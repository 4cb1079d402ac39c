// full-manifest rewrites over realistic playlists, the per-rule cases live
// next to the rewriters themselves
use iptv_edge::server::rewrite::{ManifestKind, rewrite_dash, rewrite_hls};

const MEDIA_URL: &str = "https://cdn.example.com/hls/ch1/index.m3u8";

#[test]
fn test_live_media_playlist_rewrite() {
    let manifest = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:1042
#EXT-X-KEY:METHOD=AES-128,URI=\"enc.key\",IV=0x9c7db8778571d945a4e4d1f5e0a2f1b3
#EXTINF:6.000,
seg1042.ts
#EXTINF:6.000,
seg1043.ts?token=xyz
#EXTINF:6.000,
https://edge2.example.com/hls/ch1/seg1044.ts";

    let out = rewrite_hls(manifest, MEDIA_URL);
    let lines: Vec<&str> = out.lines().collect();

    // buffering hints
    assert!(out.contains("#EXT-X-TARGETDURATION:12"));
    assert_eq!(out.matches("#EXT-X-PLAYLIST-TYPE:VOD").count(), 1);
    let vod = lines
        .iter()
        .position(|l| *l == "#EXT-X-PLAYLIST-TYPE:VOD")
        .unwrap();
    let first_extinf = lines.iter().position(|l| l.starts_with("#EXTINF")).unwrap();
    assert!(vod < first_extinf);

    // every fetchable URI goes through the proxy
    assert!(out.contains("URI=\"/proxy?url=https%3A%2F%2Fcdn.example.com%2Fhls%2Fch1%2Fenc.key\""));
    assert!(out.contains("/proxy?url=https%3A%2F%2Fcdn.example.com%2Fhls%2Fch1%2Fseg1042.ts"));
    assert!(out.contains("/proxy?url=https%3A%2F%2Fcdn.example.com%2Fhls%2Fch1%2Fseg1043.ts%3Ftoken%3Dxyz"));
    assert!(out.contains("/proxy?url=https%3A%2F%2Fedge2.example.com%2Fhls%2Fch1%2Fseg1044.ts"));

    // nothing upstream-addressed survives outside a proxy wrap
    assert!(!lines.iter().any(|l| l.starts_with("https://")));

    // untouched structural tags survive
    assert!(out.contains("#EXT-X-MEDIA-SEQUENCE:1042"));
    assert!(out.contains("#EXT-X-VERSION:3"));
}

#[test]
fn test_master_playlist_rewrite() {
    let manifest = "\
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=640x360
360p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5120000,RESOLUTION=1920x1080
hd_variant";

    let out = rewrite_hls(manifest, MEDIA_URL);

    assert!(out.contains("/proxy?url=https%3A%2F%2Fcdn.example.com%2Fhls%2Fch1%2F360p%2Findex.m3u8"));
    // stream-info URIs are wrapped even without a .m3u8 suffix
    assert!(out.contains("/proxy?url=https%3A%2F%2Fcdn.example.com%2Fhls%2Fch1%2Fhd_variant"));
    // master playlists get no media-only hints
    assert!(!out.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
}

#[test]
fn test_dash_manifest_rewrite() {
    let manifest = r#"<?xml version="1.0"?>
<MPD minBufferTime="PT1.5S">
  <SegmentTemplate initialization="init_$RepresentationID$.mp4" media="chunk_$Number$.m4s" startNumber="1"/>
  <BaseURL>https://cdn.example.com/dash/ch1/seg7.m4s</BaseURL>
</MPD>"#;

    let out = rewrite_dash(manifest, "https://cdn.example.com/dash/ch1/manifest.mpd");

    assert!(out.contains(r#"initialization="/proxy?url=https%3A%2F%2Fcdn.example.com%2Fdash%2Fch1%2Finit_%24RepresentationID%24.mp4""#));
    assert!(out.contains(r#"media="/proxy?url=https%3A%2F%2Fcdn.example.com%2Fdash%2Fch1%2Fchunk_%24Number%24.m4s""#));
    assert!(out.contains("<BaseURL>/proxy?url=https%3A%2F%2Fcdn.example.com%2Fdash%2Fch1%2Fseg7.m4s</BaseURL>"));
    assert!(out.contains(r#"minBufferTime="PT1.5S""#));
}

#[test]
fn test_dispatch_detection() {
    assert_eq!(
        ManifestKind::detect("application/vnd.apple.mpegurl", "https://a.b/live"),
        ManifestKind::Hls
    );
    assert_eq!(
        ManifestKind::detect("application/octet-stream", "https://a.b/live.mpd"),
        ManifestKind::Dash
    );
    assert_eq!(
        ManifestKind::detect("video/mp2t", "https://a.b/seg.ts"),
        ManifestKind::None
    );
}
