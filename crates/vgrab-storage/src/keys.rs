//! Deterministic object key generation.

use sha2::{Digest, Sha256};

use vgrab_models::{filename_from_url, normalize_video_url};

/// Hex digits of the URL hash embedded in the key.
const HASH_LEN: usize = 12;

/// Maximum length of the sanitized filename portion.
const MAX_NAME_LEN: usize = 100;

/// Default container extension for assembled streams.
const DEFAULT_EXT: &str = "mp4";

/// Sanitize a filename stem for use in an object key: lowercase, replace
/// disallowed characters with `-`, collapse runs, trim, cap length.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true; // trim leading dashes
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.len() > MAX_NAME_LEN {
        out.truncate(MAX_NAME_LEN);
        while out.ends_with('-') {
            out.pop();
        }
    }
    if out.is_empty() {
        "video".to_string()
    } else {
        out
    }
}

/// Split a filename into stem and extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Map the source extension to the stored container extension.
///
/// HLS playlists are assembled to MP4 before upload, so their keys carry
/// the output extension.
fn output_extension(ext: Option<&str>) -> String {
    match ext.map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "m3u8" || ext == "m3u" || ext == "mpd" => DEFAULT_EXT.to_string(),
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) && ext.len() <= 5 => ext,
        _ => DEFAULT_EXT.to_string(),
    }
}

/// Deterministic storage key for a media URL.
///
/// `key_prefix + sanitized-stem + "-" + sha256(normalized-url)[..12] + "." + ext`
///
/// Query and fragment are stripped before hashing, so URLs differing only
/// in those components map to the same object — the dedup anchor.
pub fn storage_key(key_prefix: &str, url: &str) -> String {
    let normalized = normalize_video_url(url);
    let digest = Sha256::digest(normalized.as_bytes());
    let hash = &hex::encode(digest)[..HASH_LEN];

    let filename = filename_from_url(&normalized);
    let (stem, ext) = split_extension(&filename);
    let stem = sanitize_filename(stem);
    let ext = output_extension(ext);

    format!("{}{}-{}.{}", key_prefix, stem, hash, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_and_fragment_do_not_change_key() {
        let a = storage_key("media/", "https://v.com/a/b/clip.m3u8?x=1");
        let b = storage_key("media/", "https://v.com/a/b/clip.m3u8?y=2");
        let c = storage_key("media/", "https://v.com/a/b/clip.m3u8#t=30");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_hls_key_maps_to_mp4() {
        let key = storage_key("", "https://v.com/a/b/clip.m3u8?x=1");
        assert!(key.ends_with(".mp4"), "got {key}");
        assert!(key.starts_with("clip-"));
    }

    #[test]
    fn test_plain_mp4_keeps_extension() {
        let key = storage_key("media/", "https://v.com/path/My%20Clip.MP4");
        assert!(key.starts_with("media/"));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_filename("My  Fancy--Clip!!"), "my-fancy-clip");
        assert_eq!(sanitize_filename("***"), "video");
        assert_eq!(sanitize_filename("ok_name.part"), "ok_name.part");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a".repeat(400);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[test]
    fn test_distinct_urls_distinct_keys() {
        let a = storage_key("", "https://v.com/a/clip.mp4");
        let b = storage_key("", "https://v.com/b/clip.mp4");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_is_stable() {
        let a = storage_key("media/", "https://v.com/a/clip.mp4");
        let b = storage_key("media/", "https://v.com/a/clip.mp4");
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_extension_defaults_to_mp4() {
        let key = storage_key("", "https://v.com/watch/stream");
        assert!(key.ends_with(".mp4"));
    }
}
