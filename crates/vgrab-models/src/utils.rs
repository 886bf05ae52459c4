//! URL helpers shared across crates.

use url::Url;

/// Normalize a media URL for deduplication: strip query and fragment.
///
/// Unparseable URLs are returned unchanged so callers can still compare
/// them byte-wise.
pub fn normalize_video_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Extract the last path segment of a URL, without query or fragment.
pub fn filename_from_url(raw: &str) -> String {
    let name = match Url::parse(raw) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(String::from))
            .unwrap_or_default(),
        Err(_) => raw
            .rsplit('/')
            .next()
            .unwrap_or("")
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .to_string(),
    };
    if name.is_empty() {
        "video".to_string()
    } else {
        name
    }
}

/// Whether the URL points at an HLS playlist.
pub fn is_hls_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Whether the URL points at a DASH manifest.
pub fn is_dash_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".mpd")
}

/// Whether the URL looks like a static image by extension.
pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    const IMAGE_EXTS: &[&str] = &[
        ".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".svg", ".ico", ".avif",
    ];
    IMAGE_EXTS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_video_url("https://v.com/a/b/clip.mp4?x=1#t=2"),
            "https://v.com/a/b/clip.mp4"
        );
        assert_eq!(
            normalize_video_url("https://v.com/a/b/clip.m3u8?x=1"),
            normalize_video_url("https://v.com/a/b/clip.m3u8?y=2")
        );
    }

    #[test]
    fn test_normalize_keeps_unparseable_input() {
        assert_eq!(normalize_video_url("not a url"), "not a url");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://v.com/a/clip.mp4?x=1"), "clip.mp4");
        assert_eq!(filename_from_url("https://v.com/a/b/"), "b");
        assert_eq!(filename_from_url("https://v.com/"), "video");
    }

    #[test]
    fn test_is_hls_url() {
        assert!(is_hls_url("https://s/master.m3u8"));
        assert!(is_hls_url("https://s/master.m3u8?token=x"));
        assert!(is_hls_url("https://s/list.M3U"));
        assert!(!is_hls_url("https://s/clip.mp4"));
    }

    #[test]
    fn test_is_image_url() {
        assert!(is_image_url("https://s/photo.JPG"));
        assert!(is_image_url("https://s/photo.webp?w=100"));
        assert!(!is_image_url("https://s/clip.mp4"));
    }
}
