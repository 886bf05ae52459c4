//! Candidate scoring and selection.

use tracing::info;

use vgrab_models::{normalize_video_url, VideoCandidate};

/// URL substrings that mark known ad/tracker endpoints. Candidates
/// matching any of these are dropped before scoring.
const AD_URL_PATTERNS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication",
    "googleadservices",
    "adservice.",
    "/adserver/",
    "adsystem",
    "adnxs.com",
    "moatads",
    "scorecardresearch",
    "exoclick",
    "juicyads",
    "trafficjunky",
    "popads",
    "/vast?",
    "/vast/",
];

/// Hosts that, while not hard-filtered, are penalized as ad CDNs.
const AD_CDN_HOSTS: &[&str] = &["ads.", "ad.", "banner.", "promo.", "sponsor."];

/// Query markers typical of ad networks.
const AD_QUERY_MARKERS: &[&str] = &["ad_id=", "adzone", "zoneid=", "campaignid=", "creativeid="];

/// Junk/placeholder file patterns.
const JUNK_PATTERNS: &[&str] = &[
    "blank.mp4",
    "placeholder",
    "dummy",
    "empty.mp4",
    "no-video",
    "loading.mp4",
    "spacer",
];

/// Theme/asset path fragments.
const THEME_PATHS: &[&str] = &[
    "/themes/", "/player/", "/assets/", "/static/", "/skin/", "/skins/", "/templates/",
];

/// Content-serving path fragments.
const CONTENT_PATHS: &[&str] = &[
    "/storage/", "/videos/", "/uploads/", "/media/", "/content/", "/files/",
];

/// Download-route fragments.
const DOWNLOAD_PATHS: &[&str] = &["/dload/", "/download/", "/dl/", "/get/"];

/// Generic filename stems that carry no signal.
const GENERIC_NAMES: &[&str] = &["index", "video", "movie", "file", "stream", "playlist", "media"];

/// Suspicious tracker-ish substrings.
const SUSPICIOUS_MARKERS: &[&str] = &["pixel", "beacon", "track", "analytics", "telemetry", "1x1"];

/// Trusted CDN host fragments.
const TRUSTED_CDN_HOSTS: &[&str] = &[
    "cloudfront.net",
    "akamai",
    "fastly",
    "b-cdn.net",
    "bunnycdn",
    "cdn77",
    "cloudflarestream",
    ".cdn.",
];

/// Non-media container extensions.
const FILE_EXTENSIONS: &[(&str, i32)] = &[
    (".webm", 40),
    (".mov", 40),
    (".avi", 40),
    (".mkv", 40),
    (".m4v", 40),
];

/// Quality-token scores, divided by 5 when applied.
const QUALITY_TOKENS: &[(&str, i32)] = &[
    ("2160p", 100),
    ("1440p", 80),
    ("1080p", 60),
    ("720p", 40),
    ("480p", 20),
    ("360p", 10),
];

/// Resolution path-segment ladder for `/NNN(N)/` segments.
const RESOLUTION_LADDER: &[(&str, i32)] = &[
    ("/2160/", 20),
    ("/1440/", 20),
    ("/1080/", 16),
    ("/720/", 12),
    ("/480/", 8),
    ("/360/", 4),
    ("/240/", 4),
];

/// A scored candidate with the reasons that produced the score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: VideoCandidate,
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Select the best candidate, if any survive filtering.
pub fn select_best(candidates: &[VideoCandidate]) -> Option<VideoCandidate> {
    select_best_scored(candidates).map(|scored| scored.candidate)
}

/// Select the best candidate with its score breakdown.
///
/// Pipeline: drop ads and stream fragments, dedupe by query-stripped URL,
/// short-circuit a single survivor, otherwise score and take the maximum
/// (first seen wins ties).
pub fn select_best_scored(candidates: &[VideoCandidate]) -> Option<ScoredCandidate> {
    let mut survivors: Vec<&VideoCandidate> = candidates
        .iter()
        .filter(|c| !is_ad_url(&c.url))
        .filter(|c| !is_stream_fragment(c))
        .collect();

    // Dedupe by normalized URL, keeping first-seen.
    let mut seen = std::collections::HashSet::new();
    survivors.retain(|c| seen.insert(normalize_video_url(&c.url)));

    if survivors.is_empty() {
        return None;
    }
    if survivors.len() == 1 {
        let candidate = survivors[0].clone();
        info!(url = %candidate.url, "selected sole candidate");
        return Some(ScoredCandidate {
            candidate,
            score: 0,
            reasons: vec!["only candidate".to_string()],
        });
    }

    let mut best: Option<ScoredCandidate> = None;
    for candidate in survivors {
        let scored = score_candidate(candidate);
        let better = match &best {
            Some(current) => scored.score > current.score,
            None => true,
        };
        if better {
            best = Some(scored);
        }
    }

    if let Some(winner) = &best {
        info!(
            url = %winner.candidate.url,
            score = winner.score,
            reasons = %winner.reasons.join(", "),
            "selected best candidate"
        );
    }
    best
}

/// Whether a URL matches the hard ad/tracker filter.
fn is_ad_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    AD_URL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Whether a candidate is a stream fragment rather than a playable whole.
fn is_stream_fragment(candidate: &VideoCandidate) -> bool {
    let url = candidate.url.to_ascii_lowercase();
    let path = url.split(['?', '#']).next().unwrap_or(&url);

    if url.starts_with("blob:") {
        return true;
    }
    if path.ends_with(".ts") || path.ends_with(".m4s") {
        return true;
    }
    if has_numbered_fragment(path, "seg-") || has_numbered_fragment(path, "chunk-") {
        return true;
    }
    if let Some(mime) = &candidate.mime_type {
        if mime.eq_ignore_ascii_case("video/mp2t") {
            return true;
        }
    }
    false
}

/// Matches `<marker><digits>` anywhere in the path (e.g. `seg-42.ts`).
fn has_numbered_fragment(path: &str, marker: &str) -> bool {
    let mut rest = path;
    while let Some(pos) = rest.find(marker) {
        let after = &rest[pos + marker.len()..];
        if after.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            return true;
        }
        rest = after;
    }
    false
}

/// Whether the path contains a `/library/<digits>/` segment.
fn has_library_segment(path: &str) -> bool {
    let mut rest = path;
    while let Some(pos) = rest.find("/library/") {
        let after = &rest[pos + "/library/".len()..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && after[digits.len()..].starts_with('/') {
            return true;
        }
        rest = after;
    }
    false
}

/// Filename stem (no extension) from a URL path.
fn filename_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// A long hyphenated slug that is not just a UUID.
fn has_meaningful_slug(stem: &str) -> bool {
    if stem.len() < 15 {
        return false;
    }
    if stem.matches('-').count() < 2 {
        return false;
    }
    // UUIDs are hex-and-dash only with the canonical group lengths.
    let uuid_like = stem.len() == 36
        && stem
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-')
        && stem.split('-').map(str::len).collect::<Vec<_>>() == [8, 4, 4, 4, 12];
    !uuid_like
}

fn score_candidate(candidate: &VideoCandidate) -> ScoredCandidate {
    let url = &candidate.url;
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower).to_string();
    let query = lower.split_once('?').map(|(_, q)| q).unwrap_or("");
    let stem = filename_stem(&path).to_string();

    let mut score = 0i32;
    let mut reasons: Vec<String> = Vec::new();
    fn add(points: i32, reason: &str, reasons: &mut Vec<String>) -> i32 {
        reasons.push(format!("{reason} ({points:+})"));
        points
    }

    let is_junk = JUNK_PATTERNS.iter().any(|p| lower.contains(p));
    let is_theme = THEME_PATHS.iter().any(|p| path.contains(p));
    let has_content_path = CONTENT_PATHS.iter().any(|p| path.contains(p));

    if is_junk {
        score += add(-100, "junk pattern", &mut reasons);
    }
    if is_theme {
        score += add(-50, "theme/asset path", &mut reasons);
    }

    if path.ends_with(".mp4") {
        if is_junk || is_theme {
            score += add(10, "mp4 (junk-suspect)", &mut reasons);
        } else {
            score += add(50, "mp4 extension", &mut reasons);
        }
    }
    for (ext, points) in FILE_EXTENSIONS {
        if path.ends_with(ext) {
            score += add(*points, "container extension", &mut reasons);
            break;
        }
    }
    if candidate.is_hls || path.ends_with(".m3u8") || path.ends_with(".m3u") {
        score += add(20, "hls playlist", &mut reasons);
    }
    if path.ends_with(".mpd") {
        score += add(15, "dash manifest", &mut reasons);
    }
    if DOWNLOAD_PATHS.iter().any(|p| path.contains(p)) {
        score += add(25, "download route", &mut reasons);
    }
    if candidate.is_primary {
        score += add(15, "primary player", &mut reasons);
    }
    if AD_CDN_HOSTS.iter().any(|h| lower.contains(h)) {
        score += add(-80, "ad cdn host", &mut reasons);
    }
    if AD_QUERY_MARKERS.iter().any(|m| query.contains(m)) {
        score += add(-60, "ad query marker", &mut reasons);
    }
    if has_library_segment(&path) {
        score += add(-30, "library path", &mut reasons);
    }
    if has_content_path {
        score += add(15, "content path", &mut reasons);
    }
    for (token, points) in QUALITY_TOKENS {
        if lower.contains(token) {
            score += add(points / 5, "quality token", &mut reasons);
            break;
        }
    }
    for (segment, points) in RESOLUTION_LADDER {
        if path.contains(segment) {
            score += add(*points, "resolution segment", &mut reasons);
            break;
        }
    }
    let name_points = ((stem.len() / 20) as i32).min(5);
    if name_points > 0 {
        score += add(name_points, "filename length", &mut reasons);
    }
    let slug = has_meaningful_slug(&stem);
    if slug {
        score += add(10, "meaningful slug", &mut reasons);
    }
    if GENERIC_NAMES.contains(&stem.as_str()) && !slug && !has_content_path {
        score += add(-5, "generic filename", &mut reasons);
    }
    if lower.starts_with("blob:") {
        score += add(-30, "blob url", &mut reasons);
    } else {
        score += add(10, "fetchable scheme", &mut reasons);
    }
    if url.len() < 50 {
        score += add(-10, "short url", &mut reasons);
    }
    if candidate.content_length.unwrap_or(0) > 0 {
        score += add(3, "declared size", &mut reasons);
    }
    if TRUSTED_CDN_HOSTS.iter().any(|h| lower.contains(h)) {
        score += add(5, "trusted cdn", &mut reasons);
    }
    if SUSPICIOUS_MARKERS.iter().any(|m| lower.contains(m)) {
        score += add(-20, "suspicious marker", &mut reasons);
    }

    ScoredCandidate {
        candidate: candidate.clone(),
        score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> VideoCandidate {
        VideoCandidate::from_url(url)
    }

    #[test]
    fn test_ad_candidates_never_beat_content() {
        let ads = candidate("https://cdn.ex/ads.doubleclick.net/x.mp4");
        let real = candidate("https://cdn.ex/videos/1080p/clip.mp4");
        let best = select_best(&[ads, real.clone()]).unwrap();
        assert_eq!(best.url, real.url);
    }

    #[test]
    fn test_segments_never_beat_playlist() {
        let seg = candidate("https://s/stream/seg-42.ts");
        let mut playlist = candidate("https://s/stream/master.m3u8");
        playlist.is_hls = true;
        let best = select_best(&[seg, playlist.clone()]).unwrap();
        assert_eq!(best.url, playlist.url);
    }

    #[test]
    fn test_single_survivor_returned_unscored() {
        let only = candidate("https://s/v/clip.mp4");
        let best = select_best_scored(&[only.clone()]).unwrap();
        assert_eq!(best.candidate.url, only.url);
        assert_eq!(best.reasons, vec!["only candidate".to_string()]);
    }

    #[test]
    fn test_all_filtered_yields_none() {
        let list = [
            candidate("https://ads.doubleclick.net/x.mp4"),
            candidate("blob:https://page/xyz"),
            candidate("https://s/hls/chunk-3.m4s"),
        ];
        assert!(select_best(&list).is_none());
    }

    #[test]
    fn test_dedupe_by_query_stripped_url() {
        let a = candidate("https://s/v/clip.mp4?tok=1");
        let b = candidate("https://s/v/clip.mp4?tok=2");
        let best = select_best_scored(&[a.clone(), b]).unwrap();
        assert_eq!(best.candidate.url, a.url);
        assert_eq!(best.reasons, vec!["only candidate".to_string()]);
    }

    #[test]
    fn test_full_file_beats_junk_placeholder() {
        let junk = candidate("https://s/player/blank.mp4");
        let real = candidate("https://s/storage/my-favorite-show-episode-3.mp4");
        let best = select_best(&[junk, real.clone()]).unwrap();
        assert_eq!(best.url, real.url);
    }

    #[test]
    fn test_quality_token_breaks_tie() {
        let low = candidate("https://cdn.site/videos/some-long-clip-name-360p.mp4");
        let high = candidate("https://cdn.site/videos/some-long-clip-name-1080p.mp4");
        let best = select_best(&[low, high.clone()]).unwrap();
        assert_eq!(best.url, high.url);
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let a = candidate("https://cdn.site/videos/first-long-clip-name.mp4");
        let b = candidate("https://cdn.site/videos/apple-long-clip-name.mp4");
        let best = select_best(&[a.clone(), b]).unwrap();
        assert_eq!(best.url, a.url);
    }

    #[test]
    fn test_mp2t_mime_is_fragment() {
        let mut seg = candidate("https://s/stream/0001");
        seg.mime_type = Some("video/MP2T".to_string());
        assert!(is_stream_fragment(&seg));
    }

    #[test]
    fn test_numbered_fragments_detected() {
        assert!(has_numbered_fragment("/hls/seg-12.ts", "seg-"));
        assert!(has_numbered_fragment("/hls/chunk-0001.m4s", "chunk-"));
        assert!(!has_numbered_fragment("/hls/segment.mp4", "seg-"));
    }

    #[test]
    fn test_library_segment() {
        assert!(has_library_segment("/library/12345/clip.mp4"));
        assert!(!has_library_segment("/library/books/clip.mp4"));
    }

    #[test]
    fn test_uuid_slug_is_not_meaningful() {
        assert!(!has_meaningful_slug("550e8400-e29b-41d4-a716-446655440000"));
        assert!(has_meaningful_slug("my-favorite-show-episode-3"));
        assert!(!has_meaningful_slug("clip-1"));
    }

    #[test]
    fn test_primary_player_is_soft_bonus() {
        // A junk primary source loses to a real file: primary is a hint,
        // not a veto.
        let mut junk_primary = candidate("https://s/player/blank.mp4");
        junk_primary.is_primary = true;
        let real = candidate("https://s/uploads/full-show-recording-1080p.mp4");
        let best = select_best(&[junk_primary, real.clone()]).unwrap();
        assert_eq!(best.url, real.url);
    }
}
