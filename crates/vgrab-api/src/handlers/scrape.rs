//! Public scrape endpoint.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use url::Url;

use vgrab_models::is_image_url;

use crate::error::{ApiError, ApiResult};
use crate::scraper::{run_scrape, ScrapeRequest};
use crate::state::AppState;

/// Engines accepted in the path; everything else is declared unsupported.
const SUPPORTED_ENGINES: &[&str] = &["puppeteer"];

/// `GET /apis/scrape/v1/{engine}`
pub async fn scrape(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    if !SUPPORTED_ENGINES.contains(&engine.as_str()) {
        return Err(ApiError::bad_request(format!(
            "Unsupported engine: {}",
            engine
        )));
    }

    let api_key = param(&params, "apikey")
        .ok_or_else(|| ApiError::bad_request("API key is required"))?;
    if api_key != state.config.api_key {
        return Err(ApiError::bad_request("Invalid API key"));
    }

    let request = parse_request(&params)?;

    // Image targets are fetched directly and returned as base64 bytes.
    if is_image_url(&request.url) {
        let bytes = fetch_image(&request.url).await?;
        let body = base64::engine::general_purpose::STANDARD.encode(bytes);
        return Ok((
            [
                (header::CONTENT_TYPE, "text/plain"),
                (header::HeaderName::from_static("x-cache"), "MISS"),
            ],
            body,
        )
            .into_response());
    }

    let outcome = run_scrape(&state, &request).await?;
    let cache_header = if outcome.cached { "HIT" } else { "MISS" };

    // With a selected video the response is a JSON envelope; otherwise
    // the raw rendered HTML.
    let response = match &outcome.selected_video {
        Some(video) => (
            [(
                header::HeaderName::from_static("x-cache"),
                cache_header,
            )],
            Json(serde_json::json!({
                "url": request.url,
                "video": video,
                "apicalls": outcome.artifact.api_calls,
            })),
        )
            .into_response(),
        None => (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::HeaderName::from_static("x-cache"), cache_header),
            ],
            outcome.artifact.html.clone(),
        )
            .into_response(),
    };
    Ok(response)
}

/// Treat the literal string `default` as an unset parameter.
fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty() && *v != "default")
}

fn parse_request(params: &HashMap<String, String>) -> ApiResult<ScrapeRequest> {
    let raw_url = param(params, "url").ok_or_else(|| ApiError::bad_request("URL is required"))?;
    let url = Url::parse(raw_url).map_err(|e| ApiError::bad_request(format!("Invalid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request(format!(
            "Unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    let cookies = match param(params, "custom_cookies") {
        Some(raw) => parse_cookies(raw)?,
        None => Vec::new(),
    };

    let user_pass = param(params, "user_pass")
        .or_else(|| param(params, "basic_auth"))
        .map(parse_user_pass)
        .transpose()?;

    let timeout = param(params, "timeout")
        .map(|raw| {
            let ms: i64 = raw
                .parse()
                .map_err(|_| ApiError::bad_request("timeout must be an integer"))?;
            if ms <= 0 {
                return Err(ApiError::bad_request("timeout must be positive"));
            }
            Ok(Duration::from_millis(ms as u64))
        })
        .transpose()?;

    let cleanup = match param(params, "cleanup") {
        None => false,
        Some("true") => true,
        Some("false") => false,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "cleanup must be true or false, got {}",
                other
            )))
        }
    };

    let delay = param(params, "delay")
        .map(|raw| {
            let ms: i64 = raw
                .parse()
                .map_err(|_| ApiError::bad_request("delay must be an integer"))?;
            if ms < 0 {
                return Err(ApiError::bad_request("delay must not be negative"));
            }
            Ok(Duration::from_millis(ms as u64))
        })
        .transpose()?;

    let localstorage = match param(params, "localstorage") {
        Some(raw) => parse_pairs(raw, "localstorage")?,
        None => Vec::new(),
    };

    let eval = param(params, "eval")
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .map_err(|_| ApiError::bad_request("eval is not valid URL encoding"))
        })
        .transpose()?;

    Ok(ScrapeRequest {
        url: raw_url.to_string(),
        custom_user_agent: param(params, "custom_user_agent").map(String::from),
        cookies,
        user_pass,
        timeout,
        proxy_url: param(params, "proxy_url").map(String::from),
        proxy_auth: param(params, "proxy_auth").map(String::from),
        cleanup,
        delay,
        localstorage,
        eval,
    })
}

/// Cookies arrive either as URL-encoded JSON (`{"name":"value"}`) or as
/// a `name=value;name=value` string.
fn parse_cookies(raw: &str) -> ApiResult<Vec<(String, String)>> {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    if decoded.trim_start().starts_with('{') {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&decoded)
            .map_err(|e| ApiError::bad_request(format!("Invalid cookie JSON: {}", e)))?;
        return Ok(object
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect());
    }

    parse_pairs(&decoded, "custom_cookies")
}

/// `k=v;k=v` pairs; every non-empty segment must contain `=`.
fn parse_pairs(raw: &str, field: &str) -> ApiResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (name, value) = segment.split_once('=').ok_or_else(|| {
            ApiError::bad_request(format!("Invalid {} segment: {}", field, segment))
        })?;
        pairs.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

fn parse_user_pass(raw: &str) -> ApiResult<(String, String)> {
    let (user, pass) = raw
        .split_once(':')
        .ok_or_else(|| ApiError::bad_request("user_pass must be username:password"))?;
    Ok((user.to_string(), pass.to_string()))
}

async fn fetch_image(url: &str) -> ApiResult<Vec<u8>> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ApiError::Upstream(format!(
            "HTTP {} fetching image",
            response.status()
        )));
    }
    Ok(response
        .bytes()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?
        .to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_literal_is_unset() {
        let map = params(&[("timeout", "default")]);
        assert!(param(&map, "timeout").is_none());
    }

    #[test]
    fn test_url_required_and_validated() {
        assert!(parse_request(&params(&[])).is_err());
        assert!(parse_request(&params(&[("url", "not a url")])).is_err());
        assert!(parse_request(&params(&[("url", "ftp://x")])).is_err());
        assert!(parse_request(&params(&[("url", "https://example.com")])).is_ok());
    }

    #[test]
    fn test_timeout_validation() {
        let ok = parse_request(&params(&[("url", "https://e.com"), ("timeout", "5000")])).unwrap();
        assert_eq!(ok.timeout, Some(Duration::from_millis(5000)));

        assert!(parse_request(&params(&[("url", "https://e.com"), ("timeout", "0")])).is_err());
        assert!(parse_request(&params(&[("url", "https://e.com"), ("timeout", "-1")])).is_err());
        assert!(parse_request(&params(&[("url", "https://e.com"), ("timeout", "soon")])).is_err());
    }

    #[test]
    fn test_cleanup_validation() {
        assert!(parse_request(&params(&[("url", "https://e.com"), ("cleanup", "true")]))
            .unwrap()
            .cleanup);
        assert!(!parse_request(&params(&[("url", "https://e.com"), ("cleanup", "false")]))
            .unwrap()
            .cleanup);
        assert!(parse_request(&params(&[("url", "https://e.com"), ("cleanup", "yes")])).is_err());
    }

    #[test]
    fn test_delay_validation() {
        assert!(parse_request(&params(&[("url", "https://e.com"), ("delay", "-5")])).is_err());
        let ok = parse_request(&params(&[("url", "https://e.com"), ("delay", "250")])).unwrap();
        assert_eq!(ok.delay, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_cookie_string_form() {
        let cookies = parse_cookies("a=1; b=2").unwrap();
        assert_eq!(cookies, vec![("a".into(), "1".into()), ("b".into(), "2".into())]);

        assert!(parse_cookies("a=1; broken").is_err());
    }

    #[test]
    fn test_cookie_json_form() {
        let cookies = parse_cookies("%7B%22session%22%3A%22abc%22%7D").unwrap();
        assert_eq!(cookies, vec![("session".into(), "abc".into())]);
    }

    #[test]
    fn test_user_pass_requires_colon() {
        assert!(parse_user_pass("user:pass").is_ok());
        assert!(parse_user_pass("nopcolon").is_err());
    }

    #[test]
    fn test_localstorage_pairs() {
        let req = parse_request(&params(&[
            ("url", "https://e.com"),
            ("localstorage", "k1=v1;k2=v2"),
        ]))
        .unwrap();
        assert_eq!(req.localstorage.len(), 2);
    }
}
