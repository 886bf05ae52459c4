//! Download target validation.

use std::net::IpAddr;

use url::{Host, Url};

use crate::error::{MediaError, MediaResult};

/// Reject URLs that point into private or local address space.
///
/// Only `http`/`https` schemes are allowed; literal IPs in loopback,
/// RFC 1918, link-local, and the 0.0.0.0/8 ranges are blocked, as are
/// `localhost`-style hostnames. The check runs before any socket is
/// opened.
pub fn validate_download_url(raw: &str) -> MediaResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| MediaError::download_failed(format!("invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(MediaError::UnsupportedScheme(other.to_string())),
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local")
            {
                return Err(MediaError::BlockedHost(domain));
            }
        }
        Some(Host::Ipv4(ip)) => {
            if is_blocked_ip(IpAddr::V4(ip)) {
                return Err(MediaError::BlockedHost(ip.to_string()));
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_blocked_ip(IpAddr::V6(ip)) {
                return Err(MediaError::BlockedHost(ip.to_string()));
            }
        }
        None => return Err(MediaError::download_failed("URL has no host")),
    }

    Ok(url)
}

/// Whether an IP falls into a blocked range.
fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()                                   // 127/8
                || v4.is_private()                             // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()                          // 169.254/16
                || octets[0] == 0                              // 0/8
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // IPv4-mapped addresses re-checked as IPv4
                || v6.to_ipv4_mapped().map(|v4| is_blocked_ip(IpAddr::V4(v4))).unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(url: &str) -> bool {
        matches!(
            validate_download_url(url),
            Err(MediaError::BlockedHost(_)) | Err(MediaError::UnsupportedScheme(_))
        )
    }

    #[test]
    fn test_allows_public_hosts() {
        assert!(validate_download_url("https://cdn.example.com/v.mp4").is_ok());
        assert!(validate_download_url("http://93.184.216.34/v.mp4").is_ok());
    }

    #[test]
    fn test_blocks_localhost() {
        assert!(blocked("http://localhost/x.mp4"));
        assert!(blocked("http://sub.localhost/x.mp4"));
        assert!(blocked("http://127.0.0.1/x.mp4"));
        assert!(blocked("http://127.8.8.8/x.mp4"));
    }

    #[test]
    fn test_blocks_private_ranges() {
        assert!(blocked("http://10.0.0.5/x.mp4"));
        assert!(blocked("http://172.16.0.1/x.mp4"));
        assert!(blocked("http://172.31.255.255/x.mp4"));
        assert!(blocked("http://192.168.1.1/x.mp4"));
        assert!(blocked("http://169.254.169.254/latest/meta-data"));
        assert!(blocked("http://0.0.0.0/x.mp4"));
    }

    #[test]
    fn test_allows_non_private_172() {
        assert!(validate_download_url("http://172.32.0.1/x.mp4").is_ok());
        assert!(validate_download_url("http://172.15.0.1/x.mp4").is_ok());
    }

    #[test]
    fn test_blocks_ipv6_loopback_and_link_local() {
        assert!(blocked("http://[::1]/x.mp4"));
        assert!(blocked("http://[fe80::1]/x.mp4"));
        assert!(blocked("http://[::ffff:127.0.0.1]/x.mp4"));
    }

    #[test]
    fn test_blocks_non_http_schemes() {
        assert!(blocked("file:///etc/passwd"));
        assert!(blocked("ftp://example.com/x.mp4"));
    }
}
