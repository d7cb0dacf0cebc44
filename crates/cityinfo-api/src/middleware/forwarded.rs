//! # Forwarded Headers
//!
//! Normalizes `X-Forwarded-For` and `X-Forwarded-Proto` into a
//! [`ForwardedInfo`] request extension. The last entry of each header is
//! the one added by the nearest proxy and is the one used.

use std::net::IpAddr;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Client address and scheme as reported by the nearest proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedInfo {
    /// Originating client address.
    pub client: Option<IpAddr>,
    /// Original request scheme, lowercased.
    pub scheme: Option<String>,
}

impl ForwardedInfo {
    /// Read the forwarding headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            client: last_entry(headers, &X_FORWARDED_FOR).and_then(parse_client),
            scheme: last_entry(headers, &X_FORWARDED_PROTO)
                .map(|s| s.to_ascii_lowercase())
                .filter(|s| s == "http" || s == "https"),
        }
    }
}

fn last_entry<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .last()
}

/// Accepts `1.2.3.4`, `1.2.3.4:5678`, `::1` and `[::1]:5678`.
fn parse_client(raw: &str) -> Option<IpAddr> {
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = raw.parse::<std::net::SocketAddr>() {
        return Some(addr.ip());
    }
    None
}

/// Attach [`ForwardedInfo`] to every request.
pub async fn forwarded_headers(mut request: Request, next: Next) -> Response {
    let info = ForwardedInfo::from_headers(request.headers());
    request.extensions_mut().insert(info);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn absent_headers() {
        assert_eq!(ForwardedInfo::from_headers(&HeaderMap::new()), ForwardedInfo::default());
    }

    #[test]
    fn nearest_proxy_entry_wins() {
        let info = ForwardedInfo::from_headers(&headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.2"),
            ("x-forwarded-proto", "HTTPS"),
        ]));
        assert_eq!(info.client, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(info.scheme.as_deref(), Some("https"));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let info = ForwardedInfo::from_headers(&headers(&[
            ("x-forwarded-for", "203.0.113.7"),
            ("x-forwarded-for", "[2001:db8::1]:443"),
        ]));
        assert_eq!(info.client, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn garbage_is_ignored() {
        let info = ForwardedInfo::from_headers(&headers(&[
            ("x-forwarded-for", "unknown"),
            ("x-forwarded-proto", "gopher"),
        ]));
        assert_eq!(info, ForwardedInfo::default());
    }
}
