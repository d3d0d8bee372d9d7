//! Request inspection helpers.
//!
//! # Responsibilities
//! - Classify upgrade requests
//! - Extract routing-relevant information (referer path, host, cookies)
//! - Read the request ID set by middleware
//! - Rebuild the path sent to a backend
//!
//! # Design Decisions
//! - An unparseable referer is ignored, never fatal
//! - Cookies are forwarded verbatim and in their original order

use axum::http::{header, HeaderMap, HeaderValue};
use url::Url;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The request ID assigned by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// True when the `Connection` header carries the `upgrade` token.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Path component of the `Referer` header, if present and parseable.
pub fn referer_path(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::REFERER)?.to_str().ok()?;
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url.path().to_string()),
        Err(e) => {
            tracing::warn!(referer = %raw, error = %e, "Ignoring unparseable referer");
            None
        }
    }
}

/// Host the client used to reach the proxy.
pub fn public_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

/// Append the original query string to a cleaned path.
pub fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}

/// All `Cookie` headers folded into one value, order preserved.
pub fn forwarded_cookies(headers: &HeaderMap) -> Option<HeaderValue> {
    let values: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return None;
    }
    HeaderValue::from_str(&values.join("; ")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_upgrade_detection() {
        assert!(is_upgrade_request(&headers(&[(header::CONNECTION, "Upgrade")])));
        assert!(is_upgrade_request(&headers(&[(header::CONNECTION, "keep-alive, upgrade")])));
        assert!(!is_upgrade_request(&headers(&[(header::CONNECTION, "keep-alive")])));
        assert!(!is_upgrade_request(&HeaderMap::new()));
    }

    #[test]
    fn test_referer_path() {
        let h = headers(&[(header::REFERER, "http://localhost/project1")]);
        assert_eq!(referer_path(&h).as_deref(), Some("/project1"));

        let h = headers(&[(header::REFERER, "https://dev.example.com/a/b/?folder=x")]);
        assert_eq!(referer_path(&h).as_deref(), Some("/a/b/"));

        let h = headers(&[(header::REFERER, "::not a url::")]);
        assert_eq!(referer_path(&h), None);

        assert_eq!(referer_path(&HeaderMap::new()), None);
    }

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("/a", Some("x=1&y=2")), "/a?x=1&y=2");
        assert_eq!(with_query("/a", Some("")), "/a");
        assert_eq!(with_query("/a", None), "/a");
    }

    #[test]
    fn test_cookies_keep_order() {
        let h = headers(&[
            (header::COOKIE, "key=abc; theme=dark"),
            (header::COOKIE, "session=\"q=1\""),
        ]);
        assert_eq!(
            forwarded_cookies(&h).unwrap(),
            "key=abc; theme=dark; session=\"q=1\""
        );
        assert_eq!(forwarded_cookies(&HeaderMap::new()), None);
    }

    #[test]
    fn test_request_id() {
        let mut h = HeaderMap::new();
        h.insert(X_REQUEST_ID, HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&h), "req-42");
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_public_host() {
        let h = headers(&[(header::HOST, "dev.example.com")]);
        assert_eq!(public_host(&h), "dev.example.com");
        assert_eq!(public_host(&HeaderMap::new()), "localhost");
    }
}
