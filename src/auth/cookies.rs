//! Reading request cookies and rendering `Set-Cookie` headers.

use chrono::{Duration, Utc};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tracing::warn;

/// Find the value of cookie `name` in the request's `Cookie` headers.
///
/// Empty values are treated as absent.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// A cookie the pipeline wants written to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age_seconds: i64,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            max_age_seconds,
        }
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// `Expires` is left out when the max-age doesn't fit a calendar date.
    pub fn to_header_value(&self) -> String {
        let mut rendered = format!(
            "{}={}; Path={}; Max-Age={}",
            self.name, self.value, self.path, self.max_age_seconds
        );
        let expires = Duration::try_seconds(self.max_age_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        if let Some(expires) = expires {
            rendered.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        rendered
    }
}

/// Append the cookies to the response headers.
pub fn apply_cookies(cookies: &[ResponseCookie], response: &mut HeaderMap) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_header_value()) {
            Ok(value) => {
                response.append(SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = %cookie.name, "skipping unrenderable cookie: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; jwt_token=abc.def.ghi"));
        headers.append(COOKIE, HeaderValue::from_static("xsrf_token=zzz"));

        assert_eq!(cookie_value(&headers, "jwt_token").as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, "xsrf_token").as_deref(), Some("zzz"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_value_ignores_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("jwt_token="));
        assert_eq!(cookie_value(&headers, "jwt_token"), None);
    }

    #[test]
    fn test_cookie_name_is_exact() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("my_jwt_token=nope"));
        assert_eq!(cookie_value(&headers, "jwt_token"), None);
    }

    #[test]
    fn test_apply_cookies_renders_set_cookie() {
        let mut response = HeaderMap::new();
        apply_cookies(&[ResponseCookie::new("xsrf_token", "tok", 1800)], &mut response);

        let rendered = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(rendered.starts_with("xsrf_token=tok; Path=/; Max-Age=1800; Expires="));
        assert!(rendered.ends_with(" GMT"));
    }

    #[test]
    fn test_huge_max_age_drops_expires() {
        let rendered = ResponseCookie::new("xsrf_token", "tok", i64::MAX).to_header_value();
        assert_eq!(
            rendered,
            format!("xsrf_token=tok; Path=/; Max-Age={}", i64::MAX)
        );
    }
}
