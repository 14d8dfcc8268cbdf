use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Session key of the client, used to namespace its temporary directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionKey(pub Option<String>);

/// Resolves the session key from the configured cookie, falling back to an
/// `x-session-id` header, and attaches it to the request extensions.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let key = session_from_headers(req.headers(), &state.config.session_cookie);
    req.extensions_mut().insert(SessionKey(key));
    next.run(req).await
}

pub fn session_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get("x-session-id")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; session_id=abc123; lang=en"),
        );
        assert_eq!(
            session_from_headers(&headers, "session_id"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_session_header_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark"));
        headers.insert("x-session-id", HeaderValue::from_static("xyz"));
        assert_eq!(
            session_from_headers(&headers, "session_id"),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn test_session_missing() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("session_id="));
        assert_eq!(session_from_headers(&headers, "session_id"), None);
    }
}
