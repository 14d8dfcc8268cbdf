use crate::api::error::AppError;
use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use chrono::Utc;
use serde::Serialize;

const EXPIRED: &str = "Mon, 26 Jul 1997 05:00:00 GMT";

/// Serializes `result` as the JSON answer to an upload request, with headers
/// that keep proxies and browsers from caching it.
pub fn no_cache_json<T: Serialize>(result: &T) -> Result<Response, AppError> {
    let body = serde_json::to_vec(result)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))?;

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRED));
    if let Ok(now) = HeaderValue::from_str(&http_date_now()) {
        headers.insert(header::LAST_MODIFIED, now);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.append(
        header::CACHE_CONTROL,
        HeaderValue::from_static("post-check=0, pre-check=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}

fn http_date_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
