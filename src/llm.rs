//! Hosted model providers: chat completion and image generation.

pub mod client;
pub mod image;
pub mod retry;

pub use client::CompletionClient;
pub use image::ImageClient;
pub use retry::RetryPolicy;

use crate::error::ApiError;

use anyhow::Context as _;
use std::time::Duration;

/// Longest response body excerpt kept in errors and logs.
const ERROR_BODY_LIMIT: usize = 500;

/// Build the process-wide HTTP client shared by every provider.
///
/// Deadlines are applied per request, so providers can use different ones.
pub fn build_http_client() -> crate::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("overmind/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    Ok(client)
}

/// Map a transport-level reqwest failure onto the provider error taxonomy.
pub(crate) fn classify_request_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(error.to_string())
    }
}

/// Read a provider response, turning non-200 statuses and non-JSON bodies into errors.
pub(crate) async fn read_json_response(
    response: reqwest::Response,
) -> Result<serde_json::Value, ApiError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(response.headers());
        return Err(ApiError::RateLimited { retry_after });
    }

    let body = response.text().await.map_err(classify_request_error)?;

    if status != reqwest::StatusCode::OK {
        return Err(ApiError::Upstream {
            status: status.as_u16(),
            body: truncate_body(&body).to_string(),
        });
    }

    serde_json::from_str(&body).map_err(|error| {
        ApiError::MalformedResponse(format!(
            "response is not valid JSON: {error}; body: {}",
            truncate_body(&body)
        ))
    })
}

/// `Retry-After` as delta-seconds. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds: f64 = raw.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        // Saturate; the retry policy caps the actual wait.
        Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

/// Truncate a response body to avoid dumping megabytes of HTML into logs.
pub(crate) fn truncate_body(body: &str) -> &str {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn parses_delta_seconds_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));
    }

    #[test]
    fn oversized_retry_after_saturates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("99999999999999999999"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::MAX));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1e20"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::MAX));
    }

    #[test]
    fn ignores_http_date_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "Ψ".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.len() <= ERROR_BODY_LIMIT);
        assert!(truncated.chars().all(|c| c == 'Ψ'));
        assert_eq!(truncate_body("short"), "short");
    }
}
