//! HTTP retry helpers for transient errors.
//!
//! Feed requests go through [`send_json`] rather than calling
//! `reqwest::RequestBuilder::send()` directly, so every request gets
//! exponential backoff on timeouts, connection resets, rate limiting, and
//! server errors.

use std::time::Duration;

use reqwest::StatusCode;

use crate::IngestError;

/// Maximum number of attempts after the first one.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait before
/// giving up is 62 seconds.
const MAX_RETRIES: u32 = 5;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Accept,
    Retry,
    Fail,
}

/// 429 and 5xx are retried; every other 4xx (including 401) is permanent.
fn disposition(status: StatusCode) -> Disposition {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Disposition::Retry
    } else if status.is_client_error() {
        Disposition::Fail
    } else {
        Disposition::Accept
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

fn status_error(status: StatusCode, attempts: u32) -> IngestError {
    let message = if status == StatusCode::UNAUTHORIZED {
        "unauthorized, the feed token might not be correct".to_string()
    } else if attempts > 0 {
        format!("giving up after {attempts} retries")
    } else {
        "request rejected".to_string()
    };

    IngestError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// `build_request` is called on each attempt to construct a fresh
/// [`reqwest::RequestBuilder`], since builders are consumed by `.send()`.
///
/// # Errors
///
/// Returns [`IngestError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, IngestError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, MAX_RETRIES).await?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        IngestError::Json(e)
    })
}

/// Sends the request built by `build_request`, retrying on transient
/// errors up to `max_retries` times with exponential backoff.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, IngestError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(IngestError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                match disposition(status) {
                    Disposition::Accept => return Ok(response),
                    Disposition::Retry if attempt < max_retries => {
                        log::warn!("  HTTP {status}");
                        attempt += 1;
                    }
                    Disposition::Retry | Disposition::Fail => {
                        return Err(status_error(status, attempt));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_rate_limits_and_server_errors() {
        assert_eq!(disposition(StatusCode::TOO_MANY_REQUESTS), Disposition::Retry);
        assert_eq!(disposition(StatusCode::INTERNAL_SERVER_ERROR), Disposition::Retry);
        assert_eq!(disposition(StatusCode::BAD_GATEWAY), Disposition::Retry);
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(disposition(StatusCode::UNAUTHORIZED), Disposition::Fail);
        assert_eq!(disposition(StatusCode::NOT_FOUND), Disposition::Fail);
        assert_eq!(disposition(StatusCode::OK), Disposition::Accept);
    }

    #[test]
    fn unauthorized_mentions_the_token() {
        let err = status_error(StatusCode::UNAUTHORIZED, 0);
        assert!(err.to_string().contains("token"), "{err}");
        assert!(matches!(err, IngestError::Status { status: 401, .. }));
    }
}
