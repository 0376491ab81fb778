//! Throttled HTTP access for TMDB lookups and artwork downloads
//!
//! Every outbound request waits for a permit from a per-host budget. Failed
//! requests are retried with exponential backoff only when the failure is
//! transient (429, 408, 5xx, timeouts, refused connections).

use std::num::NonZeroU32;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single HTTP exchange
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("unreadable response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl RequestError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Body { .. } => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 429, 408 and server errors
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Sustained rate and burst allowance for one remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    pub per_second: u32,
    pub burst: u32,
}

impl RequestBudget {
    /// TMDB allows ~40 requests per 10 seconds
    pub const TMDB: Self = Self {
        per_second: 4,
        burst: 10,
    };

    /// image.tmdb.org is a CDN and tolerates a little more
    pub const ARTWORK: Self = Self {
        per_second: 5,
        burst: 10,
    };

    fn quota(self) -> Quota {
        Quota::per_second(NonZeroU32::new(self.per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN))
    }
}

/// HTTP client that waits for a budget permit before each request
pub struct ThrottledClient {
    http: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    host: &'static str,
}

impl ThrottledClient {
    pub fn tmdb() -> Self {
        Self::with_budget("tmdb", RequestBudget::TMDB)
    }

    pub fn artwork() -> Self {
        Self::with_budget("artwork", RequestBudget::ARTWORK)
    }

    pub fn with_budget(host: &'static str, budget: RequestBudget) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(host, error = %e, "Failed to build HTTP client, using defaults");
                Client::new()
            });

        Self {
            http,
            limiter: RateLimiter::direct(budget.quota()),
            host,
        }
    }

    /// GET `url` with query parameters. Non-success statuses other than 404
    /// are returned as [`RequestError::Status`]; a 404 response is passed through.
    pub async fn get<Q: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<Response, RequestError> {
        self.send(url, self.http.get(url).query(query)).await
    }

    /// Download a body, treating 404 as an error
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, RequestError> {
        let response = self.send(url, self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RequestError::Status {
                url: url.to_string(),
                status: StatusCode::NOT_FOUND,
            });
        }
        let bytes = response.bytes().await.map_err(|source| RequestError::Body {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, RequestError> {
        self.limiter.until_ready().await;
        debug!(host = self.host, url = %url, "GET");

        let response = request.send().await.map_err(|source| RequestError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(host = self.host, "Rate limited by remote host");
        }
        Err(RequestError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// How often and how patiently to repeat a transient failure
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn tmdb() -> Self {
        Self {
            attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
        }
    }

    pub fn artwork() -> Self {
        Self {
            attempts: 2,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `retryable`
/// rejects, or the policy runs out of attempts.
pub async fn retry_async<T, E, Fut, F, R>(
    operation: F,
    policy: &RetryPolicy,
    operation_name: &str,
    retryable: R,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !retryable(&error) {
            debug!(operation = %operation_name, error = %error, "Not retrying");
            return Err(error);
        }
        if attempt >= policy.attempts {
            warn!(operation = %operation_name, attempts = attempt, error = %error, "Giving up");
            return Err(error);
        }
        let Some(delay) = backoff.next_backoff() else {
            return Err(error);
        };

        warn!(
            operation = %operation_name,
            attempt,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
        }
    }

    fn status_error(status: StatusCode) -> RequestError {
        RequestError::Status {
            url: "https://api.themoviedb.org/3/movie/949".to_string(),
            status,
        }
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_non_transient_error_is_attempted_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RequestError> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_error(StatusCode::UNAUTHORIZED)) }
            },
            &quick_policy(3),
            "get_movie",
            RequestError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap_err().status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_async(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if call < 3 {
                        Err(status_error(StatusCode::SERVICE_UNAVAILABLE))
                    } else {
                        Ok(call)
                    }
                }
            },
            &quick_policy(3),
            "search_movie",
            RequestError::is_transient,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transient_error_stops_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RequestError> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_error(StatusCode::TOO_MANY_REQUESTS)) }
            },
            &quick_policy(2),
            "search_tv",
            RequestError::is_transient,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
