//! Retrying, proxy-aware page fetcher.
//!
//! Wraps a [`Transport`] with the [`ProxyPool`] and a retry policy. Each
//! attempt leases a fresh proxy, classifies the answer into a
//! [`FetchResult`] and returns the proxy with the matching outcome.
//!
//! | Result           | Policy                                            |
//! |------------------|---------------------------------------------------|
//! | `RateLimited`    | backoff + retry up to `max_attempts`              |
//! | `Timeout`        | backoff + retry up to `max_attempts`              |
//! | `NetworkError`   | backoff + retry up to `max_attempts`              |
//! | `Blocked`        | one immediate retry on another proxy, then report |
//! | `HttpStatus`     | reported as-is                                    |

use std::time::Duration;

use crate::error::AppError;
use crate::models::FetchRequest;
use crate::proxy_pool::{ProxyOutcome, ProxyPool};
use crate::traits::{SiteAdapter, Transport};
use crate::util::rand_jitter_ms;

/// Classified outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// 2xx with a non-empty body.
    Ok { body: String, status: u16 },
    /// HTTP 429.
    RateLimited,
    /// The adapter recognized an anti-bot challenge.
    Blocked,
    /// Connection failure, 5xx or empty body.
    NetworkError(String),
    Timeout,
    /// Any other non-2xx status (404, 410, ...). Never retried.
    HttpStatus(u16),
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchResult::Ok { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchResult::Ok { .. } => "ok",
            FetchResult::RateLimited => "rate_limited",
            FetchResult::Blocked => "blocked",
            FetchResult::NetworkError(_) => "network_error",
            FetchResult::Timeout => "timeout",
            FetchResult::HttpStatus(_) => "http_status",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchResult::RateLimited | FetchResult::Timeout | FetchResult::NetworkError(_)
        )
    }

    fn proxy_outcome(&self) -> ProxyOutcome {
        match self {
            FetchResult::Ok { .. } | FetchResult::HttpStatus(_) => ProxyOutcome::Success,
            FetchResult::Blocked => ProxyOutcome::Blocked,
            FetchResult::RateLimited | FetchResult::Timeout | FetchResult::NetworkError(_) => {
                ProxyOutcome::Failure
            }
        }
    }
}

/// Retry configuration with exponential backoff and jitter.
///
/// Delay before attempt `n + 1`: `base_delay * 2^(n - 1)`, capped at
/// `max_delay`, plus uniform jitter in `[0, jitter)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per fetch, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after the given failed attempt (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        backoff + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

/// Executes fetch requests with proxy rotation and retries.
#[derive(Clone)]
pub struct Fetcher<T: Transport> {
    transport: T,
    pool: ProxyPool,
    policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, pool: ProxyPool, policy: RetryPolicy) -> Self {
        Self {
            transport,
            pool,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `request`, retrying per the policy.
    ///
    /// Only fails with [`AppError::PoolExhausted`]; every scraping condition
    /// is reported through the returned [`FetchResult`]. When retries run out,
    /// the last classified result is returned.
    pub async fn fetch<A: SiteAdapter>(
        &self,
        adapter: &A,
        request: &FetchRequest,
    ) -> Result<FetchResult, AppError> {
        let mut attempt = 1;
        let mut retried_block = false;

        loop {
            let handle = self.pool.acquire(request.site).await?;
            let mut attempt_request = request.clone();
            attempt_request.attempt = attempt;
            attempt_request.proxy = Some(handle.endpoint().clone());

            tracing::debug!(
                url = %request.url,
                site = %request.site,
                proxy = %handle.endpoint(),
                attempt,
                max_attempts = self.policy.max_attempts,
                "HTTP request"
            );

            let result = classify(adapter, self.transport.send(&attempt_request).await);
            self.pool.release(handle, result.proxy_outcome());

            match &result {
                FetchResult::Ok { .. } | FetchResult::HttpStatus(_) => return Ok(result),
                FetchResult::Blocked => {
                    if retried_block || attempt >= self.policy.max_attempts {
                        tracing::warn!(url = %request.url, site = %request.site, attempt, "Blocked by site");
                        return Ok(result);
                    }
                    tracing::info!(url = %request.url, "Blocked, retrying once on another proxy");
                    retried_block = true;
                }
                _ if result.is_retryable() => {
                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(
                            url = %request.url,
                            kind = result.kind(),
                            attempts = attempt,
                            "Giving up after retries"
                        );
                        return Ok(result);
                    }
                    let delay = self.policy.delay_for(attempt);
                    tracing::debug!(
                        url = %request.url,
                        kind = result.kind(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return Ok(result),
            }

            attempt += 1;
        }
    }
}

/// Turn a transport answer into a [`FetchResult`]. Never maps a non-2xx
/// status to `Ok`.
fn classify<A: SiteAdapter>(
    adapter: &A,
    response: Result<crate::models::RawResponse, AppError>,
) -> FetchResult {
    let response = match response {
        Ok(response) => response,
        Err(AppError::Timeout(_)) => return FetchResult::Timeout,
        Err(AppError::RateLimited) => return FetchResult::RateLimited,
        Err(AppError::Blocked(_)) => return FetchResult::Blocked,
        Err(e) => return FetchResult::NetworkError(e.to_string()),
    };

    let status = response.status;
    if status == 429 {
        FetchResult::RateLimited
    } else if adapter.is_blocked(status, &response.body) {
        FetchResult::Blocked
    } else if (200..300).contains(&status) {
        if response.body.trim().is_empty() {
            FetchResult::NetworkError(format!("HTTP {status} with empty body"))
        } else {
            FetchResult::Ok {
                body: response.body,
                status,
            }
        }
    } else if status >= 500 {
        FetchResult::NetworkError(format!("HTTP {status}"))
    } else {
        FetchResult::HttpStatus(status)
    }
}
