//! Proxy leasing and per-site request pacing.
//!
//! Every outbound request first acquires a [`ProxyHandle`] from the
//! [`ProxyPool`]. Acquisition waits for the site's pacing slot (a minimum
//! interval between requests to the same site, tracked independently per
//! site) and then leases the least-recently-used healthy proxy.
//!
//! # Proxy health
//!
//! ```text
//! HEALTHY --[failure_threshold consecutive failures]--> QUARANTINED
//!    ^                                                      |
//!    +-------------------[cooldown elapsed]-----------------+
//! ```
//!
//! A success resets the consecutive-failure counter. When every proxy is
//! quarantined, [`ProxyPool::acquire`] fails with [`AppError::PoolExhausted`].
//! The direct connection used when no proxy is configured is never
//! quarantined; pacing and fetcher backoff still apply to it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use url::Url;

use crate::error::AppError;
use crate::models::Source;
use crate::util::rand_jitter_ms;

/// A proxy endpoint, or a direct connection when no proxy is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    url: Option<String>,
}

impl ProxyEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }

    pub fn direct() -> Self {
        Self { url: None }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_direct(&self) -> bool {
        self.url.is_none()
    }
}

impl fmt::Display for ProxyEndpoint {
    /// Credentials are never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            None => f.write_str("direct"),
            Some(raw) => match Url::parse(raw) {
                Ok(mut url) => {
                    let _ = url.set_username("");
                    let _ = url.set_password(None);
                    write!(f, "{url}")
                }
                Err(_) => f.write_str("<invalid proxy url>"),
            },
        }
    }
}

/// Configuration for pacing and proxy quarantine.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Minimum delay between consecutive requests to the same site.
    pub min_interval: Duration,

    /// Maximum random jitter added on top of `min_interval` (uniform [0, jitter]).
    pub jitter: Duration,

    /// Consecutive failures after which a proxy is quarantined.
    pub failure_threshold: u32,

    /// How long a quarantined proxy stays out of rotation.
    pub cooldown: Duration,
}

impl ProxyPoolConfig {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_quarantine(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.failure_threshold = failure_threshold.max(1);
        self.cooldown = cooldown;
        self
    }

    /// Compute the effective spacing for a single request (interval + random jitter).
    fn effective_interval(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_interval;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.min_interval + Duration::from_millis(jitter_ms)
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            jitter: Duration::from_millis(250),
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// How a leased proxy fared on its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    Failure,
    Blocked,
}

/// A proxy leased for exactly one request. Return it with [`ProxyPool::release`].
#[derive(Debug)]
pub struct ProxyHandle {
    slot: usize,
    endpoint: ProxyEndpoint,
    site: Source,
}

impl ProxyHandle {
    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }

    pub fn site(&self) -> Source {
        self.site
    }
}

#[derive(Debug)]
struct ProxySlot {
    endpoint: ProxyEndpoint,
    consecutive_failures: u32,
    last_used: Option<Instant>,
    quarantined_until: Option<Instant>,
}

impl ProxySlot {
    fn new(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint,
            consecutive_failures: 0,
            last_used: None,
            quarantined_until: None,
        }
    }
}

/// Snapshot of pool health for logging and summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub quarantined: usize,
}

/// Thread-safe pool of proxies shared by every crawl run.
#[derive(Clone)]
pub struct ProxyPool {
    config: ProxyPoolConfig,
    slots: Arc<Mutex<Vec<ProxySlot>>>,
    /// Earliest time the next request to each site may start.
    next_slot: Arc<tokio::sync::Mutex<HashMap<Source, tokio::time::Instant>>>,
}

impl ProxyPool {
    /// Build a pool over `endpoints`. An empty list yields a single direct
    /// connection so pacing still applies.
    pub fn new(endpoints: Vec<ProxyEndpoint>, config: ProxyPoolConfig) -> Self {
        let endpoints = if endpoints.is_empty() {
            vec![ProxyEndpoint::direct()]
        } else {
            endpoints
        };
        Self {
            config,
            slots: Arc::new(Mutex::new(
                endpoints.into_iter().map(ProxySlot::new).collect(),
            )),
            next_slot: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub fn direct(config: ProxyPoolConfig) -> Self {
        Self::new(Vec::new(), config)
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Acquires the slots lock, recovering from poison if necessary.
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<ProxySlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned proxy pool mutex");
            poisoned.into_inner()
        })
    }

    /// Wait for a pacing slot on `site`, then lease the least-recently-used
    /// healthy proxy.
    pub async fn acquire(&self, site: Source) -> Result<ProxyHandle, AppError> {
        self.wait_for_site(site).await;
        self.select(site)
    }

    /// Return a leased proxy and record how its request went.
    pub fn release(&self, handle: ProxyHandle, outcome: ProxyOutcome) {
        let mut slots = self.lock_slots();
        let Some(slot) = slots.get_mut(handle.slot) else {
            return;
        };

        match outcome {
            ProxyOutcome::Success => {
                slot.consecutive_failures = 0;
            }
            ProxyOutcome::Failure | ProxyOutcome::Blocked => {
                slot.consecutive_failures += 1;
                if slot.endpoint.is_direct() {
                    tracing::debug!(
                        site = %handle.site,
                        failures = slot.consecutive_failures,
                        ?outcome,
                        "Direct connection failed"
                    );
                } else if slot.consecutive_failures >= self.config.failure_threshold
                    && slot.quarantined_until.is_none()
                {
                    tracing::warn!(
                        proxy = %slot.endpoint,
                        site = %handle.site,
                        failures = slot.consecutive_failures,
                        ?outcome,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Quarantining proxy"
                    );
                    slot.quarantined_until = Some(Instant::now() + self.config.cooldown);
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.lock_slots();
        let now = Instant::now();
        PoolStats {
            total: slots.len(),
            quarantined: slots
                .iter()
                .filter(|s| s.quarantined_until.is_some_and(|until| until > now))
                .count(),
        }
    }

    /// Reserve the next pacing slot for `site` and sleep until it starts.
    ///
    /// Reservation happens under the lock, the sleep does not, so other
    /// sites are never held up by a slow one.
    async fn wait_for_site(&self, site: Source) {
        let now = tokio::time::Instant::now();
        let start_at = {
            let mut next_slot = self.next_slot.lock().await;
            let start_at = match next_slot.get(&site) {
                Some(&at) if at > now => at,
                _ => now,
            };
            next_slot.insert(site, start_at + self.config.effective_interval());
            start_at
        };

        if start_at > now {
            tracing::debug!(
                %site,
                sleep_ms = %(start_at - now).as_millis(),
                "Pacing request"
            );
            tokio::time::sleep_until(start_at).await;
        }
    }

    fn select(&self, site: Source) -> Result<ProxyHandle, AppError> {
        let mut slots = self.lock_slots();
        let now = Instant::now();

        for slot in slots.iter_mut() {
            if slot.quarantined_until.is_some_and(|until| until <= now) {
                tracing::info!(proxy = %slot.endpoint, "Proxy cooldown elapsed, back in rotation");
                slot.quarantined_until = None;
                slot.consecutive_failures = 0;
            }
        }

        // `None` sorts before `Some`, so never-used proxies go first.
        let chosen = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.quarantined_until.is_none())
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(index, _)| index);

        match chosen {
            Some(index) => {
                let slot = &mut slots[index];
                slot.last_used = Some(now);
                tracing::debug!(proxy = %slot.endpoint, %site, "Leased proxy");
                Ok(ProxyHandle {
                    slot: index,
                    endpoint: slot.endpoint.clone(),
                    site,
                })
            }
            None => {
                let retry_after = slots
                    .iter()
                    .filter_map(|slot| slot.quarantined_until)
                    .min()
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or(self.config.cooldown);
                tracing::error!(
                    %site,
                    proxies = slots.len(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "All proxies quarantined"
                );
                Err(AppError::PoolExhausted { retry_after })
            }
        }
    }
}
