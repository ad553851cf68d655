//! Conditional GET with retry and backoff.
//!
//! `ConditionalFetcher` is shared by the content and flag pipelines. It is
//! parameterized per call by URL, prior validator and payload type, and
//! never touches any cache itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::transport::{HttpResponse, HttpTransport};
use super::FetchError;
use crate::models::decode_document;

/// Total attempts for one fetch, first try included.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles after every failed attempt.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Result of one conditional fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The server answered 304 for our validator.
    Unchanged,
    /// A fresh payload and the validator that identifies it, if any.
    Fetched { payload: T, validator: Option<String> },
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Shared online/offline switch consulted before any request.
/// Clones observe the same state.
#[derive(Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl fmt::Debug for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connectivity")
            .field("online", &self.is_online())
            .finish()
    }
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn go_offline(&self) {
        self.online.store(false, Ordering::Release);
    }

    pub fn go_online(&self) {
        self.online.store(true, Ordering::Release);
    }
}

/// Clone is cheap; clones share the transport and connectivity switch.
#[derive(Clone)]
pub struct ConditionalFetcher {
    transport: Arc<dyn HttpTransport>,
    connectivity: Connectivity,
    policy: RetryPolicy,
    enabled: bool,
}

impl ConditionalFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, connectivity: Connectivity) -> Self {
        Self {
            transport,
            connectivity,
            policy: RetryPolicy::default(),
            enabled: true,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Master switch; a disabled fetcher fails every call without I/O.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// GET `url`, sending `prior_validator` as `If-None-Match` when present.
    ///
    /// 304 returns `Unchanged` straight away. Transient failures are retried
    /// up to the policy's attempt limit; status and parse errors end the
    /// fetch on the spot.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        prior_validator: Option<&str>,
    ) -> FetchOutcome<T> {
        if !self.enabled {
            debug!(url = url, "Remote fetch disabled");
            return FetchOutcome::Failed(FetchError::Disabled);
        }
        if !self.connectivity.is_online() {
            debug!(url = url, "No connectivity, skipping fetch");
            return FetchOutcome::Failed(FetchError::Offline);
        }

        let validator = prior_validator.filter(|v| !v.trim().is_empty());
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = url, attempt = attempt, max_attempts = max_attempts, "Fetching");

            let result = match self.transport.get(url, validator).await {
                Ok(response) => Self::classify(response, validator),
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => return outcome,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.policy.backoff_after(attempt);
                    warn!(
                        url = url,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(url = url, attempt = attempt, error = %e, "Fetch failed");
                    return FetchOutcome::Failed(e);
                }
            }
        }
    }

    fn classify<T: DeserializeOwned>(
        response: HttpResponse,
        sent_validator: Option<&str>,
    ) -> Result<FetchOutcome<T>, FetchError> {
        if response.status == StatusCode::NOT_MODIFIED.as_u16() {
            debug!(validator = ?sent_validator, "Not modified (304)");
            return Ok(FetchOutcome::Unchanged);
        }

        if !(200..300).contains(&response.status) {
            return Err(FetchError::from_status(response.status, &response.body));
        }

        let payload = decode_document(&response.body)?;
        Ok(FetchOutcome::Fetched {
            payload,
            validator: response.validator,
        })
    }
}
