//! Provider fallback coordination
//!
//! The coordinator walks providers in priority order. Each attempt is gated by
//! the provider's circuit breaker, bounded by the timeout guard and followed by
//! a retry decision. When nothing answers it falls back to the degraded cache,
//! and failing that to an explicit "unavailable" response. It never makes up
//! a reply.

pub mod cache;

pub use cache::{DegradedCache, MemoryCache};

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::JudgeConfig;
use crate::core::{JudgeProvider, JudgeRequest, RawReply};
use crate::error::{JudgeError, Result};
use crate::resilience::{
    run_with_timeout, CallOutcome, CircuitBreakerConfig, CircuitState, Clock, GuardError,
    ProviderBreaker, ProviderHealth, RetryDecision, RetryPolicy,
};
use crate::services::build_provider;

/// Where a response came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ServedBy {
    /// A live provider, by name
    Provider(String),
    /// Replayed from the degraded cache
    Cache,
    /// Nothing could serve the request
    None,
}

impl fmt::Display for ServedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServedBy::Provider(name) => write!(f, "{}", name),
            ServedBy::Cache => write!(f, "cache"),
            ServedBy::None => write!(f, "none"),
        }
    }
}

/// Result of a coordinated call
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResponse<T> {
    /// `None` only for the unavailable placeholder
    pub payload: Option<T>,
    pub served_by: ServedBy,
    /// 1.0 for live replies, the degraded factor for cache replays, 0 when unavailable
    pub confidence: f64,
    pub degraded: bool,
}

impl<T> FallbackResponse<T> {
    /// Placeholder for "no provider and no cache could serve this"
    pub fn unavailable() -> Self {
        Self {
            payload: None,
            served_by: ServedBy::None,
            confidence: 0.0,
            degraded: true,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.payload.is_none()
    }
}

/// A provider together with its breaker
#[derive(Clone)]
pub struct ProviderEntry {
    pub name: String,
    pub provider: Arc<dyn JudgeProvider>,
    pub breaker: Arc<ProviderBreaker>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("state", &self.breaker.state())
            .finish()
    }
}

/// Stable key for caching the reply to `request` within this process
pub fn cache_key(request: &JudgeRequest) -> String {
    let mut hasher = DefaultHasher::new();
    for message in &request.messages {
        message.role.hash(&mut hasher);
        message.content.hash(&mut hasher);
    }
    request.parameters.model.hash(&mut hasher);
    request.parameters.max_tokens.hash(&mut hasher);
    request.parameters.temperature.to_bits().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Routes judge calls across providers with retry, breaking and degradation
pub struct FallbackCoordinator {
    providers: Vec<ProviderEntry>,
    retry: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    request_timeout: Duration,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<dyn DegradedCache>>,
    cache_ttl: Duration,
    degraded_confidence: f64,
}

impl fmt::Debug for FallbackCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCoordinator")
            .field("providers", &self.providers)
            .field("retry", &self.retry)
            .field("breaker_config", &self.breaker_config)
            .field("request_timeout", &self.request_timeout)
            .field("cache", &self.cache.is_some())
            .field("degraded_confidence", &self.degraded_confidence)
            .finish()
    }
}

impl FallbackCoordinator {
    /// Create a coordinator with no providers yet
    pub fn new(
        retry: RetryPolicy,
        breaker_config: CircuitBreakerConfig,
        request_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers: Vec::new(),
            retry,
            breaker_config,
            request_timeout,
            clock,
            cache: None,
            cache_ttl: Duration::from_secs(3600),
            degraded_confidence: 0.5,
        }
    }

    /// Build every configured provider, in priority order
    pub fn from_config(config: &JudgeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut coordinator = Self::new(
            RetryPolicy::new(config.retry.clone()),
            config.breaker.clone(),
            config.request_timeout,
            Arc::clone(&clock),
        )
        .with_degraded_confidence(config.degraded_confidence);

        for provider_config in &config.providers {
            let name = provider_config.name.clone();
            coordinator = coordinator.with_provider(name, build_provider(provider_config.clone())?);
        }

        if config.cache_enabled {
            coordinator = coordinator.with_cache(
                Arc::new(MemoryCache::with_clock(1000, Arc::clone(&clock))),
                config.cache_ttl,
            );
        }

        Ok(coordinator)
    }

    /// Append a provider at the lowest priority
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn JudgeProvider>) -> Self {
        let name = name.into();
        let breaker = Arc::new(ProviderBreaker::new(
            name.clone(),
            self.breaker_config.clone(),
            Arc::clone(&self.clock),
        ));
        self.providers.push(ProviderEntry {
            name,
            provider,
            breaker,
        });
        self
    }

    /// Keep successful replies for degraded replay
    pub fn with_cache(mut self, cache: Arc<dyn DegradedCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn with_degraded_confidence(mut self, confidence: f64) -> Self {
        self.degraded_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn degraded_confidence(&self) -> f64 {
        self.degraded_confidence
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|entry| entry.name.clone()).collect()
    }

    /// Snapshot of every provider's breaker
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.providers
            .iter()
            .map(|entry| entry.breaker.health())
            .collect()
    }

    /// Serve `request` from the first provider that can, else degrade
    ///
    /// Fatal provider failures and cancellation are returned as errors; every
    /// other failure is absorbed into retries, failover or degradation.
    pub async fn execute(
        &self,
        request: JudgeRequest,
        cache_key: &str,
        cancel: &CancellationToken,
    ) -> Result<FallbackResponse<RawReply>> {
        for entry in &self.providers {
            if let Some(reply) = self.try_provider(entry, &request, cancel).await? {
                self.remember(cache_key, &reply).await;
                return Ok(FallbackResponse {
                    served_by: ServedBy::Provider(entry.name.clone()),
                    payload: Some(reply),
                    confidence: 1.0,
                    degraded: false,
                });
            }
        }

        Ok(self.degrade(cache_key).await)
    }

    /// Run attempts against one provider until it answers or gives up
    async fn try_provider(
        &self,
        entry: &ProviderEntry,
        request: &JudgeRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawReply>> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(JudgeError::Cancelled);
            }

            let permit = match entry.breaker.try_acquire() {
                Some(permit) => permit,
                None => {
                    debug!(provider = %entry.name, "Provider unavailable, trying next");
                    return Ok(None);
                }
            };

            let provider = Arc::clone(&entry.provider);
            let call = request.clone();
            let outcome = run_with_timeout(
                async move { provider.invoke(call).await },
                self.request_timeout,
                cancel,
                self.clock.as_ref(),
            )
            .await;

            let err = match outcome {
                Ok(reply) => {
                    permit.record(CallOutcome::Success);
                    debug!(provider = %entry.name, attempt, "Provider call succeeded");
                    return Ok(Some(reply));
                }
                Err(GuardError::Cancelled) => {
                    permit.record(CallOutcome::Ignored);
                    return Err(JudgeError::Cancelled);
                }
                Err(GuardError::Failed(err)) => err,
            };

            let kind = err.kind();
            permit.record(if kind.trips_breaker() {
                CallOutcome::Failure
            } else {
                CallOutcome::Ignored
            });
            warn!(provider = %entry.name, attempt, kind = %kind, error = %err, "Provider call failed");

            if kind.is_fatal() {
                return Err(JudgeError::fatal(kind, entry.name.clone(), &err));
            }

            if entry.breaker.state() == CircuitState::Open {
                info!(provider = %entry.name, attempts = attempt + 1, "Circuit opened, failing over");
                return Ok(None);
            }

            match self.retry.next_delay_for(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    debug!(
                        provider = %entry.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::select! {
                        _ = self.clock.sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(JudgeError::Cancelled),
                    }
                    attempt += 1;
                }
                RetryDecision::Stop => {
                    info!(provider = %entry.name, attempts = attempt + 1, "Retries exhausted, failing over");
                    return Ok(None);
                }
            }
        }
    }

    async fn remember(&self, cache_key: &str, reply: &RawReply) {
        let Some(cache) = &self.cache else {
            return;
        };
        match serde_json::to_string(reply) {
            Ok(value) => cache.put(cache_key.to_string(), value, self.cache_ttl).await,
            Err(e) => warn!(error = %e, "Failed to serialise reply for degraded cache"),
        }
    }

    async fn degrade(&self, cache_key: &str) -> FallbackResponse<RawReply> {
        let cached = match &self.cache {
            Some(cache) => cache.get(cache_key).await,
            None => None,
        };

        match cached {
            Some(value) => {
                let reply = serde_json::from_str::<RawReply>(&value)
                    .unwrap_or_else(|_| RawReply::new(value, "cache"));
                warn!(original_provider = %reply.provider, "All providers unavailable, serving cached reply");
                FallbackResponse {
                    payload: Some(reply),
                    served_by: ServedBy::Cache,
                    confidence: self.degraded_confidence,
                    degraded: true,
                }
            }
            None => {
                warn!(providers = ?self.provider_names(), "All providers unavailable and nothing cached");
                FallbackResponse::unavailable()
            }
        }
    }

    /// Release every provider
    pub async fn close(&self) {
        for entry in &self.providers {
            entry.provider.close().await;
        }
    }
}
