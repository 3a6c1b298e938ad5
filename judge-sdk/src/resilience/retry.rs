//! Retry with exponential backoff for recoverable failures
//!
//! The policy only decides *whether* and *how long*; the caller owns the loop
//! and performs the sleep through its `Clock`, so the wait stays cancellable.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{FailureKind, ProviderError};

/// Retry budget and base delay for one failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Maximum number of retries after the first attempt (0 means none)
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,
}

impl KindPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub const fn never() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Per-kind budgets; kinds not listed are never retried
    pub policies: HashMap<FailureKind, KindPolicy>,

    /// Upper bound on any single delay, jitter included
    pub max_delay: Duration,

    /// Jitter is drawn from `[0, delay * jitter_factor)`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policies = HashMap::from([
            (FailureKind::Transient, KindPolicy::new(3, Duration::from_millis(200))),
            (FailureKind::ServerError, KindPolicy::new(3, Duration::from_millis(500))),
            (FailureKind::RateLimited, KindPolicy::new(5, Duration::from_secs(2))),
            (FailureKind::Timeout, KindPolicy::new(2, Duration::from_millis(500))),
            (FailureKind::Unknown, KindPolicy::new(1, Duration::from_secs(1))),
            (FailureKind::Authentication, KindPolicy::never()),
            (FailureKind::Validation, KindPolicy::never()),
        ]);

        Self {
            policies,
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Override the policy for one kind
    pub fn with_policy(mut self, kind: FailureKind, policy: KindPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    /// Policy for `kind`, or no retries when unset
    pub fn policy(&self, kind: FailureKind) -> KindPolicy {
        self.policies
            .get(&kind)
            .copied()
            .unwrap_or_else(KindPolicy::never)
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_delay: {:?}, jitter_factor: {}",
            self.max_delay, self.jitter_factor
        )?;
        for kind in FailureKind::ALL {
            let policy = self.policy(kind);
            write!(f, ", {}: {}x{:?}", kind, policy.max_retries, policy.base_delay)?;
        }
        write!(f, " }}")
    }
}

/// Outcome of consulting the retry policy after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try the same provider again
    Retry(Duration),
    /// Give up on this provider
    Stop,
}

/// Decides retry delays per failure kind
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the current retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Jitter-free delay for retry number `attempt` (0-based)
    pub fn base_delay(&self, kind: FailureKind, attempt: u32) -> Duration {
        let base = self.config.policy(kind).base_delay;
        let factor = 2u32.saturating_pow(attempt);
        base.checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Decide what to do after `attempt` retries have already been spent
    pub fn next_delay(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        let policy = self.config.policy(kind);
        if attempt >= policy.max_retries {
            return RetryDecision::Stop;
        }

        let delay = self.base_delay(kind, attempt);
        let delay = self.add_jitter(delay);
        debug!(kind = %kind, attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");
        RetryDecision::Retry(delay)
    }

    /// Like `next_delay`, but honours a provider `Retry-After` hint on rate limits
    pub fn next_delay_for(&self, error: &ProviderError, attempt: u32) -> RetryDecision {
        let kind = error.kind();
        match self.next_delay(kind, attempt) {
            RetryDecision::Retry(delay) if kind == FailureKind::RateLimited => {
                let hinted = error
                    .retry_after()
                    .map(|hint| hint.max(delay))
                    .unwrap_or(delay);
                RetryDecision::Retry(hinted.min(self.config.max_delay))
            }
            decision => decision,
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let upper = delay.as_secs_f64() * factor;
        let jitter = rand::thread_rng().gen_range(0.0..upper);
        (delay + Duration::from_secs_f64(jitter)).min(self.config.max_delay)
    }
}
