//! Per-provider circuit breaker
//!
//! Each provider gets its own breaker behind its own mutex. Callers acquire a
//! `ProviderPermit` before every attempt and resolve it with the attempt's
//! outcome; the permit is what enforces the single half-open trial.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::clock::Clock;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Failures further apart than this restart the count
    pub failure_window: Duration,

    /// How long the circuit stays open before admitting a trial call
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
        }
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,

    /// Circuit is open, rejecting requests
    Open,

    /// Circuit is half-open, admitting a single trial request
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// How an attempt made under a permit turned out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// A failure that counts against the provider
    Failure,
    /// A failure that says nothing about provider health
    Ignored,
}

/// Snapshot of one provider's health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    last_opened_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one provider
pub struct ProviderBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl fmt::Debug for ProviderBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.lock())
            .finish()
    }
}

impl ProviderBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
                last_opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current circuit state, without side effects
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask to make one call; `None` means fail fast and move on
    pub fn try_acquire(self: &Arc<Self>) -> Option<ProviderPermit> {
        let mut guard = self.lock();
        match guard.state {
            CircuitState::Closed => Some(self.permit(false)),
            CircuitState::Open => {
                let cooled = guard
                    .opened_at
                    .map(|at| self.clock.now().duration_since(at) >= self.config.cool_down)
                    .unwrap_or(true);
                if !cooled {
                    debug!(provider = %self.name, "Circuit open, skipping provider");
                    return None;
                }
                guard.state = CircuitState::HalfOpen;
                guard.trial_in_flight = true;
                info!(provider = %self.name, "Circuit breaker transitioning to HalfOpen state");
                Some(self.permit(true))
            }
            CircuitState::HalfOpen => {
                if guard.trial_in_flight {
                    debug!(provider = %self.name, "Half-open trial already in flight");
                    None
                } else {
                    guard.trial_in_flight = true;
                    Some(self.permit(true))
                }
            }
        }
    }

    /// Snapshot for reporting
    pub fn health(&self) -> ProviderHealth {
        let guard = self.lock();
        ProviderHealth {
            name: self.name.clone(),
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            last_opened_at: guard.last_opened_at,
        }
    }

    fn permit(self: &Arc<Self>, trial: bool) -> ProviderPermit {
        ProviderPermit {
            breaker: Arc::clone(self),
            trial,
            resolved: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, trial: bool, outcome: CallOutcome) {
        let mut guard = self.lock();
        if trial {
            guard.trial_in_flight = false;
        }

        match (guard.state, outcome) {
            // Stragglers from before the circuit opened do not decide the trial.
            (CircuitState::HalfOpen, _) if !trial => {}
            (CircuitState::HalfOpen, CallOutcome::Success) => {
                guard.state = CircuitState::Closed;
                guard.consecutive_failures = 0;
                guard.last_failure_at = None;
                guard.opened_at = None;
                info!(provider = %self.name, "Circuit breaker transitioning to Closed state");
            }
            (CircuitState::HalfOpen, CallOutcome::Failure) => {
                self.open(&mut guard);
            }
            (CircuitState::HalfOpen, CallOutcome::Ignored) => {
                // Trial told us nothing; back to Open without restarting the cool-down.
                guard.state = CircuitState::Open;
            }
            (CircuitState::Closed, CallOutcome::Success) => {
                guard.consecutive_failures = 0;
                guard.last_failure_at = None;
            }
            (CircuitState::Closed, CallOutcome::Failure) => {
                let now = self.clock.now();
                let within_window = guard
                    .last_failure_at
                    .map(|last| now.duration_since(last) <= self.config.failure_window)
                    .unwrap_or(false);
                guard.consecutive_failures = if within_window {
                    guard.consecutive_failures + 1
                } else {
                    1
                };
                guard.last_failure_at = Some(now);

                if guard.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut guard);
                }
            }
            (CircuitState::Closed, CallOutcome::Ignored) => {}
            (CircuitState::Open, _) => {
                debug!(provider = %self.name, outcome = ?outcome, "Outcome recorded while Open, ignoring");
            }
        }
    }

    fn open(&self, guard: &mut BreakerState) {
        guard.state = CircuitState::Open;
        guard.opened_at = Some(self.clock.now());
        guard.last_opened_at = Some(Utc::now());
        warn!(
            provider = %self.name,
            consecutive_failures = guard.consecutive_failures,
            "Circuit breaker transitioning to Open state"
        );
    }
}

/// Right to make one call through a breaker
///
/// Resolving consumes the permit, so an outcome is recorded at most once.
/// Dropping an unresolved permit counts as `Ignored`.
#[derive(Debug)]
pub struct ProviderPermit {
    breaker: Arc<ProviderBreaker>,
    trial: bool,
    resolved: bool,
}

impl ProviderPermit {
    /// Whether this permit is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.resolved = true;
        self.breaker.resolve(self.trial, outcome);
    }
}

impl Drop for ProviderPermit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.resolve(self.trial, CallOutcome::Ignored);
        }
    }
}
