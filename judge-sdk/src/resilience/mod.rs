//! Resilience patterns for judge provider calls
//!
//! - Retry with per-kind exponential backoff
//! - Per-provider circuit breaker
//! - Deadline and cancellation guard
//! - Substitutable clock

pub mod circuit_breaker;
pub mod clock;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{
    CallOutcome, CircuitBreakerConfig, CircuitState, ProviderBreaker, ProviderHealth,
    ProviderPermit,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use retry::{KindPolicy, RetryConfig, RetryDecision, RetryPolicy};
pub use timeout::{run_with_timeout, GuardError};
