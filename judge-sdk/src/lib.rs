//! # Judge SDK
//!
//! Resilient LLM-as-judge evaluation for the Phoenix ORCH project.
//!
//! This crate provides:
//!
//! - Provider adapters for OpenAI-compatible and Anthropic judge models
//! - Failure classification, per-kind retry with jittered backoff and
//!   cancellable timeouts
//! - Priority fallback across providers with per-provider circuit breakers
//!   and a degraded reply cache
//! - Weighted criteria, a tolerant reply parser and score aggregation
//! - Configuration and structured logging utilities
//!
//! ## Architecture
//!
//! - `Evaluator`: public entry point (`evaluate`, `compare`, `evaluate_batch`, `close`)
//! - `FallbackCoordinator`: walks providers in order, gated by `ProviderBreaker`s
//! - `JudgeProvider`: one remote backend, normalised to `RawReply`
//! - `ResponseParser` and `aggregate`: turn a reply into an `AggregatedResult`
//! - `JudgeError`: the caller-visible error type

pub mod aggregate;
pub use aggregate::{aggregate, AggregatedResult};

pub mod config;
pub use config::{
    ConfigProvider, ConfigProviderExt, EnvConfigProvider, JudgeConfig, ProviderConfig, ProviderKind,
    ServiceConfig,
};

pub mod core;
pub use core::{JudgeMessage, JudgeProvider, JudgeRequest, RawReply, Role};

pub mod criteria;
pub use criteria::{CriteriaOptions, CriteriaSet, CriterionDefinition, DefaultCriteria};

pub mod error;
pub use error::{classify, FailureKind, JudgeError, ProviderError, Result};

pub mod evaluator;
pub use evaluator::{ComparisonResult, EvaluationRequest, Evaluator, EvaluatorConfig};

pub mod fallback;
pub use fallback::{DegradedCache, FallbackCoordinator, FallbackResponse, MemoryCache, ServedBy};

pub mod logging;
pub use logging::{init_logging, LoggingConfig};

pub mod parser;
pub use parser::{CriterionScore, ParseStrategy, ResponseParser, Winner};

pub mod prompts;

pub mod resilience;
pub use resilience::{CircuitBreakerConfig, CircuitState, Clock, RetryConfig, RetryPolicy};

pub mod services;
pub use services::{AnthropicJudgeProvider, OpenAIJudgeProvider};

// Utility module for common functionality
pub mod util;

#[cfg(test)]
mod tests;

/// Build an evaluator from `JUDGE_*` environment variables
pub fn evaluator_from_env() -> Result<Evaluator> {
    Evaluator::from_env()
}
