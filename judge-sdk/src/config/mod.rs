//! Configuration management for the Judge SDK
//!
//! This module provides utilities for loading and validating configuration
//! for judge providers and the evaluation pipeline, with support for
//! environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, JudgeError, Result};
use crate::resilience::{CircuitBreakerConfig, KindPolicy, RetryConfig};

/// Prefix used for environment variables, e.g. `JUDGE_PROVIDERS`
pub const ENV_PREFIX: &str = "JUDGE";

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

impl ConfigProvider for Box<dyn ConfigProvider> {
    fn get_string(&self, key: &str) -> Result<String> {
        (**self).get_string(key)
    }
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.trim().parse::<i64>().map_err(|e| {
            JudgeError::configuration(format!("Invalid integer for key {}: {}", key, e))
        })
    }

    /// Get a float configuration value
    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value.trim().parse::<f64>().map_err(|e| {
            JudgeError::configuration(format!("Invalid float for key {}: {}", key, e))
        })
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(JudgeError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get a non-negative integer, falling back to `default` only when the key is absent
    fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get_string(key) {
            Err(_) => Ok(default),
            Ok(_) => {
                let value = self.get_int(key)?;
                u64::try_from(value).map_err(|_| {
                    JudgeError::configuration(format!("Value for key {} must not be negative", key))
                })
            }
        }
    }

    /// Get a float, falling back to `default` only when the key is absent
    fn get_float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get_string(key) {
            Err(_) => Ok(default),
            Ok(_) => self.get_float(key),
        }
    }

    /// Get a boolean, falling back to `default` only when the key is absent
    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_string(key) {
            Err(_) => Ok(default),
            Ok(_) => self.get_bool(key),
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        env_key.push_str(
            &key.to_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        );

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                JudgeError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => JudgeError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values.get(key).cloned().ok_or_else(|| {
            JudgeError::configuration(format!("Configuration key not found: {}", key))
        })
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Debug, Clone)]
pub struct CompositeConfigProvider<P: ConfigProvider> {
    providers: Vec<P>,
}

impl<P: ConfigProvider> Default for CompositeConfigProvider<P> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<P: ConfigProvider> CompositeConfigProvider<P> {
    /// Create a new composite config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the chain
    pub fn add_provider(&mut self, provider: P) {
        self.providers.push(provider);
    }

    /// Create a new provider with an initial list
    pub fn with_providers(providers: Vec<P>) -> Self {
        Self { providers }
    }
}

impl<P: ConfigProvider> ConfigProvider for CompositeConfigProvider<P> {
    fn get_string(&self, key: &str) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_string(key).ok())
            .ok_or_else(|| {
                JudgeError::configuration(format!(
                    "Configuration key not found in any provider: {}",
                    key
                ))
            })
    }
}

/// Trait for validated configuration sections
pub trait ServiceConfig: Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;

    /// Section name
    fn service_name(&self) -> &str;
}

/// Wire protocol spoken by a judge provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    OpenAI,
    /// Anthropic messages API
    Anthropic,
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(JudgeError::configuration(format!(
                "Unknown provider kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Connection settings for one judge provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name, used in logs, health reports and `served_by`
    pub name: String,
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Transport-level timeout; the per-attempt deadline is set separately
    pub timeout_seconds: u64,
}

impl Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl ProviderConfig {
    /// Config with the kind's default endpoint and model
    pub fn new(name: impl Into<String>, kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            api_key: api_key.into(),
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            timeout_seconds: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Load one provider's settings, keyed by `<name>_*`
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P, name: &str) -> Result<Self> {
        let kind: ProviderKind = match provider.get_string(&format!("{}_kind", name)) {
            Ok(kind) => kind.parse()?,
            Err(_) => name.parse()?,
        };
        let api_key = provider.get_string(&format!("{}_api_key", name))?;
        let base_url =
            provider.get_string_or(&format!("{}_base_url", name), kind.default_base_url());
        let model = provider.get_string_or(&format!("{}_model", name), kind.default_model());
        let timeout_seconds = provider.get_u64_or(&format!("{}_timeout_seconds", name), 60)?;

        let config = Self {
            name: name.to_string(),
            kind,
            api_key,
            base_url,
            model,
            timeout_seconds,
        };

        config.validate()?;
        Ok(config)
    }

    /// Base URL without a trailing slash
    pub fn endpoint_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl ServiceConfig for ProviderConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(JudgeError::configuration("Provider name is required"));
        }

        if self.api_key.is_empty() {
            return Err(JudgeError::configuration(format!(
                "API key is required for provider {}",
                self.name
            )));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            JudgeError::configuration(format!(
                "Invalid base URL for provider {}: {}",
                self.name, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(JudgeError::configuration(format!(
                "Base URL for provider {} must be http or https",
                self.name
            )));
        }

        if self.model.is_empty() {
            return Err(JudgeError::configuration(format!(
                "Model is required for provider {}",
                self.name
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(JudgeError::configuration(format!(
                "Timeout for provider {} must be positive",
                self.name
            )));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        &self.name
    }
}

/// Full configuration for an evaluator
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Providers in priority order
    pub providers: Vec<ProviderConfig>,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    /// Deadline for a single provider attempt
    pub request_timeout: Duration,
    /// Upper bound on concurrently running batch evaluations
    pub max_concurrency: usize,
    /// Whether successful replies are kept for degraded replay
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Confidence multiplier applied to replies replayed from the cache
    pub degraded_confidence: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            request_timeout: Duration::from_secs(60),
            max_concurrency: 4,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            degraded_confidence: 0.5,
        }
    }
}

impl JudgeConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let names = provider.get_string("providers").map_err(|_| {
            JudgeError::configuration("No judge providers configured (set `providers`)")
        })?;
        let providers = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| ProviderConfig::from_provider(provider, name))
            .collect::<Result<Vec<_>>>()?;

        let mut retry = RetryConfig {
            max_delay: Duration::from_millis(
                provider.get_u64_or("retry_max_delay_ms", defaults.retry.max_delay.as_millis() as u64)?,
            ),
            jitter_factor: provider.get_float_or("retry_jitter_factor", defaults.retry.jitter_factor)?,
            ..defaults.retry.clone()
        };
        for kind in FailureKind::ALL {
            let current = retry.policy(kind);
            let policy = KindPolicy::new(
                provider.get_u64_or(
                    &format!("retry_{}_max_retries", kind),
                    current.max_retries as u64,
                )? as u32,
                Duration::from_millis(provider.get_u64_or(
                    &format!("retry_{}_base_delay_ms", kind),
                    current.base_delay.as_millis() as u64,
                )?),
            );
            retry = retry.with_policy(kind, policy);
        }

        let breaker = CircuitBreakerConfig {
            failure_threshold: provider.get_u64_or(
                "breaker_failure_threshold",
                defaults.breaker.failure_threshold as u64,
            )? as u32,
            failure_window: Duration::from_secs(provider.get_u64_or(
                "breaker_failure_window_seconds",
                defaults.breaker.failure_window.as_secs(),
            )?),
            cool_down: Duration::from_secs(provider.get_u64_or(
                "breaker_cool_down_seconds",
                defaults.breaker.cool_down.as_secs(),
            )?),
        };

        let config = Self {
            providers,
            retry,
            breaker,
            request_timeout: Duration::from_secs(provider.get_u64_or(
                "request_timeout_seconds",
                defaults.request_timeout.as_secs(),
            )?),
            max_concurrency: provider
                .get_u64_or("max_concurrency", defaults.max_concurrency as u64)?
                as usize,
            cache_enabled: provider.get_bool_or("cache_enabled", defaults.cache_enabled)?,
            cache_ttl: Duration::from_secs(
                provider.get_u64_or("cache_ttl_seconds", defaults.cache_ttl.as_secs())?,
            ),
            degraded_confidence: provider
                .get_float_or("degraded_confidence", defaults.degraded_confidence)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `JUDGE_*` environment variables, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_provider(&EnvConfigProvider::new().with_prefix(ENV_PREFIX))
    }
}

impl ServiceConfig for JudgeConfig {
    fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(JudgeError::configuration("At least one judge provider is required"));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.name.as_str()) {
                return Err(JudgeError::configuration(format!(
                    "Duplicate provider name: {}",
                    provider.name
                )));
            }
        }

        if self.breaker.failure_threshold == 0 {
            return Err(JudgeError::configuration("Breaker failure threshold must be positive"));
        }

        if self.request_timeout.is_zero() {
            return Err(JudgeError::configuration("Request timeout must be positive"));
        }

        if self.max_concurrency == 0 {
            return Err(JudgeError::configuration("Max concurrency must be positive"));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(JudgeError::configuration("Retry jitter factor must be within [0, 1]"));
        }

        if !(0.0..=1.0).contains(&self.degraded_confidence) {
            return Err(JudgeError::configuration("Degraded confidence must be within [0, 1]"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "judge"
    }
}
