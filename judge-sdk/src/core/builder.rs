//! HTTP client builder
//!
//! Builds the `reqwest` clients used by provider adapters: default headers,
//! authentication, timeout and user agent in one place.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;

use crate::error::{JudgeError, Result};
use crate::services::UserAgent;

/// How credentials are attached to requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// The raw token in a named header, e.g. `x-api-key`
    Header(String),
}

/// Builder for provider HTTP clients
#[derive(Clone)]
pub struct ClientBuilder {
    auth_token: Option<String>,
    auth_scheme: AuthScheme,
    custom_headers: HashMap<String, String>,
    timeout: Option<Duration>,
    user_agent: UserAgent,
    compression: bool,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("auth_scheme", &self.auth_scheme)
            .field("custom_headers", &self.custom_headers)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("compression", &self.compression)
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            auth_token: None,
            auth_scheme: AuthScheme::Bearer,
            custom_headers: HashMap::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: UserAgent::default(),
            compression: true,
        }
    }
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set authentication token/key
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set how the token is attached
    pub fn auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    /// Add a custom header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(key.into(), value.into());
        self
    }

    /// Set transport-level request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Enable or disable compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Default headers the built client sends with every request
    pub fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.custom_headers {
            let header_name = HeaderName::from_str(key)
                .map_err(|e| JudgeError::configuration(format!("Invalid header name: {}", e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| JudgeError::configuration(format!("Invalid header value: {}", e)))?;
            headers.insert(header_name, header_value);
        }

        if let Some(ref token) = self.auth_token {
            let (name, value) = match &self.auth_scheme {
                AuthScheme::Bearer => (reqwest::header::AUTHORIZATION, format!("Bearer {}", token)),
                AuthScheme::Header(name) => (
                    HeaderName::from_str(name).map_err(|e| {
                        JudgeError::configuration(format!("Invalid auth header name: {}", e))
                    })?,
                    token.clone(),
                ),
            };
            let mut value = HeaderValue::from_str(&value)
                .map_err(|_| JudgeError::configuration("Invalid auth header value"))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Build an HTTP client with the configured settings
    pub fn build_http_client(&self) -> Result<ReqwestClient> {
        let mut builder = ReqwestClient::builder()
            .user_agent(self.user_agent.to_string())
            .gzip(self.compression)
            .default_headers(self.default_headers()?);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| JudgeError::configuration(format!("Failed to build HTTP client: {}", e)))
    }
}
