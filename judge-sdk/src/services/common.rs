//! Common utilities for provider adapters

use std::fmt;

use tracing::warn;

use crate::error::mapping::{map_http_error, parse_retry_after};
use crate::error::ProviderError;

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "Phoenix-ORCH".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("judge-sdk".to_string()),
        }
    }
}

impl UserAgent {
    /// Default agent tagged with the adapter's name
    pub fn for_adapter(adapter: &str) -> Self {
        Self {
            extra: Some(format!("judge-sdk; {}", adapter)),
            ..Self::default()
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }

        Ok(())
    }
}

/// Turn a non-success HTTP response into a ProviderError
pub async fn parse_error_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("Failed to read error response: {}", e),
    };

    let error = map_http_error(status, &body, retry_after);
    warn!(provider = %provider, status = status.as_u16(), error = %error, "Provider returned an error");
    error
}
