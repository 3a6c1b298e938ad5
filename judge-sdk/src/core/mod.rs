//! Core abstractions for the Judge SDK
//!
//! - `JudgeProvider`: one remote inference backend that can act as a judge
//! - `JudgeRequest` / `RawReply`: the vendor-neutral request and reply shapes
//! - `ClientBuilder`: builder for the HTTP clients the adapters use

pub mod builder;
pub use builder::{AuthScheme, ClientBuilder};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message sent to the judge model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeMessage {
    pub role: Role,
    pub content: String,
}

impl JudgeMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters for a judge call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeParameters {
    /// Model override; providers fall back to their configured model
    pub model: Option<String>,

    /// Judging should be as deterministic as the backend allows
    pub temperature: f32,

    pub max_tokens: u32,
}

impl Default for InvokeParameters {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Vendor-neutral request to a judge provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub messages: Vec<JudgeMessage>,
    pub parameters: InvokeParameters,
}

impl JudgeRequest {
    pub fn new(messages: Vec<JudgeMessage>) -> Self {
        Self {
            messages,
            parameters: InvokeParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: InvokeParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Concatenated system messages
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Provider reply, normalised at the adapter boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReply {
    /// Text produced by the judge model
    pub text: String,

    /// Name of the provider that served the reply
    pub provider: String,

    pub model: Option<String>,

    pub usage: Option<TokenUsage>,
}

impl RawReply {
    pub fn new(text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model: None,
            usage: None,
        }
    }
}

/// A remote inference backend that can act as a judge
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Send one request and return the model's reply
    async fn invoke(&self, request: JudgeRequest) -> Result<RawReply, ProviderError>;

    /// Release any resources held by the provider
    async fn close(&self) {}
}
