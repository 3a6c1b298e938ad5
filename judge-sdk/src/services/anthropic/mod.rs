//! Anthropic judge provider
//!
//! Talks to `{base_url}/v1/messages`. System messages are lifted out of the
//! conversation into the request's top-level `system` field.

mod models;
pub use models::*;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::common::{parse_error_response, UserAgent};
use crate::config::{ProviderConfig, ServiceConfig};
use crate::core::builder::AuthScheme;
use crate::core::{ClientBuilder, JudgeProvider, JudgeRequest, RawReply, Role, TokenUsage};
use crate::error::{ProviderError, Result};

/// API version header sent with every request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Judge provider backed by the Anthropic Messages API
#[derive(Debug)]
pub struct AnthropicJudgeProvider {
    http_client: Client,
    config: ProviderConfig,
}

impl AnthropicJudgeProvider {
    /// Create a provider from validated configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let http_client = ClientBuilder::new()
            .auth_token(config.api_key.clone())
            .auth_scheme(AuthScheme::Header("x-api-key".to_string()))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(UserAgent::for_adapter("anthropic"))
            .build_http_client()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_body(&self, request: &JudgeRequest) -> MessagesRequest {
        let messages = request
            .messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| Message {
                role: match message.role {
                    Role::Assistant => "assistant".to_string(),
                    _ => "user".to_string(),
                },
                content: message.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: request
                .parameters
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            max_tokens: request.parameters.max_tokens,
            messages,
            system: request.system_prompt(),
            temperature: Some(request.parameters.temperature),
        }
    }

    /// Send a messages request
    pub async fn messages(
        &self,
        body: &MessagesRequest,
    ) -> std::result::Result<MessagesResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.config.endpoint_base());
        debug!(provider = %self.config.name, model = %body.model, "Sending request to Anthropic: POST {}", url);

        let response = self.http_client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            return Err(parse_error_response(&self.config.name, response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str::<MessagesResponse>(&text)?)
    }
}

#[async_trait]
impl JudgeProvider for AnthropicJudgeProvider {
    async fn invoke(&self, request: JudgeRequest) -> std::result::Result<RawReply, ProviderError> {
        let body = self.build_body(&request);
        let response = self.messages(&body).await?;

        let text = response
            .text()
            .ok_or_else(|| ProviderError::decode("Response contained no text content"))?;

        Ok(RawReply {
            text,
            provider: self.config.name.clone(),
            model: response.model.or(Some(body.model)),
            usage: response.usage.map(|usage| TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            }),
        })
    }
}
