//! OpenAI-compatible judge provider
//!
//! Talks to `{base_url}/chat/completions`, so it also works against any
//! server that mirrors the OpenAI chat API.

mod models;
pub use models::*;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::common::{parse_error_response, UserAgent};
use crate::config::{ProviderConfig, ServiceConfig};
use crate::core::{ClientBuilder, JudgeProvider, JudgeRequest, RawReply, Role, TokenUsage};
use crate::error::{ProviderError, Result};

/// Judge provider backed by an OpenAI-compatible chat completions endpoint
#[derive(Debug)]
pub struct OpenAIJudgeProvider {
    http_client: Client,
    config: ProviderConfig,
}

impl OpenAIJudgeProvider {
    /// Create a provider from validated configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let http_client = ClientBuilder::new()
            .auth_token(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(UserAgent::for_adapter("openai"))
            .build_http_client()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_body(&self, request: &JudgeRequest) -> ChatCompletionRequest {
        let messages = request
            .messages
            .iter()
            .map(|message| ChatMessage {
                role: role_name(message.role).to_string(),
                content: message.content.clone(),
            })
            .collect();

        ChatCompletionRequest {
            model: request
                .parameters
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages,
            temperature: Some(request.parameters.temperature),
            max_tokens: Some(request.parameters.max_tokens),
            response_format: None,
        }
    }

    /// Send a chat completion request
    pub async fn chat_completion(
        &self,
        body: &ChatCompletionRequest,
    ) -> std::result::Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.config.endpoint_base());
        debug!(provider = %self.config.name, model = %body.model, "Sending request to OpenAI: POST {}", url);

        let response = self.http_client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            return Err(parse_error_response(&self.config.name, response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str::<ChatCompletionResponse>(&text)?)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl JudgeProvider for OpenAIJudgeProvider {
    async fn invoke(&self, request: JudgeRequest) -> std::result::Result<RawReply, ProviderError> {
        let body = self.build_body(&request);
        let response = self.chat_completion(&body).await?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::decode("No completion choices returned"))?;

        Ok(RawReply {
            text,
            provider: self.config.name.clone(),
            model: response.model.or(Some(body.model)),
            usage: response.usage.map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }),
        })
    }
}
