//! Mock tests for the Anthropic judge provider

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{ProviderConfig, ProviderKind};
    use crate::core::{InvokeParameters, JudgeMessage, JudgeProvider, JudgeRequest, TokenUsage};
    use crate::error::{FailureKind, JudgeError};
    use crate::services::anthropic::ANTHROPIC_VERSION;
    use crate::services::{build_provider, AnthropicJudgeProvider};

    const API_KEY: &str = "sk-ant-test-0123456789";

    fn create_test_provider(mock_server: &MockServer) -> AnthropicJudgeProvider {
        let config = ProviderConfig::new("claude", ProviderKind::Anthropic, API_KEY)
            .with_base_url(mock_server.uri());
        AnthropicJudgeProvider::new(config).expect("Failed to build Anthropic provider")
    }

    fn judge_request() -> JudgeRequest {
        JudgeRequest::new(vec![
            JudgeMessage::system("You are a judge."),
            JudgeMessage::user("Rate this answer."),
        ])
        .with_parameters(InvokeParameters {
            model: Some("claude-3-5-sonnet-latest".to_string()),
            temperature: 0.0,
            max_tokens: 512,
        })
    }

    #[tokio::test]
    async fn test_invoke_lifts_system_prompt() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", API_KEY))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-3-5-sonnet-latest",
                "max_tokens": 512,
                "system": "You are a judge.",
                "messages": [{"role": "user", "content": "Rate this answer."}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_mock",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-5-sonnet-20241022",
                "content": [
                    {"type": "text", "text": "{\"score\": "},
                    {"type": "text", "text": "5}"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 42, "output_tokens": 7}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let reply = provider.invoke(judge_request()).await.unwrap();

        assert_eq!(reply.text, "{\"score\": 5}");
        assert_eq!(reply.provider, "claude");
        assert_eq!(reply.model.as_deref(), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                input_tokens: 42,
                output_tokens: 7
            })
        );
    }

    #[tokio::test]
    async fn test_overloaded_is_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let err = provider.invoke(judge_request()).await.unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.kind(), FailureKind::ServerError);
        assert!(err.to_string().contains("Overloaded (overloaded_error)"));
    }

    #[tokio::test]
    async fn test_invalid_request_is_validation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "max_tokens: must be positive"}
            })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let err = provider.invoke(judge_request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(err.kind().is_fatal());
    }

    #[tokio::test]
    async fn test_reply_without_text_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_tool",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "noop", "input": {}}]
            })))
            .mount(&mock_server)
            .await;

        let provider = create_test_provider(&mock_server);
        let err = provider.invoke(judge_request()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ServerError);
    }

    #[test]
    fn test_build_provider_rejects_bad_config() {
        let config = ProviderConfig::new("claude", ProviderKind::Anthropic, "")
            .with_base_url("http://localhost:1");
        match build_provider(config) {
            Err(JudgeError::Configuration(message)) => assert!(message.contains("API key")),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("empty API key accepted"),
        }

        let config = ProviderConfig::new("claude", ProviderKind::Anthropic, API_KEY)
            .with_base_url("ftp://example.com");
        assert!(build_provider(config).is_err());
    }
}
