use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec, AuthenticationError,
};
use crate::models::message::Message;
use crate::models::tool::ToolDescriptor;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::default();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                let message = response.text().await.unwrap_or_default();
                Err(AuthenticationError {
                    status: status.as_u16(),
                    message,
                }
                .into())
            }
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\n{}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<(Message, Usage)> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });

        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools)?);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn check(&self) -> Result<()> {
        let url = format!(
            "{}/v1/models/{}",
            self.config.host.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| anyhow!("Could not reach {}: {}", self.config.host, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                let message = response.text().await.unwrap_or_default();
                Err(AuthenticationError {
                    status: status.as_u16(),
                    message,
                }
                .into())
            }
            StatusCode::NOT_FOUND => Err(anyhow!(
                "Model {} is not available at {}",
                self.config.model,
                self.config.host
            )),
            status => Err(anyhow!("Model endpoint check failed: {}", status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(host: String) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host,
            api_key: "test_api_key".to_string(),
            model: "gpt-4o".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            timeout_secs: 5,
        }
    }

    async fn _setup_mock_server(response: ResponseTemplate) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Good evening. How may I help with the gala?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_, provider) =
            _setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider
            .complete("You are Alfred.", &messages, &[])
            .await?;

        if let MessageContent::Text(text) = &message.content[0] {
            assert_eq!(text.text, "Good evening. How may I help with the gala?");
        } else {
            panic!("Expected Text content");
        }
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"query\":\"Nikola Tesla latest news\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });

        let (_, provider) =
            _setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("What is Tesla up to?")];
        let tool = ToolDescriptor::new(
            "web_search",
            "Search the web",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"}
                },
                "required": ["query"]
            }),
        );

        let (message, usage) = provider
            .complete("You are Alfred.", &messages, &[tool])
            .await?;

        assert_eq!(message.content.len(), 1);
        let request = message.tool_requests().next().unwrap();
        let tool_call = request.tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name, "web_search");
        assert_eq!(
            tool_call.arguments,
            json!({"query": "Nikola Tesla latest news"})
        );
        assert_eq!(usage.total_tokens, Some(35));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_sends_system_prompt_and_tools() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [{"role": "system", "content": "You are Alfred."}],
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri()))?;
        let (message, usage) = provider
            .complete("You are Alfred.", &[Message::user().with_text("hi")], &[])
            .await?;

        assert_eq!(message.text(), "ok");
        assert_eq!(usage, Usage::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_unauthorized() {
        let (_, provider) =
            _setup_mock_server(ResponseTemplate::new(401).set_body_string("bad key")).await;

        let err = provider
            .complete("You are Alfred.", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();

        let auth = err.downcast_ref::<AuthenticationError>().unwrap();
        assert_eq!(auth.status, 401);
        assert_eq!(auth.message, "bad key");
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let (_, provider) = _setup_mock_server(ResponseTemplate::new(503)).await;

        let err = provider
            .complete("You are Alfred.", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<AuthenticationError>().is_none());
        assert!(err.to_string().contains("Server error"));
    }

    #[tokio::test]
    async fn test_complete_context_length_error() {
        let (_, provider) = _setup_mock_server(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": "context_length_exceeded", "message": "too long"}
        })))
        .await;

        let err = provider
            .complete("You are Alfred.", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Context length exceeded"));
    }
    #[tokio::test]
    async fn test_check_accepts_known_model() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models/gpt-4o"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "gpt-4o", "object": "model"})),
            )
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri()))?;
        provider.check().await
    }

    #[tokio::test]
    async fn test_check_rejected_key_is_authentication_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models/gpt-4o"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri())).unwrap();
        let err = provider.check().await.unwrap_err();
        assert!(err.downcast_ref::<AuthenticationError>().is_some());
    }

    #[tokio::test]
    async fn test_check_unknown_model() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models/gpt-4o"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri())).unwrap();
        let err = provider.check().await.unwrap_err();
        assert!(err.to_string().contains("Model gpt-4o is not available"));
    }

    #[tokio::test]
    async fn test_check_unreachable_host() {
        let provider = OpenAiProvider::new(test_config("http://127.0.0.1:1".to_string())).unwrap();
        let err = provider.check().await.unwrap_err();
        assert!(err.to_string().starts_with("Could not reach http://127.0.0.1:1"));
    }
}
