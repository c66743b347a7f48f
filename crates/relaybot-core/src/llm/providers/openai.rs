use crate::config::LlmConfig;
use crate::core_types::{LLMResponse, Message, Usage};
use crate::errors::BotError;
use crate::llm::LLM;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and every endpoint speaking the same
/// protocol (HuggingFace router, vLLM, llama.cpp servers).
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    headers: HashMap<String, String>,
}

impl OpenAIClient {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: OPENAI_API_BASE.to_string(),
            model,
            temperature: None,
            max_tokens: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, messages: &[Message]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
                .collect::<Vec<Value>>(),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        body
    }

    fn parse_response(&self, response: Value) -> Result<LLMResponse, BotError> {
        let choices = response["choices"]
            .as_array()
            .ok_or_else(|| BotError::ParsingError("No choices in response".to_string()))?;

        let choice = choices
            .first()
            .ok_or_else(|| BotError::ParsingError("Empty choices array".to_string()))?;

        let content = choice["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BotError::ParsingError("Response has no message content".to_string()))?;

        let usage = response.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["prompt_tokens"].as_u64()? as u32,
                completion_tokens: u["completion_tokens"].as_u64()? as u32,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(LLMResponse {
            content: Some(content),
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LLM for OpenAIClient {
    async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(&messages);

        log::debug!("Chat completion request to {} ({} messages)", url, messages.len());
        log::debug!("Request body: {}", body);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| BotError::LLMError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| BotError::LLMError(format!("Failed to read response: {}", e)))?;

        log::debug!("Chat completion response ({}): {}", status, response_text);

        if !status.is_success() {
            return Err(BotError::LLMError(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| BotError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        self.parse_response(response_json)
    }
}

fn configure(mut client: OpenAIClient, config: &LlmConfig) -> OpenAIClient {
    client = client.with_temperature(config.parameters.temperature);
    if config.parameters.max_tokens > 0 {
        client = client.with_max_tokens(config.parameters.max_tokens);
    }
    client.with_headers(config.auth.headers.clone())
}

/// Create a client for api.openai.com (or the configured `endpoint`).
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, BotError> {
    let api_key = config.auth.api_key.clone().ok_or_else(|| {
        BotError::ConfigError(format!(
            "No API key found for OpenAI provider '{}'. Set api_key or api_key_env",
            config.name
        ))
    })?;

    let mut client = OpenAIClient::new(Some(api_key), config.model.clone());
    if let Some(endpoint) = &config.endpoint {
        client = client.with_api_base(endpoint.clone());
    }

    Ok(Arc::new(configure(client, config)))
}

/// Create an OpenAI-compatible client for custom endpoints. The key is optional
/// since local servers usually run without one.
pub fn create_custom_client(config: &LlmConfig, base_url: &str) -> Result<Arc<dyn LLM>, BotError> {
    if config.auth.api_key.is_none() {
        log::warn!(
            "Custom provider '{}' has no API key, sending unauthenticated requests",
            config.name
        );
    }

    let client = OpenAIClient::new(config.auth.api_key.clone(), config.model.clone())
        .with_api_base(base_url.to_string());

    Ok(Arc::new(configure(client, config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAIClient::new(Some("test-key".to_string()), "gpt-4o-mini".to_string())
            .with_api_base("https://router.huggingface.co/v1/".to_string())
            .with_temperature(0.0)
            .with_max_tokens(2048);

        assert_eq!(client.api_key.as_deref(), Some("test-key"));
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.api_base, "https://router.huggingface.co/v1");
        assert_eq!(client.temperature, Some(0.0));
        assert_eq!(client.max_tokens, Some(2048));
    }

    #[test]
    fn test_request_body_formatting() {
        let client = OpenAIClient::new(None, "gpt-4o-mini".to_string())
            .with_temperature(0.1)
            .with_max_tokens(500);

        let body = client.build_request_body(&[
            Message::system("Be brief."),
            Message::user("Hello!"),
            Message::assistant("Hi."),
        ]);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 500);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Hello!");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_summary_requests_use_summarizer_cap_not_chat_parameters() {
        let yaml = r#"
summarizer:
  provider: openai
providers:
  - name: openai
    provider: openai
    model: gpt-4o-mini
    parameters:
      temperature: 0.0
      max_tokens: 2048
    auth:
      api_key: sk-inline
"#;
        let config = crate::config::ConfigLoader::from_str(yaml, None).unwrap();
        let summary_config = config.summarizer_llm_config().unwrap();
        let client = configure(
            OpenAIClient::new(summary_config.auth.api_key.clone(), summary_config.model.clone()),
            &summary_config,
        );

        let body = client.build_request_body(&[Message::user("Summarize this dialogue")]);
        assert_eq!(body["max_tokens"], 500);
        let temperature = body["temperature"].as_f64().unwrap();
        assert!((temperature - 0.1).abs() < 1e-6);

        // chat calls keep their own parameters
        let chat = configure(
            OpenAIClient::new(Some("sk-inline".to_string()), "gpt-4o-mini".to_string()),
            config.provider("openai").unwrap(),
        );
        assert_eq!(chat.build_request_body(&[])["max_tokens"], 2048);
    }

    #[test]
    fn test_parse_response_extracts_content_and_usage() {
        let client = OpenAIClient::new(None, "gpt-4o-mini".to_string());
        let response = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Hello there" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        });

        let parsed = client.parse_response(response).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("Hello there"));
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_response_rejects_empty_choices() {
        let client = OpenAIClient::new(None, "gpt-4o-mini".to_string());

        let err = client.parse_response(json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, BotError::ParsingError(_)));

        let err = client.parse_response(json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, BotError::ParsingError(_)));
    }
}
