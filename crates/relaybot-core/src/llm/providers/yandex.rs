use crate::config::LlmConfig;
use crate::core_types::{LLMResponse, Message, Usage};
use crate::errors::BotError;
use crate::llm::LLM;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

pub const YANDEX_COMPLETION_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// YandexGPT foundation-models client. The model is addressed by its URI
/// (`gpt://<folder-id>/yandexgpt-lite`) and authenticated with an IAM token.
#[derive(Debug, Clone)]
pub struct YandexClient {
    client: Client,
    iam_token: String,
    endpoint: String,
    model_uri: String,
    temperature: f32,
    max_tokens: u32,
}

impl YandexClient {
    pub fn new(iam_token: String, model_uri: String) -> Self {
        Self {
            client: Client::new(),
            iam_token,
            endpoint: YANDEX_COMPLETION_URL.to_string(),
            model_uri,
            temperature: 0.3,
            max_tokens: 500,
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request_body(&self, messages: &[Message]) -> Value {
        json!({
            "modelUri": self.model_uri,
            "completionOptions": {
                "stream": false,
                "temperature": self.temperature,
                // Yandex expects maxTokens as a string-encoded int64
                "maxTokens": self.max_tokens.to_string(),
            },
            "messages": messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "text": m.content }))
                .collect::<Vec<Value>>(),
        })
    }

    fn parse_response(&self, response: Value) -> Result<LLMResponse, BotError> {
        if let Some(error) = response.get("error") {
            return Err(BotError::LLMError(format!("YandexGPT error: {}", error)));
        }

        let result = &response["result"];
        let alternative = result["alternatives"]
            .as_array()
            .and_then(|alternatives| alternatives.first())
            .ok_or_else(|| BotError::ParsingError("No alternatives in YandexGPT response".to_string()))?;

        let text = alternative["message"]["text"]
            .as_str()
            .ok_or_else(|| BotError::ParsingError("YandexGPT alternative has no text".to_string()))?;

        // token counts arrive as strings
        let count = |v: &Value| -> Option<u32> {
            v.as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| v.as_u64().map(|n| n as u32))
        };
        let usage = result.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: count(&u["inputTextTokens"])?,
                completion_tokens: count(&u["completionTokens"])?,
                total_tokens: count(&u["totalTokens"])?,
            })
        });

        Ok(LLMResponse {
            content: Some(text.to_string()),
            finish_reason: alternative["status"].as_str().map(|s| s.to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LLM for YandexClient {
    async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError> {
        let body = self.build_request_body(&messages);
        log::debug!("YandexGPT request to {}: {}", self.endpoint, body);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.iam_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::LLMError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| BotError::LLMError(format!("Failed to read response: {}", e)))?;

        log::debug!("YandexGPT response ({}): {}", status, response_text);

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| BotError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() && response_json.get("error").is_none() {
            return Err(BotError::LLMError(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        self.parse_response(response_json)
    }
}

pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, BotError> {
    let iam_token = config.auth.api_key.clone().ok_or_else(|| {
        BotError::ConfigError(format!(
            "No IAM token found for Yandex provider '{}'. Set api_key or api_key_env",
            config.name
        ))
    })?;

    let mut client = YandexClient::new(iam_token, config.model.clone())
        .with_temperature(config.parameters.temperature)
        .with_max_tokens(config.parameters.max_tokens);
    if let Some(endpoint) = &config.endpoint {
        client = client.with_endpoint(endpoint.clone());
    }

    Ok(Arc::new(client))
}
