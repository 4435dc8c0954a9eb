use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::OllamaConfig;
use crate::error::{ConfigError, LlmError};
use crate::llm::{parse_json_response, LanguageModel};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    format: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Ollama `/api/chat` client that asks for schema-constrained JSON output.
pub struct OllamaClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn with_config(config: &OllamaConfig) -> Result<Self, ConfigError> {
        if config.host.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "ollama.host" });
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "ollama.model" });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "ollama",
                reason: e.to_string(),
            })?;

        Ok(OllamaClient {
            base_url: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            temperature: config.temperature,
            client,
        })
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                Message { role: "system", content: system },
                Message { role: "user", content: prompt },
            ],
            stream: false,
            format: schema,
            options: self.temperature.map(|temperature| ModelOptions { temperature }),
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let mut builder = self.client.post(format!("{}/api/chat", self.base_url)).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| LlmError::Request {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: OllamaChatResponse = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;

        if let Some(reason) = chat.done_reason.as_deref() {
            if reason != "stop" {
                tracing::warn!(model = %self.model, reason, "completion ended early");
            }
        }

        tracing::debug!(
            model = %self.model,
            response = %chat.message.content,
            "completion received"
        );
        parse_json_response(&chat.message.content)
    }
}
