//! OpenRouter adapter (OpenAI-compatible `/chat/completions`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm_client::adapter::{
    transport_error, LazyClient, LlmResponse, Prompt, ProviderAdapter, Usage,
};
use crate::llm_client::error::{AdapterError, ProviderError};
use crate::llm_client::registry::{GenerationConfig, Provider};

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterAdapter {
    client: LazyClient,
    api_base: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    error: Option<OpenRouterErrorBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenRouterErrorEnvelope {
    error: OpenRouterErrorBody,
}

#[derive(Deserialize)]
struct OpenRouterErrorBody {
    message: String,
    code: Option<Value>,
}

impl OpenRouterErrorBody {
    /// OpenRouter reports the HTTP-equivalent status as `code`, sometimes as a string.
    fn status(&self) -> Option<u16> {
        match self.code.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl OpenRouterAdapter {
    pub fn new(api_key: Option<String>, api_base: Option<String>) -> Self {
        Self {
            client: LazyClient::new(Provider::OpenRouter, api_key),
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn error(&self, model_id: &str, status: Option<u16>, message: String) -> AdapterError {
        ProviderError::new(Provider::OpenRouter, model_id, status, message).into()
    }
}

/// Builds the request body; generation parameters are merged in at the top level.
fn request_body(prompt: &Prompt, model_id: &str, generation_config: &GenerationConfig) -> Value {
    let mut body = json!({
        "model": model_id,
        "messages": [{ "role": "user", "content": prompt.as_str() }],
    });
    if let Value::Object(map) = &mut body {
        for (key, value) in generation_config {
            map.insert(key.clone(), value.clone());
        }
    }
    body
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    async fn send_message(
        &self,
        prompt: &Prompt,
        model_id: &str,
        generation_config: &GenerationConfig,
    ) -> Result<LlmResponse, AdapterError> {
        let client = self.client.get().await?;
        let url = format!("{}/chat/completions", self.api_base);

        let response = client
            .http
            .post(&url)
            .bearer_auth(&client.api_key)
            .json(&request_body(prompt, model_id, generation_config))
            .send()
            .await
            .map_err(|e| transport_error(Provider::OpenRouter, model_id, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(Provider::OpenRouter, model_id, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenRouterErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| match body.trim() {
                    "" => format!("HTTP {}", status.as_u16()),
                    raw => raw.to_string(),
                });
            return Err(self.error(model_id, Some(status.as_u16()), message));
        }

        let completion: ChatCompletion = serde_json::from_str(&body)
            .map_err(|e| self.error(model_id, None, format!("malformed response: {e}")))?;

        // Upstream failures can arrive as 200 with an error object.
        if let Some(error) = completion.error {
            return Err(self.error(model_id, error.status(), error.message));
        }

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(self.error(model_id, None, "empty response from model".to_string()));
        }

        let usage = completion.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        debug!(model = model_id, ?usage, "OpenRouter call succeeded");

        Ok(LlmResponse::new(Provider::OpenRouter, model_id, text, usage))
    }
}
