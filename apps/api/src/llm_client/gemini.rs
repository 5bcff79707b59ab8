//! Google Gemini adapter (Generative Language API, `generateContent`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::adapter::{
    transport_error, LazyClient, LlmResponse, Prompt, ProviderAdapter, Usage,
};
use crate::llm_client::error::{AdapterError, ProviderError};
use crate::llm_client::registry::{GenerationConfig, Provider};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    client: LazyClient,
    api_base: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    #[serde(rename = "generationConfig", skip_serializing_if = "is_empty_config")]
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
    status: Option<String>,
}

fn is_empty_config(config: &&GenerationConfig) -> bool {
    config.is_empty()
}

impl GeminiAdapter {
    pub fn new(api_key: Option<String>, api_base: Option<String>) -> Self {
        Self {
            client: LazyClient::new(Provider::Gemini, api_key),
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn error(&self, model_id: &str, status: Option<u16>, message: String) -> AdapterError {
        ProviderError::new(Provider::Gemini, model_id, status, message).into()
    }
}

/// Pulls `"STATUS: message"` out of a Gemini error body, falling back to the raw body.
fn error_message(body: &str, status: u16) -> String {
    match serde_json::from_str::<GeminiErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{code}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn send_message(
        &self,
        prompt: &Prompt,
        model_id: &str,
        generation_config: &GenerationConfig,
    ) -> Result<LlmResponse, AdapterError> {
        let client = self.client.get().await?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, model_id
        );

        let request = GeminiRequest {
            contents: [GeminiContent {
                role: "user",
                parts: [GeminiPart {
                    text: prompt.as_str(),
                }],
            }],
            generation_config,
        };

        let response = client
            .http
            .post(&url)
            .header("x-goog-api-key", &client.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Gemini, model_id, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(Provider::Gemini, model_id, e))?;

        if !status.is_success() {
            return Err(self.error(
                model_id,
                Some(status.as_u16()),
                error_message(&body, status.as_u16()),
            ));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| self.error(model_id, None, format!("malformed response: {e}")))?;

        if parsed.candidates.is_empty() {
            let message = match parsed.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => format!("prompt blocked by provider: {reason}"),
                None => "no candidates returned".to_string(),
            };
            return Err(self.error(model_id, None, message));
        }

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(self.error(model_id, None, "empty response from model".to_string()));
        }

        let usage = parsed.usage_metadata.map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        });
        debug!(model = model_id, ?usage, "Gemini call succeeded");

        Ok(LlmResponse::new(Provider::Gemini, model_id, text, usage))
    }
}
