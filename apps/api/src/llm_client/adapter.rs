//! The uniform contract every provider adapter speaks.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::llm_client::error::{AdapterError, ConfigurationError, ProviderError};
use crate::llm_client::registry::{GenerationConfig, Provider};

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Prompt text that is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("prompt cannot be empty")]
pub struct EmptyPrompt;

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyPrompt> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EmptyPrompt);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token counts as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A successful model reply. The text is returned raw; callers parse it.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    text: String,
    pub provider: Provider,
    pub model: String,
    pub usage: Option<Usage>,
}

impl LlmResponse {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        text: impl Into<String>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            text: text.into(),
            provider,
            model: model.into(),
            usage,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One adapter per provider. Each call is an independent single-turn request;
/// no conversation state carries over between calls.
///
/// Implementations must reduce every failure to `AdapterError`: missing
/// credentials become `Configuration`, everything else `Provider`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn send_message(
        &self,
        prompt: &Prompt,
        model_id: &str,
        generation_config: &GenerationConfig,
    ) -> Result<LlmResponse, AdapterError>;
}

/// HTTP client plus the credential it authenticates with.
pub(crate) struct AuthedClient {
    pub http: Client,
    pub api_key: String,
}

/// Builds the adapter's client on first use and reuses it afterwards.
/// A missing credential only surfaces once the provider is actually called.
pub(crate) struct LazyClient {
    provider: Provider,
    api_key: Option<String>,
    cell: OnceCell<AuthedClient>,
}

impl LazyClient {
    pub fn new(provider: Provider, api_key: Option<String>) -> Self {
        Self {
            provider,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&AuthedClient, ConfigurationError> {
        self.cell
            .get_or_try_init(|| async {
                let api_key = self.api_key.clone().ok_or(
                    ConfigurationError::MissingCredential {
                        provider: self.provider,
                        env_var: self.provider.credential_env_var(),
                    },
                )?;
                let http = Client::builder()
                    .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .build()
                    .map_err(|e| ConfigurationError::ClientBuild {
                        provider: self.provider,
                        message: e.to_string(),
                    })?;
                tracing::debug!(provider = %self.provider, "HTTP client initialized");
                Ok::<_, ConfigurationError>(AuthedClient { http, api_key })
            })
            .await
    }
}

/// Normalizes a transport-level reqwest failure. The URL is stripped so query
/// strings never end up in logs.
pub(crate) fn transport_error(
    provider: Provider,
    model: &str,
    err: reqwest::Error,
) -> ProviderError {
    let status = err.status().map(|s| s.as_u16());
    let message = if err.is_timeout() {
        format!("request timed out: {}", err.without_url())
    } else if err.is_connect() {
        format!("network error: connection failed: {}", err.without_url())
    } else if err.is_decode() {
        format!("malformed response: {}", err.without_url())
    } else {
        format!("network error: {}", err.without_url())
    };
    ProviderError::new(provider, model, status, message)
}
