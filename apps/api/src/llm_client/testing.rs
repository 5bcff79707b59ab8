//! Test doubles for code that sits on top of the orchestrator.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm_client::adapter::{LlmResponse, Prompt, ProviderAdapter, Usage};
use crate::llm_client::error::{AdapterError, ProviderError};
use crate::llm_client::registry::{GenerationConfig, ModelEntry, ModelRegistry, Provider};
use crate::llm_client::{Orchestrator, RetryPolicy};

type Reply = dyn Fn(&str) -> Result<String, (Option<u16>, String)> + Send + Sync;

/// Adapter whose reply is computed from the prompt. Records every prompt it sees.
/// Reported usage is the word count of the prompt and of the reply.
pub struct FnAdapter {
    provider: Provider,
    reply: Box<Reply>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl FnAdapter {
    pub fn new(
        provider: Provider,
        reply: impl Fn(&str) -> Result<String, (Option<u16>, String)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            provider,
            reply: Box::new(reply),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FnAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn send_message(
        &self,
        prompt: &Prompt,
        model_id: &str,
        _generation_config: &GenerationConfig,
    ) -> Result<LlmResponse, AdapterError> {
        self.prompts.lock().unwrap().push(prompt.as_str().to_string());
        match (self.reply)(prompt.as_str()) {
            Ok(text) => {
                let usage = Usage {
                    input_tokens: prompt.as_str().split_whitespace().count() as u32,
                    output_tokens: text.split_whitespace().count() as u32,
                };
                Ok(LlmResponse::new(self.provider, model_id, text, Some(usage)))
            }
            Err((status, message)) => {
                Err(ProviderError::new(self.provider, model_id, status, message).into())
            }
        }
    }
}

/// Single-model Gemini orchestrator backed by `adapter`, with one attempt per model.
pub fn single_model_orchestrator(adapter: FnAdapter) -> Orchestrator {
    let registry = ModelRegistry::new(vec![ModelEntry::new(
        Provider::Gemini,
        "gemini-2.0-flash",
        1,
        true,
    )])
    .unwrap();
    let adapter: Arc<dyn ProviderAdapter> = Arc::new(adapter);
    Orchestrator::new(registry, vec![adapter]).with_retry_policy(RetryPolicy {
        max_retries: 1,
        ..RetryPolicy::default()
    })
}
