//! Fallback chat orchestrator.
//!
//! Two tiers:
//! 1. Within a model, every `ProviderError` is retried blindly up to
//!    `RetryPolicy::max_retries` times with exponential backoff.
//! 2. Once a model's retries are spent, its last error decides the chain:
//!    fallback-worthy → next model by priority, anything else → abort.
//!
//! `ConfigurationError` skips both tiers and ends the chain on the spot.
//! Models are tried strictly one at a time; at most one model serves a request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::llm_client::adapter::{LlmResponse, Prompt, ProviderAdapter};
use crate::llm_client::error::{AdapterError, ChainError, ConfigurationError, ProviderError};
use crate::llm_client::registry::{
    is_fallback_worthy, ModelEntry, ModelRegistry, Provider, RetryPolicy,
};

/// Outcome of one model's retry sub-loop: the final attempt made against it.
#[derive(Debug, Clone)]
pub enum AttemptResult {
    Success {
        response: LlmResponse,
        model: ModelEntry,
        attempt: u32,
    },
    Failure {
        error: ProviderError,
        model: ModelEntry,
        attempt: u32,
    },
}

/// A served request.
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    pub response: LlmResponse,
    pub model_used: ModelEntry,
    /// Adapter calls made across all models, including the successful one.
    pub attempts: u32,
}

impl ChainSuccess {
    pub fn text(&self) -> &str {
        self.response.text()
    }
}

pub struct Orchestrator {
    registry: ModelRegistry,
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    policy: RetryPolicy,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// Builds an orchestrator for the adapters available in this context.
    /// Registry entries for providers without an adapter are dropped from the chain.
    pub fn new(registry: ModelRegistry, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = adapters
            .into_iter()
            .map(|adapter| (adapter.provider(), adapter))
            .collect();
        let providers: Vec<Provider> = adapters.keys().copied().collect();

        Self {
            registry: registry.restricted_to(&providers),
            adapters,
            policy: RetryPolicy::default(),
            deadline: None,
        }
    }

    /// Zero retries is clamped to a single attempt per model.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = RetryPolicy {
            max_retries: policy.max_retries.max(1),
            ..policy
        };
        self
    }

    /// Caps the wall-clock time of a whole chain, sleeps included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The chain this orchestrator would walk, in order.
    pub fn models(&self) -> Result<Vec<ModelEntry>, ConfigurationError> {
        self.registry.enabled_models_by_priority()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `prompt` down the fallback chain and returns the first success.
    pub async fn send_message(&self, prompt: &Prompt) -> Result<ChainSuccess, ChainError> {
        let chain_id = Uuid::new_v4();
        self.run_chain(prompt)
            .instrument(info_span!("llm_chain", %chain_id))
            .await
    }

    async fn run_chain(&self, prompt: &Prompt) -> Result<ChainSuccess, ChainError> {
        let models = self.registry.enabled_models_by_priority()?;
        let expires_at = self.deadline.map(|deadline| Instant::now() + deadline);
        let mut models_attempted: Vec<ModelEntry> = Vec::with_capacity(models.len());
        let mut total_attempts = 0;
        let mut last_error: Option<ProviderError> = None;

        for model in models {
            let adapter = self.adapters.get(&model.provider).ok_or(
                ConfigurationError::MissingAdapter {
                    provider: model.provider,
                },
            )?;

            let outcome = match self
                .try_model(prompt, &model, adapter.as_ref(), expires_at)
                .await
            {
                Ok(outcome) => outcome,
                Err(ModelStop::Configuration(e)) => return Err(e.into()),
                Err(ModelStop::Deadline(model_error)) => {
                    models_attempted.push(model);
                    let deadline = self.deadline.unwrap_or_default();
                    let last_error = model_error.or(last_error);
                    error!(
                        ?deadline,
                        status = ?last_error.as_ref().and_then(|e| e.status),
                        models = models_attempted.len(),
                        "LLM chain exceeded its deadline"
                    );
                    return Err(ChainError::DeadlineExceeded {
                        deadline,
                        last_error,
                        models_attempted,
                    });
                }
            };

            match outcome {
                AttemptResult::Success {
                    response,
                    model,
                    attempt,
                } => {
                    total_attempts += attempt;
                    info!(
                        provider = %model.provider,
                        model = %model.model_id,
                        attempt,
                        fallbacks = models_attempted.len(),
                        "LLM chain succeeded"
                    );
                    return Ok(ChainSuccess {
                        response,
                        model_used: model,
                        attempts: total_attempts,
                    });
                }
                AttemptResult::Failure {
                    error,
                    model,
                    attempt,
                } => {
                    total_attempts += attempt;
                    models_attempted.push(model);

                    if !is_fallback_worthy(&error) {
                        error!(error = %error, "non-recoverable LLM error, aborting chain");
                        return Err(ChainError::Aborted {
                            last_error: error,
                            models_attempted,
                        });
                    }

                    warn!(error = %error, "model exhausted its retries, falling back");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last_error) => {
                error!(
                    models = models_attempted.len(),
                    "every enabled model failed"
                );
                Err(ChainError::Exhausted {
                    last_error,
                    models_attempted,
                })
            }
            None => Err(ConfigurationError::NoEnabledModels.into()),
        }
    }

    /// Retry sub-loop for a single model. Does not classify errors.
    async fn try_model(
        &self,
        prompt: &Prompt,
        model: &ModelEntry,
        adapter: &dyn ProviderAdapter,
        expires_at: Option<Instant>,
    ) -> Result<AttemptResult, ModelStop> {
        let max_attempts = self.policy.max_retries;
        let mut attempt = 1;
        let mut last_error: Option<ProviderError> = None;

        loop {
            let call = adapter.send_message(prompt, &model.model_id, &model.generation_config);
            let result = match before(expires_at, call).await {
                Some(result) => result,
                None => return Err(ModelStop::Deadline(last_error)),
            };

            match result {
                Ok(response) => {
                    return Ok(AttemptResult::Success {
                        response,
                        model: model.clone(),
                        attempt,
                    });
                }
                Err(AdapterError::Configuration(e)) => return Err(ModelStop::Configuration(e)),
                Err(AdapterError::Provider(error)) => {
                    warn!(
                        provider = %model.provider,
                        model = %model.model_id,
                        attempt,
                        max_attempts,
                        status = ?error.status,
                        "LLM call failed: {}",
                        error.message
                    );

                    if attempt >= max_attempts {
                        return Ok(AttemptResult::Failure {
                            error,
                            model: model.clone(),
                            attempt,
                        });
                    }

                    last_error = Some(error);
                    let backoff = tokio::time::sleep(self.policy.backoff_delay(attempt - 1));
                    if before(expires_at, backoff).await.is_none() {
                        return Err(ModelStop::Deadline(last_error));
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Why a model's retry sub-loop ended without an `AttemptResult`.
enum ModelStop {
    Configuration(ConfigurationError),
    /// Carries the model's most recent failure, if it had one.
    Deadline(Option<ProviderError>),
}

/// Runs `fut` to completion, or gives up with `None` once `expires_at` passes.
async fn before<F: Future>(expires_at: Option<Instant>, fut: F) -> Option<F::Output> {
    match expires_at {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
