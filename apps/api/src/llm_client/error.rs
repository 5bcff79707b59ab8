//! Error taxonomy for the fallback chain.
//!
//! `ConfigurationError` means the system is misconfigured and is never retried.
//! `ProviderError` is the normalized shape every adapter failure is reduced to.
//! `ChainError` is what a caller of the orchestrator ultimately sees.

use std::time::Duration;

use thiserror::Error;

use crate::llm_client::registry::{ModelEntry, Provider};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing credential for {provider}: environment variable '{env_var}' is not set")]
    MissingCredential {
        provider: Provider,
        env_var: &'static str,
    },

    #[error("no enabled models")]
    NoEnabledModels,

    #[error("models '{first}' and '{second}' share priority {priority}")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    #[error("model '{model}' has priority 0; priorities start at 1")]
    InvalidPriority { model: String },

    #[error("no adapter registered for provider {provider}")]
    MissingAdapter { provider: Provider },

    #[error("failed to build HTTP client for {provider}: {message}")]
    ClientBuild { provider: Provider, message: String },

    #[error("invalid model registry: {0}")]
    InvalidRegistry(String),
}

/// Normalized failure from a single adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} model '{model}' failed{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub provider: Provider,
    pub model: String,
}

impl ProviderError {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            provider,
            model: model.into(),
        }
    }
}

/// What an adapter call can fail with.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Terminal failure of one `send_message` chain.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A non-fallback-worthy error stopped the chain early.
    #[error("chain aborted after {} model(s): {last_error}", .models_attempted.len())]
    Aborted {
        last_error: ProviderError,
        models_attempted: Vec<ModelEntry>,
    },

    /// Every enabled model failed with a fallback-worthy error.
    #[error("all {} model(s) exhausted: {last_error}", .models_attempted.len())]
    Exhausted {
        last_error: ProviderError,
        models_attempted: Vec<ModelEntry>,
    },

    /// The chain ran out of time. `last_error` is `None` only when the
    /// deadline passed during the very first adapter call.
    #[error(
        "chain exceeded its deadline of {}ms after {} model(s){}",
        .deadline.as_millis(),
        .models_attempted.len(),
        .last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default()
    )]
    DeadlineExceeded {
        deadline: Duration,
        last_error: Option<ProviderError>,
        models_attempted: Vec<ModelEntry>,
    },
}

impl ChainError {
    /// The last concrete provider failure, if the chain got that far.
    pub fn last_provider_error(&self) -> Option<&ProviderError> {
        match self {
            ChainError::Aborted { last_error, .. } | ChainError::Exhausted { last_error, .. } => {
                Some(last_error)
            }
            ChainError::DeadlineExceeded { last_error, .. } => last_error.as_ref(),
            ChainError::Configuration(_) => None,
        }
    }

    pub fn models_attempted(&self) -> &[ModelEntry] {
        match self {
            ChainError::Aborted {
                models_attempted, ..
            }
            | ChainError::Exhausted {
                models_attempted, ..
            }
            | ChainError::DeadlineExceeded {
                models_attempted, ..
            } => models_attempted,
            ChainError::Configuration(_) => &[],
        }
    }
}
