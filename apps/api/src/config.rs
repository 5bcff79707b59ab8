use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{ModelRegistry, Provider, RetryPolicy};

/// Application configuration loaded from environment variables.
///
/// Provider API keys are optional here: a missing key only fails the first
/// request that actually reaches that provider.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_api_base: Option<String>,
    /// JSON file with model entries; the built-in chain is used when unset.
    pub models_path: Option<String>,
    /// Providers usable in this deployment; all of them when unset.
    pub allowed_providers: Option<Vec<Provider>>,
    pub retry_policy: RetryPolicy,
    pub chain_deadline: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RetryPolicy::default();
        let retry_policy = RetryPolicy {
            max_retries: parse_env("LLM_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            base_delay: parse_env("LLM_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            multiplier: defaults.multiplier,
            max_delay: parse_env("LLM_MAX_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        };

        Ok(Config {
            port: parse_env("PORT")?.unwrap_or(8080),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_api_base: optional_env("GEMINI_API_BASE"),
            openrouter_api_key: optional_env("OPENROUTER_API_KEY"),
            openrouter_api_base: optional_env("OPENROUTER_API_BASE"),
            models_path: optional_env("LLM_MODELS_PATH"),
            allowed_providers: optional_env("LLM_ALLOWED_PROVIDERS")
                .map(|raw| parse_providers(&raw))
                .transpose()?,
            retry_policy,
            chain_deadline: parse_env("LLM_CHAIN_DEADLINE_SECS")?.map(Duration::from_secs),
        })
    }

    /// Loads the model registry from `models_path`, or the built-in chain.
    pub fn model_registry(&self) -> Result<ModelRegistry> {
        match &self.models_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read model registry '{path}'"))?;
                ModelRegistry::from_json(&raw)
                    .with_context(|| format!("Invalid model registry '{path}'"))
            }
            None => Ok(ModelRegistry::default_models()),
        }
    }

    pub fn provider_allowed(&self, provider: Provider) -> bool {
        self.allowed_providers
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&provider))
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Environment variable '{key}' has an invalid value"))
        })
        .transpose()
}

fn parse_providers(raw: &str) -> Result<Vec<Provider>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            Provider::parse(name).with_context(|| {
                format!("Unknown provider '{name}' in LLM_ALLOWED_PROVIDERS")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_providers_accepts_mixed_case_and_spaces() {
        let providers = parse_providers(" Gemini , openrouter").unwrap();
        assert_eq!(providers, vec![Provider::Gemini, Provider::OpenRouter]);
    }

    #[test]
    fn test_parse_providers_rejects_unknown_names() {
        assert!(parse_providers("gemini,acme").is_err());
    }

    #[test]
    fn test_provider_allowed_defaults_to_all() {
        let config = Config {
            port: 8080,
            rust_log: "info".into(),
            gemini_api_key: None,
            gemini_api_base: None,
            openrouter_api_key: None,
            openrouter_api_base: None,
            models_path: None,
            allowed_providers: None,
            retry_policy: RetryPolicy::default(),
            chain_deadline: None,
        };
        assert!(config.provider_allowed(Provider::Gemini));
        assert!(config.provider_allowed(Provider::OpenRouter));

        let gemini_only = Config {
            allowed_providers: Some(vec![Provider::Gemini]),
            ..config
        };
        assert!(!gemini_only.provider_allowed(Provider::OpenRouter));
    }
}
