//! Model Registry: the ordered candidate list plus the two decisions the
//! orchestrator delegates: "is this failure worth trying another model for?"
//! and "how long do we wait before the next retry?".
//!
//! The registry is built once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm_client::error::{ConfigurationError, ProviderError};

/// Provider-specific generation parameters, passed through to the adapter verbatim.
pub type GenerationConfig = serde_json::Map<String, serde_json::Value>;

/// Backend AI provider. Each variant is served by exactly one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn credential_env_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured (provider, model) candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: Provider,
    pub model_id: String,
    /// Lower is tried first. Unique among enabled entries.
    pub priority: u32,
    pub enabled: bool,
    #[serde(default)]
    pub generation_config: GenerationConfig,
}

/// Which model served a request, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelUsed {
    pub provider: Provider,
    pub model: String,
    pub priority: u32,
}

impl ModelEntry {
    pub fn new(provider: Provider, model_id: &str, priority: u32, enabled: bool) -> Self {
        Self {
            provider,
            model_id: model_id.to_string(),
            priority,
            enabled,
            generation_config: GenerationConfig::new(),
        }
    }

    pub fn with_generation_config(mut self, config: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = config {
            self.generation_config = map;
        }
        self
    }

    pub fn summary(&self) -> ModelUsed {
        ModelUsed {
            provider: self.provider,
            model: self.model_id.clone(),
            priority: self.priority,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// Builds a registry, rejecting priority 0 and ties among enabled entries.
    pub fn new(entries: Vec<ModelEntry>) -> Result<Self, ConfigurationError> {
        let mut seen: HashMap<u32, &str> = HashMap::new();
        for entry in &entries {
            if entry.priority == 0 {
                return Err(ConfigurationError::InvalidPriority {
                    model: entry.model_id.clone(),
                });
            }
            if !entry.enabled {
                continue;
            }
            if let Some(first) = seen.insert(entry.priority, &entry.model_id) {
                return Err(ConfigurationError::DuplicatePriority {
                    priority: entry.priority,
                    first: first.to_string(),
                    second: entry.model_id.clone(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Parses a JSON array of model entries.
    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let entries: Vec<ModelEntry> = serde_json::from_str(raw)
            .map_err(|e| ConfigurationError::InvalidRegistry(e.to_string()))?;
        Self::new(entries)
    }

    /// The built-in chain: Gemini first, OpenRouter free-tier models as backup.
    pub fn default_models() -> Self {
        let entries = vec![
            ModelEntry::new(Provider::Gemini, "gemini-2.0-flash", 1, true).with_generation_config(
                json!({ "temperature": 0.7, "topP": 0.95, "maxOutputTokens": 8192 }),
            ),
            ModelEntry::new(Provider::Gemini, "gemini-1.5-flash", 2, true).with_generation_config(
                json!({ "temperature": 0.7, "topP": 0.95, "maxOutputTokens": 8192 }),
            ),
            ModelEntry::new(
                Provider::OpenRouter,
                "meta-llama/llama-3.3-70b-instruct:free",
                3,
                true,
            )
            .with_generation_config(json!({ "temperature": 0.7, "max_tokens": 4096 })),
            ModelEntry::new(
                Provider::OpenRouter,
                "mistralai/mistral-7b-instruct:free",
                4,
                true,
            )
            .with_generation_config(json!({ "temperature": 0.7, "max_tokens": 4096 })),
            // Retired: kept for reference, never routed to.
            ModelEntry::new(Provider::Gemini, "gemini-1.5-pro", 5, false),
        ];
        Self { entries }
    }

    /// Enabled entries in ascending priority order.
    pub fn enabled_models_by_priority(&self) -> Result<Vec<ModelEntry>, ConfigurationError> {
        let mut enabled: Vec<ModelEntry> =
            self.entries.iter().filter(|e| e.enabled).cloned().collect();
        if enabled.is_empty() {
            return Err(ConfigurationError::NoEnabledModels);
        }
        enabled.sort_by_key(|e| e.priority);
        Ok(enabled)
    }

    /// A view of this registry containing only the given providers' entries.
    pub fn restricted_to(&self, providers: &[Provider]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| providers.contains(&e.provider))
                .cloned()
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

/// Lower-cased message fragments that mark a failure as provider-specific.
const FALLBACK_PHRASES: &[&str] = &[
    // auth / key
    "api key",
    "api_key",
    "invalid key",
    "unauthorized",
    "unauthenticated",
    "permission denied",
    "permission_denied",
    "authentication",
    // rate limit / quota
    "rate limit",
    "rate_limit",
    "quota",
    "too many requests",
    "resource exhausted",
    "resource_exhausted",
    // availability
    "service unavailable",
    "unavailable",
    "overloaded",
    "temporarily",
    "bad gateway",
    // network / timeout
    "network",
    "timeout",
    "timed out",
    "connection",
    "econnreset",
    "fetch failed",
    // malformed response
    "malformed response",
    "invalid response",
    "unexpected response",
    "empty response",
    "no candidates",
];

const FALLBACK_STATUS_CODES: &[u16] = &[429, 503, 502, 504, 401, 403];

/// Whether a terminal failure on one model justifies trying the next one.
/// Anything not recognized here is fatal for the whole chain.
pub fn is_fallback_worthy(error: &ProviderError) -> bool {
    if error
        .status
        .is_some_and(|status| FALLBACK_STATUS_CODES.contains(&status))
    {
        return true;
    }
    let message = error.message.to_lowercase();
    FALLBACK_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

/// Per-model retry budget and exponential backoff. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// `min(base_delay * multiplier^attempt_index, max_delay)`
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_error(status: Option<u16>, message: &str) -> ProviderError {
        ProviderError::new(Provider::Gemini, "gemini-2.0-flash", status, message)
    }

    #[test]
    fn test_enabled_models_sorted_ascending_and_filtered() {
        let registry = ModelRegistry::new(vec![
            ModelEntry::new(Provider::OpenRouter, "c", 30, true),
            ModelEntry::new(Provider::Gemini, "off", 5, false),
            ModelEntry::new(Provider::Gemini, "a", 10, true),
            ModelEntry::new(Provider::OpenRouter, "b", 20, true),
        ])
        .unwrap();

        let models = registry.enabled_models_by_priority().unwrap();
        let ids: Vec<&str> = models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(models.windows(2).all(|w| w[0].priority < w[1].priority));
        assert!(models.iter().all(|m| m.enabled));
    }

    #[test]
    fn test_default_registry_is_valid_and_skips_disabled() {
        let defaults = ModelRegistry::default_models();
        let validated = ModelRegistry::new(defaults.entries().to_vec()).unwrap();
        let models = validated.enabled_models_by_priority().unwrap();
        assert_eq!(models.len(), 4);
        assert_eq!(models[0].model_id, "gemini-2.0-flash");
        assert!(!models.iter().any(|m| m.model_id == "gemini-1.5-pro"));
    }

    #[test]
    fn test_empty_enabled_set_is_configuration_error() {
        let registry =
            ModelRegistry::new(vec![ModelEntry::new(Provider::Gemini, "off", 1, false)]).unwrap();
        assert_eq!(
            registry.enabled_models_by_priority().unwrap_err(),
            ConfigurationError::NoEnabledModels
        );
    }

    #[test]
    fn test_duplicate_enabled_priority_is_rejected() {
        let err = ModelRegistry::new(vec![
            ModelEntry::new(Provider::Gemini, "a", 1, true),
            ModelEntry::new(Provider::OpenRouter, "b", 1, true),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DuplicatePriority { priority: 1, .. }
        ));
    }

    #[test]
    fn test_duplicate_priority_allowed_when_one_is_disabled() {
        let registry = ModelRegistry::new(vec![
            ModelEntry::new(Provider::Gemini, "a", 1, true),
            ModelEntry::new(Provider::OpenRouter, "b", 1, false),
        ]);
        assert!(registry.is_ok());
    }

    #[test]
    fn test_zero_priority_is_rejected() {
        let err = ModelRegistry::new(vec![ModelEntry::new(Provider::Gemini, "a", 0, true)])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPriority { .. }));
    }

    #[test]
    fn test_restricted_to_keeps_only_named_providers() {
        let registry = ModelRegistry::default_models().restricted_to(&[Provider::Gemini]);
        let models = registry.enabled_models_by_priority().unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.provider == Provider::Gemini));
    }

    #[test]
    fn test_from_json_parses_entries() {
        let raw = r#"[
            {"provider": "openrouter", "model_id": "x", "priority": 2, "enabled": true,
             "generation_config": {"temperature": 0.2}},
            {"provider": "gemini", "model_id": "y", "priority": 1, "enabled": true}
        ]"#;
        let registry = ModelRegistry::from_json(raw).unwrap();
        let models = registry.enabled_models_by_priority().unwrap();
        assert_eq!(models[0].model_id, "y");
        assert_eq!(models[1].generation_config["temperature"], json!(0.2));
        assert!(models[0].generation_config.is_empty());
    }

    #[test]
    fn test_from_json_rejects_unknown_provider() {
        let raw = r#"[{"provider": "acme", "model_id": "x", "priority": 1, "enabled": true}]"#;
        assert!(matches!(
            ModelRegistry::from_json(raw),
            Err(ConfigurationError::InvalidRegistry(_))
        ));
    }

    #[test]
    fn test_fallback_worthy_status_codes() {
        for status in [429, 503, 502, 504, 401, 403] {
            assert!(
                is_fallback_worthy(&provider_error(Some(status), "whatever")),
                "status {status} should fall back"
            );
        }
        for status in [400, 404, 422, 500] {
            assert!(!is_fallback_worthy(&provider_error(Some(status), "whatever")));
        }
    }

    #[test]
    fn test_fallback_worthy_phrases() {
        for message in [
            "Rate limit exceeded",
            "You exceeded your current QUOTA",
            "API key not valid. Please pass a valid API key.",
            "The model is overloaded. Please try again later.",
            "Service Unavailable",
            "network error: connection reset",
            "request timed out",
            "RESOURCE_EXHAUSTED: too many requests",
            "malformed response: expected value at line 1",
            "empty response from model",
        ] {
            assert!(
                is_fallback_worthy(&provider_error(None, message)),
                "'{message}' should fall back"
            );
        }
    }

    #[test]
    fn test_unrecognized_error_is_fatal() {
        assert!(!is_fallback_worthy(&provider_error(
            Some(400),
            "invalid request body"
        )));
        assert!(!is_fallback_worthy(&provider_error(None, "prompt blocked by safety filter")));
    }

    #[test]
    fn test_backoff_delay_reference_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(10_000));
    }

    #[test]
    fn test_backoff_delay_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(10_000));
    }
}
