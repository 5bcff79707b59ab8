/// LLM Client: the single point of entry for every AI call in the resume API.
///
/// ARCHITECTURAL RULE: handlers never talk to a provider directly. Every prompt goes
/// through `Orchestrator::send_message`, which walks the model registry in priority
/// order with per-model retries and classified fallback.
///
/// Layout:
/// - `registry`: model entries, fallback classifier, backoff policy
/// - `adapter`: uniform adapter contract (`ProviderAdapter`, `LlmResponse`, `Prompt`)
/// - `gemini`, `openrouter`: the provider adapters
/// - `orchestrator`: the retry/fallback state machine
use serde::de::DeserializeOwned;

pub mod adapter;
pub mod error;
pub mod gemini;
pub mod openrouter;
pub mod orchestrator;
pub mod prompts;
pub mod registry;

#[cfg(test)]
pub mod testing;

pub use adapter::{Prompt, ProviderAdapter, Usage};
pub use error::{ChainError, ConfigurationError};
pub use gemini::GeminiAdapter;
pub use openrouter::OpenRouterAdapter;
pub use orchestrator::Orchestrator;
pub use registry::{ModelRegistry, ModelUsed, Provider, RetryPolicy};

/// Deserializes a model reply that was asked to be JSON.
///
/// Models routinely wrap JSON in code fences or add a sentence before it, so this
/// strips fences first and then falls back to the outermost `{ ... }` span.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let text = strip_json_fences(text);
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(err) => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end]),
            _ => Err(err),
        },
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(|s| s.trim())
                .unwrap_or(stripped)
        }
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_json_reply_with_leading_prose() {
        let input = "Here is the extracted resume:\n{\"name\": \"Ada\"}\nLet me know!";
        let value: Value = parse_json_reply(input).unwrap();
        assert_eq!(value["name"], "Ada");
    }

    #[test]
    fn test_parse_json_reply_rejects_non_json() {
        assert!(parse_json_reply::<Value>("I could not read that file.").is_err());
    }
}
