//! Batch enhancement: runs the fallback chain once per prompt, sequentially.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::llm_client::{ChainError, ConfigurationError, ModelUsed, Orchestrator, Prompt};

/// Pause between consecutive items, to stay under provider rate limits.
pub const BATCH_ITEM_DELAY: Duration = Duration::from_millis(500);
pub const MAX_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<ModelUsed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn failed(index: usize, error: String) -> Self {
        Self {
            index,
            text: None,
            model_used: None,
            error: Some(error),
        }
    }
}

/// Enhances each prompt in order. A failed item is reported and the batch moves on;
/// a configuration error means no item can succeed, so it ends the batch.
pub async fn enhance_batch(
    orchestrator: &Orchestrator,
    prompts: &[String],
    item_delay: Duration,
) -> Result<Vec<BatchItem>, ConfigurationError> {
    let mut items = Vec::with_capacity(prompts.len());

    for (index, raw) in prompts.iter().enumerate() {
        if index > 0 && !item_delay.is_zero() {
            tokio::time::sleep(item_delay).await;
        }

        let prompt = match Prompt::new(raw.as_str()) {
            Ok(prompt) => prompt,
            Err(e) => {
                items.push(BatchItem::failed(index, e.to_string()));
                continue;
            }
        };

        match orchestrator.send_message(&prompt).await {
            Ok(success) => items.push(BatchItem {
                index,
                text: Some(success.text().to_string()),
                model_used: Some(success.model_used.summary()),
                error: None,
            }),
            Err(ChainError::Configuration(e)) => return Err(e),
            Err(e) => {
                warn!(index, "batch item failed: {e}");
                items.push(BatchItem::failed(
                    index,
                    "AI service temporarily unavailable".to_string(),
                ));
            }
        }
    }

    let failed = items.iter().filter(|i| i.error.is_some()).count();
    info!(total = items.len(), failed, "batch enhancement finished");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::{single_model_orchestrator, FnAdapter};
    use crate::llm_client::Provider;
    use tokio::time::Instant;

    fn echo_orchestrator() -> Orchestrator {
        single_model_orchestrator(FnAdapter::new(Provider::Gemini, |prompt| {
            if prompt.contains("fail") {
                Err((Some(503), "service unavailable".to_string()))
            } else {
                Ok(prompt.to_uppercase())
            }
        }))
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_reports_failures() {
        let orchestrator = echo_orchestrator();
        let prompts = vec!["one".to_string(), "fail me".to_string(), "three".to_string()];

        let items = enhance_batch(&orchestrator, &prompts, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].text.as_deref(), Some("ONE"));
        assert_eq!(items[0].model_used.as_ref().unwrap().model, "gemini-2.0-flash");
        assert!(items[1].text.is_none());
        assert!(items[1].error.is_some());
        assert_eq!(items[2].index, 2);
        assert_eq!(items[2].text.as_deref(), Some("THREE"));
    }

    #[tokio::test]
    async fn test_blank_item_is_rejected_without_calling_the_model() {
        let adapter = FnAdapter::new(Provider::Gemini, |p| Ok(p.to_string()));
        let seen = adapter.prompts.clone();
        let orchestrator = single_model_orchestrator(adapter);

        let items = enhance_batch(&orchestrator, &["  ".to_string()], Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(items[0].error.as_deref(), Some("prompt cannot be empty"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_are_spaced_by_delay() {
        let orchestrator = echo_orchestrator();
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let started = Instant::now();

        enhance_batch(&orchestrator, &prompts, BATCH_ITEM_DELAY)
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_configuration_error_stops_the_batch() {
        let orchestrator = Orchestrator::new(
            crate::llm_client::ModelRegistry::new(vec![]).unwrap(),
            vec![],
        );

        let err = enhance_batch(&orchestrator, &["x".to_string()], Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(err, ConfigurationError::NoEnabledModels);
    }
}
