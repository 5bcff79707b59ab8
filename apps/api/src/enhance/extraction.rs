//! Resume extraction: turns already-extracted resume text into structured JSON.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::enhance::prompts::resume_extraction_prompt;
use crate::errors::AppError;
use crate::llm_client::{parse_json_reply, ModelUsed, Orchestrator, Prompt};

/// Longest resume text accepted, in characters.
pub const MAX_RESUME_CHARS: usize = 50_000;

#[derive(Debug, Serialize)]
pub struct ExtractedResume {
    pub data: Value,
    pub model_used: ModelUsed,
}

pub async fn extract_resume(
    orchestrator: &Orchestrator,
    resume_text: &str,
) -> Result<ExtractedResume, AppError> {
    if resume_text.trim().is_empty() {
        return Err(AppError::Validation("resume_text cannot be empty".to_string()));
    }
    if resume_text.chars().count() > MAX_RESUME_CHARS {
        return Err(AppError::Validation(format!(
            "resume_text exceeds {MAX_RESUME_CHARS} characters"
        )));
    }

    let prompt = Prompt::new(resume_extraction_prompt(resume_text))
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let success = orchestrator.send_message(&prompt).await?;

    let data: Value = parse_json_reply(success.text()).map_err(|e| {
        warn!(model = %success.model_used.model_id, "extraction reply is not JSON: {e}");
        AppError::UnprocessableEntity("The AI returned an unreadable resume structure".to_string())
    })?;

    if !data.is_object() {
        return Err(AppError::UnprocessableEntity(
            "The AI returned an unreadable resume structure".to_string(),
        ));
    }

    info!(model = %success.model_used.model_id, "resume extracted");
    Ok(ExtractedResume {
        data,
        model_used: success.model_used.summary(),
    })
}
