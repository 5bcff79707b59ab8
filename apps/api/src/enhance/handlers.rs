//! Axum route handlers for the AI API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::enhance::batch::{enhance_batch, BatchItem, MAX_BATCH_SIZE};
use crate::enhance::extraction::{extract_resume, ExtractedResume};
use crate::errors::AppError;
use crate::llm_client::{ModelUsed, Prompt, Usage};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct EnhanceResponse {
    pub text: String,
    pub model_used: ModelUsed,
    /// Adapter calls spent, retries and fallbacks included.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct BatchEnhanceRequest {
    pub prompts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchEnhanceResponse {
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub resume_text: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelUsed>,
    pub max_retries: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ai/enhance
///
/// Sends one prompt down the fallback chain and returns the raw reply.
pub async fn handle_enhance(
    State(state): State<AppState>,
    Json(request): Json<EnhanceRequest>,
) -> Result<Json<EnhanceResponse>, AppError> {
    let prompt = Prompt::new(request.prompt).map_err(|e| AppError::Validation(e.to_string()))?;

    let success = state.orchestrator.send_message(&prompt).await?;

    Ok(Json(EnhanceResponse {
        text: success.text().to_string(),
        model_used: success.model_used.summary(),
        attempts: success.attempts,
        usage: success.response.usage,
    }))
}

/// POST /api/v1/ai/enhance/batch
///
/// Enhances up to `MAX_BATCH_SIZE` prompts one after another.
pub async fn handle_enhance_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchEnhanceRequest>,
) -> Result<Json<BatchEnhanceResponse>, AppError> {
    if request.prompts.is_empty() {
        return Err(AppError::Validation("prompts cannot be empty".to_string()));
    }
    if request.prompts.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH_SIZE} prompts per batch"
        )));
    }

    let results =
        enhance_batch(&state.orchestrator, &request.prompts, state.batch_item_delay).await?;

    Ok(Json(BatchEnhanceResponse { results }))
}

/// POST /api/v1/ai/extract
///
/// Structures plain resume text into JSON. File parsing happens upstream.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractedResume>, AppError> {
    let extracted = extract_resume(&state.orchestrator, &request.resume_text).await?;
    Ok(Json(extracted))
}

/// GET /api/v1/ai/models
///
/// The enabled chain in the order it is tried.
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelsResponse>, AppError> {
    let models = state
        .orchestrator
        .models()?
        .iter()
        .map(|m| m.summary())
        .collect();

    Ok(Json(ModelsResponse {
        models,
        max_retries: state.orchestrator.retry_policy().max_retries,
    }))
}
