use std::sync::Arc;
use std::time::Duration;

use crate::llm_client::Orchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Read-only after startup; shared by every request.
    pub orchestrator: Arc<Orchestrator>,
    pub batch_item_delay: Duration,
}
