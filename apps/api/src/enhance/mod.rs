// AI enhancement callers: single prompt, batch, and resume-text extraction.
// All LLM calls go through llm_client::Orchestrator; no direct provider calls here.

pub mod batch;
pub mod extraction;
pub mod handlers;
pub mod prompts;
