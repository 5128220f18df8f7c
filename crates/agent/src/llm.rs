use anyhow::Result;
use async_trait::async_trait;

/// Completion seam for the planner. Implementations wrap a concrete
/// provider; the engine sends one prompt per email and reads back one chat
/// reply, which [`crate::planner::Planner`] then mines for a step array. Provider
/// errors are absorbed by the planner's fallback, never surfaced to the
/// execution loop.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
