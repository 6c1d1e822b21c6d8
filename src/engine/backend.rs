use crate::engine::errors::BackendError;
use async_trait::async_trait;

/// The only contract the cockpit needs from a local inference runtime.
///
/// Implementations are owned by one [`EngineSession`](super::EngineSession)
/// and are never called concurrently: the adapter serializes access.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Generate a completion for `prompt`. `max_context` is the character
    /// budget the prompt was built against.
    async fn generate(&mut self, prompt: &str, max_context: usize) -> Result<String, BackendError>;

    /// Load (or swap to) `model`.
    async fn load(&mut self, model: &str) -> Result<(), BackendError>;

    /// Release the loaded model.
    async fn unload(&mut self);

    fn is_loaded(&self) -> bool;

    /// Human-readable backend and model description.
    fn describe(&self) -> String;
}
