use crate::brain::Brain;
use crate::engine::backend::InferenceBackend;
use crate::engine::errors::BackendError;
use async_trait::async_trait;

const ECHO_CHARS: usize = 240;

/// Deterministic echo used when no inference server is configured, so the
/// cockpit stays usable end to end.
#[derive(Debug, Clone)]
pub struct FallbackBackend {
    brain: Brain,
    loaded: bool,
}

impl FallbackBackend {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            loaded: false,
        }
    }
}

#[async_trait]
impl InferenceBackend for FallbackBackend {
    async fn generate(&mut self, prompt: &str, _max_context: usize) -> Result<String, BackendError> {
        if !self.loaded {
            return Err(BackendError::NotLoaded);
        }
        let head: String = prompt.chars().take(ECHO_CHARS).collect();
        Ok(format!(
            "[Fallback {}] Received: {head} ...",
            self.brain.display_name()
        ))
    }

    async fn load(&mut self, _model: &str) -> Result<(), BackendError> {
        self.loaded = true;
        Ok(())
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn describe(&self) -> String {
        format!("fallback echo ({})", self.brain.display_name())
    }
}
