use crate::brain::Brain;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by an [`EngineAdapter`](super::EngineAdapter). These
/// propagate through the router to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{brain} engine unavailable: {reason}")]
    Unavailable { brain: Brain, reason: String },

    #[error("{brain} engine timed out after {}s", .deadline.as_secs_f64())]
    Timeout { brain: Brain, deadline: Duration },

    #[error("{brain} request cancelled")]
    Cancelled { brain: Brain },

    #[error("{brain} backend error: {message}")]
    Backend { brain: Brain, message: String },

    #[error("{brain} failed to load model '{model}': {reason}")]
    LoadFailed {
        brain: Brain,
        model: String,
        reason: String,
    },
}

impl EngineError {
    pub fn brain(&self) -> Brain {
        match self {
            EngineError::Unavailable { brain, .. }
            | EngineError::Timeout { brain, .. }
            | EngineError::Cancelled { brain }
            | EngineError::Backend { brain, .. }
            | EngineError::LoadFailed { brain, .. } => *brain,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

/// What a backend reports; the adapter wraps it with the brain identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("no model loaded")]
    NotLoaded,

    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Response(String),
}
