//! One adapter per brain. Requests to the same brain are served strictly in
//! submission order (the session sits behind a fair async mutex); the two
//! brains never share state and can generate at the same time.

use crate::brain::Brain;
use crate::config::EngineConfig;
use crate::engine::backend::InferenceBackend;
use crate::engine::errors::{BackendError, EngineError};
use crate::engine::fallback::FallbackBackend;
use crate::engine::http::HttpBackend;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Loaded backend plus its bookkeeping. Only reachable through the adapter's
/// queue lock, so at most one generation runs against it at a time.
pub struct EngineSession {
    backend: Box<dyn InferenceBackend>,
}

impl EngineSession {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

/// Point-in-time view for the monitor and the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub brain: Brain,
    pub ready: bool,
    pub busy: bool,
    pub queued: usize,
    pub completed: u64,
    pub model: Option<String>,
    pub backend: String,
}

pub struct EngineAdapter {
    brain: Brain,
    session: Mutex<EngineSession>,
    deadline: Duration,
    max_context: usize,
    ready: AtomicBool,
    busy: AtomicBool,
    queued: AtomicUsize,
    completed: AtomicU64,
    model: RwLock<Option<String>>,
    description: RwLock<String>,
}

impl EngineAdapter {
    pub fn new(brain: Brain, backend: Box<dyn InferenceBackend>, config: &EngineConfig) -> Self {
        let description = backend.describe();
        Self {
            brain,
            session: Mutex::new(EngineSession::new(backend)),
            deadline: config.timeout(),
            max_context: config.max_context,
            ready: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            model: RwLock::new(config.model.clone()),
            description: RwLock::new(description),
        }
    }

    /// HTTP backend when an endpoint is configured, echo fallback otherwise.
    pub fn from_config(brain: Brain, config: &EngineConfig) -> Self {
        let backend: Box<dyn InferenceBackend> = match &config.endpoint {
            Some(endpoint) => Box::new(HttpBackend::new(brain, endpoint, config)),
            None => {
                tracing::info!(brain = %brain, "no endpoint configured; using fallback backend");
                Box::new(FallbackBackend::new(brain))
            }
        };
        Self::new(brain, backend, config)
    }

    /// Override the per-request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn brain(&self) -> Brain {
        self.brain
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn max_context(&self) -> usize {
        self.max_context
    }

    /// Whether a model is loaded. Never waits on the request queue.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            brain: self.brain,
            ready: self.is_ready(),
            busy: self.busy.load(Ordering::Acquire),
            queued: self.queued.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            model: self.model.read().unwrap_or_else(PoisonError::into_inner).clone(),
            backend: self
                .description
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Load the configured model.
    pub async fn load(&self) -> Result<(), EngineError> {
        let model = self
            .model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default();
        self.reload(&model).await
    }

    /// Swap to `model`, after any in-flight generation. On failure the
    /// adapter is left unavailable.
    pub async fn reload(&self, model: &str) -> Result<(), EngineError> {
        let mut session = self.session.lock().await;
        tracing::info!(brain = %self.brain, model, "loading model");

        match session.backend.load(model).await {
            Ok(()) => {
                if !model.is_empty() {
                    *self.model.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(model.to_string());
                }
                *self.description.write().unwrap_or_else(PoisonError::into_inner) =
                    session.backend.describe();
                self.ready.store(session.backend.is_loaded(), Ordering::Release);
                tracing::info!(brain = %self.brain, backend = %session.backend.describe(), "engine ready");
                Ok(())
            }
            Err(err) => {
                self.ready.store(false, Ordering::Release);
                tracing::warn!(brain = %self.brain, model, error = %err, "model load failed");
                Err(EngineError::LoadFailed {
                    brain: self.brain,
                    model: model.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Release the model. Waits for the in-flight generation.
    pub async fn unload(&self) {
        let mut session = self.session.lock().await;
        session.backend.unload().await;
        self.ready.store(false, Ordering::Release);
        tracing::info!(brain = %self.brain, "engine unloaded");
    }

    pub async fn submit(&self, prompt: &str, max_context: usize) -> Result<String, EngineError> {
        self.submit_with_cancel(prompt, max_context, &CancellationToken::new())
            .await
    }

    /// Queue a generation. `cancel` is honored while waiting for the session
    /// and while generating; either way the session is released.
    pub async fn submit_with_cancel(
        &self,
        prompt: &str,
        max_context: usize,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled { brain: self.brain });
        }

        let waiting = CounterGuard::enter(&self.queued);
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(brain = %self.brain, "request cancelled while queued");
                return Err(EngineError::Cancelled { brain: self.brain });
            }
            session = self.session.lock() => session,
        };
        drop(waiting);

        if !self.is_ready() || !session.backend.is_loaded() {
            return Err(EngineError::Unavailable {
                brain: self.brain,
                reason: "no model loaded".to_string(),
            });
        }

        let _busy = FlagGuard::raise(&self.busy);
        let started = Instant::now();
        tracing::debug!(brain = %self.brain, prompt_chars = prompt.len(), "generation started");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled { brain: self.brain }),
            result = tokio::time::timeout(self.deadline, session.backend.generate(prompt, max_context)) => {
                match result {
                    Err(_) => Err(EngineError::Timeout { brain: self.brain, deadline: self.deadline }),
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(BackendError::NotLoaded)) => Err(EngineError::Unavailable {
                        brain: self.brain,
                        reason: BackendError::NotLoaded.to_string(),
                    }),
                    Ok(Err(err)) => Err(EngineError::Backend { brain: self.brain, message: err.to_string() }),
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(text) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(brain = %self.brain, elapsed_ms, reply_chars = text.len(), "generation finished");
            }
            Err(EngineError::Timeout { .. }) => {
                tracing::warn!(brain = %self.brain, elapsed_ms, "generation timed out");
            }
            Err(EngineError::Cancelled { .. }) => {
                tracing::debug!(brain = %self.brain, elapsed_ms, "generation cancelled");
            }
            Err(err) => {
                tracing::warn!(brain = %self.brain, error = %err, "generation failed");
            }
        }
        outcome
    }
}

struct CounterGuard<'a>(&'a AtomicUsize);

impl<'a> CounterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
