//! Helper Router: picks a brain, builds its prompt, and tags the reply with
//! the buffer version captured at dispatch time.
//!
//! Each brain has its own adapter and queue, so a Scriptor and a Master
//! request generate concurrently while two requests to the same brain run
//! one after the other. Engine errors pass through unchanged; nothing is
//! retried here.

pub mod classify;
pub mod prompt;

pub use classify::{Classifier, Scores};
pub use prompt::{clean_markdown, strip_control_chars, PATCH_INSTRUCTIONS};

use crate::brain::Brain;
use crate::config::LabConfig;
use crate::engine::{EngineAdapter, EngineError};
use crate::feeder::{BufferVersion, Budget, CodeFeeder};
use crate::journal::{Journal, Speaker};
use crate::patch::{contains_patch, PatchRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What came back from an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Conversational answer, markdown fences removed.
    Plain(String),
    /// Completion carrying patch blocks, ready for the autopatcher.
    Patch(PatchRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub brain: Brain,
    /// Buffer version the prompt was built from.
    pub version: BufferVersion,
    pub reply: Reply,
}

impl Dispatch {
    pub fn text(&self) -> &str {
        match &self.reply {
            Reply::Plain(text) => text,
            Reply::Patch(request) => &request.text,
        }
    }

    pub fn patch(&self) -> Option<&PatchRequest> {
        match &self.reply {
            Reply::Patch(request) => Some(request),
            Reply::Plain(_) => None,
        }
    }
}

pub struct HelperRouter {
    classifier: Classifier,
    scriptor: Arc<EngineAdapter>,
    master: Arc<EngineAdapter>,
    feeder: Arc<CodeFeeder>,
    chunk_chars: usize,
    journal: Option<Journal>,
}

impl HelperRouter {
    pub fn new(
        config: &LabConfig,
        scriptor: Arc<EngineAdapter>,
        master: Arc<EngineAdapter>,
        feeder: Arc<CodeFeeder>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            classifier: Classifier::new(&config.router)?,
            scriptor,
            master,
            feeder,
            chunk_chars: config.feeder.chunk_chars,
            journal: None,
        })
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn classify(&self, input: &str) -> Brain {
        self.classifier.classify(input)
    }

    pub fn engine(&self, brain: Brain) -> &Arc<EngineAdapter> {
        match brain {
            Brain::Scriptor => &self.scriptor,
            Brain::Master => &self.master,
        }
    }

    pub fn feeder(&self) -> &Arc<CodeFeeder> {
        &self.feeder
    }

    /// Prompt for `brain` against the current buffer, and the version it was built from.
    pub fn build_prompt(&self, brain: Brain, input: &str) -> (String, BufferVersion) {
        let snapshot = self.feeder.snapshot();
        let prompt = match brain {
            Brain::Scriptor => {
                let budget = prompt::window_budget(self.engine(brain).max_context(), input)
                    .min(self.chunk_chars);
                match snapshot.window(None, Budget::Chars(budget)) {
                    Ok(window) => prompt::scriptor_prompt(input, Some(&window)),
                    Err(err) => {
                        tracing::warn!(error = %err, "could not window buffer; sending request alone");
                        prompt::scriptor_prompt(input, None)
                    }
                }
            }
            Brain::Master => prompt::master_prompt(input, &snapshot),
        };
        (prompt, snapshot.version())
    }

    pub async fn dispatch(&self, input: &str) -> Result<Dispatch, EngineError> {
        self.dispatch_with_cancel(input, &CancellationToken::new())
            .await
    }

    pub async fn dispatch_with_cancel(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Dispatch, EngineError> {
        let brain = self.classify(input);
        self.dispatch_to_with_cancel(brain, input, cancel).await
    }

    pub async fn dispatch_to(&self, brain: Brain, input: &str) -> Result<Dispatch, EngineError> {
        self.dispatch_to_with_cancel(brain, input, &CancellationToken::new())
            .await
    }

    /// Send `input` to `brain`. A busy brain queues the request; it is never dropped.
    pub async fn dispatch_to_with_cancel(
        &self,
        brain: Brain,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Dispatch, EngineError> {
        let engine = self.engine(brain);
        let (prompt, version) = self.build_prompt(brain, input);

        let status = engine.status();
        if status.busy {
            tracing::info!(brain = %brain, queued = status.queued, "still thinking; request queued");
        }
        tracing::info!(brain = %brain, version = %version, "dispatching request");
        if let Some(journal) = &self.journal {
            journal.record(brain, Speaker::User, input);
        }

        let completion = engine
            .submit_with_cancel(&prompt, engine.max_context(), cancel)
            .await?;
        let completion = strip_control_chars(&completion);

        if let Some(journal) = &self.journal {
            journal.record(brain, Speaker::Ai, &completion);
        }

        let reply = if contains_patch(&completion) {
            Reply::Patch(PatchRequest::new(brain, version, completion))
        } else {
            Reply::Plain(clean_markdown(&completion))
        };
        Ok(Dispatch {
            brain,
            version,
            reply,
        })
    }
}
