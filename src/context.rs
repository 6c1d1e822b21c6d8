//! `LabContext`: everything a cockpit session needs, created in one place
//! and torn down in one place.
//!
//! Startup loads both engines and the buffer. A brain whose model fails to
//! load stays unavailable (its requests fail with `EngineUnavailable`); the
//! other brain and the buffer keep working.

use crate::brain::Brain;
use crate::config::LabConfig;
use crate::engine::{EngineAdapter, EngineError, EngineStatus};
use crate::feeder::{CodeBuffer, CodeFeeder};
use crate::journal::Journal;
use crate::patch::{Autopatcher, PatchOutcome};
use crate::router::{Dispatch, HelperRouter};
use crate::save::{self, SaveError, SaveMode};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("invalid router keywords: {0}")]
    Router(#[from] regex::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("buffer has no source file to save to")]
    NoSource,
}

/// One user turn: the engine's reply and, for patches, what became of them.
#[derive(Debug, Clone)]
pub struct Turn {
    pub dispatch: Dispatch,
    pub outcome: Option<PatchOutcome>,
}

pub struct LabContext {
    config: LabConfig,
    feeder: Arc<CodeFeeder>,
    router: HelperRouter,
    autopatcher: Autopatcher,
}

impl LabContext {
    /// Build engines from `config` and start.
    pub async fn start(
        config: LabConfig,
        buffer_text: &str,
        source: Option<PathBuf>,
    ) -> Result<Self, ContextError> {
        let scriptor = EngineAdapter::from_config(Brain::Scriptor, &config.engines.scriptor);
        let master = EngineAdapter::from_config(Brain::Master, &config.engines.master);
        Self::start_with_engines(config, scriptor, master, buffer_text, source).await
    }

    /// Start with caller-supplied engines.
    pub async fn start_with_engines(
        config: LabConfig,
        scriptor: EngineAdapter,
        master: EngineAdapter,
        buffer_text: &str,
        source: Option<PathBuf>,
    ) -> Result<Self, ContextError> {
        let scriptor = Arc::new(scriptor);
        let master = Arc::new(master);

        let (s, m) = tokio::join!(scriptor.load(), master.load());
        for result in [s, m] {
            if let Err(err) = result {
                tracing::warn!(brain = %err.brain(), error = %err, "engine left unavailable");
            }
        }

        let mut buffer = CodeBuffer::load(buffer_text);
        if let Some(path) = source {
            buffer = buffer.with_source(path);
        }
        let feeder = Arc::new(CodeFeeder::new(buffer).with_history_depth(config.feeder.history_depth));

        let mut router = HelperRouter::new(&config, scriptor, master, Arc::clone(&feeder))?;
        if let Some(journal) = open_journal(&config) {
            router = router.with_journal(journal);
        }
        let autopatcher = Autopatcher::new(Arc::clone(&feeder));

        tracing::info!(
            lines = feeder.snapshot().len(),
            scriptor_ready = router.engine(Brain::Scriptor).is_ready(),
            master_ready = router.engine(Brain::Master).is_ready(),
            "cockpit started"
        );
        Ok(Self {
            config,
            feeder,
            router,
            autopatcher,
        })
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn feeder(&self) -> &Arc<CodeFeeder> {
        &self.feeder
    }

    pub fn router(&self) -> &HelperRouter {
        &self.router
    }

    pub fn autopatcher(&self) -> &Autopatcher {
        &self.autopatcher
    }

    pub fn status(&self) -> Vec<EngineStatus> {
        Brain::ALL
            .iter()
            .map(|brain| self.router.engine(*brain).status())
            .collect()
    }

    /// Classify, dispatch, and apply a returned patch.
    pub async fn ask(&self, input: &str) -> Result<Turn, EngineError> {
        self.ask_with(None, input, true, &CancellationToken::new())
            .await
    }

    /// `brain` overrides classification; `apply` off returns patches unapplied.
    pub async fn ask_with(
        &self,
        brain: Option<Brain>,
        input: &str,
        apply: bool,
        cancel: &CancellationToken,
    ) -> Result<Turn, EngineError> {
        let dispatch = match brain {
            Some(brain) => {
                self.router
                    .dispatch_to_with_cancel(brain, input, cancel)
                    .await?
            }
            None => self.router.dispatch_with_cancel(input, cancel).await?,
        };

        let outcome = match dispatch.patch() {
            Some(request) if apply => {
                // A cancel that lands after generation still wins over the apply.
                if cancel.is_cancelled() {
                    tracing::info!(brain = %dispatch.brain, "request cancelled; patch discarded");
                    return Err(EngineError::Cancelled {
                        brain: dispatch.brain,
                    });
                }
                Some(self.autopatcher.apply(request))
            }
            _ => None,
        };
        Ok(Turn { dispatch, outcome })
    }

    /// Write the live buffer to its source file, or to a timestamped copy.
    pub fn save(&self, mode: SaveMode) -> Result<PathBuf, ContextError> {
        let snapshot = self.feeder.snapshot();
        let source = snapshot.source().ok_or(ContextError::NoSource)?;
        Ok(save::save(source, &snapshot.serialize(), mode)?)
    }

    /// Release both engines.
    pub async fn shutdown(self) {
        tokio::join!(
            self.router.engine(Brain::Scriptor).unload(),
            self.router.engine(Brain::Master).unload()
        );
        tracing::info!("cockpit shut down");
    }
}

fn open_journal(config: &LabConfig) -> Option<Journal> {
    let dir = config.state.resolve_dir()?;
    match Journal::in_dir(&dir) {
        Ok(journal) => Some(journal),
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "journal disabled");
            None
        }
    }
}
