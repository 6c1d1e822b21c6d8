//! Code Feeder: owns the canonical buffer and hands out consistent views.
//!
//! Readers clone an `Arc` of the last committed [`CodeBuffer`] and never see
//! a half-applied state. Writers go through [`CodeFeeder::begin`], which
//! holds the single-writer lock until the [`Transaction`] commits or drops.
//!
//! The last few committed versions stay reachable through
//! [`CodeFeeder::snapshot_at`], so a patch generated against an older
//! version can be resolved against exactly the text its model saw.

pub mod buffer;
pub mod errors;
pub mod window;

pub use buffer::{BufferVersion, CodeBuffer, LineEnding, LineId, LineSpan};
pub use errors::FeederError;
pub use window::{render_line, Budget, Window, WindowLine, CHARS_PER_TOKEN};

use crate::config::schema::DEFAULT_HISTORY_DEPTH;
use crate::events::{ChangeEvent, ChangeNotifier, EditMapping};
use buffer::BufferDraft;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Shared handle to one committed buffer state.
pub type BufferSnapshot = Arc<CodeBuffer>;

#[derive(Debug)]
pub struct CodeFeeder {
    live: RwLock<BufferSnapshot>,
    /// Recent committed snapshots, oldest first; the live one is the back.
    history: RwLock<VecDeque<BufferSnapshot>>,
    history_depth: usize,
    writer: Mutex<()>,
    notifier: ChangeNotifier,
}

impl CodeFeeder {
    pub fn new(buffer: CodeBuffer) -> Self {
        let live = Arc::new(buffer);
        Self {
            history: RwLock::new(VecDeque::from([Arc::clone(&live)])),
            live: RwLock::new(live),
            history_depth: DEFAULT_HISTORY_DEPTH,
            writer: Mutex::new(()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Keep at most `depth` committed versions (the live one included).
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth.max(1);
        let history = self
            .history
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        while history.len() > self.history_depth {
            history.pop_front();
        }
        self
    }

    /// Fresh feeder over `text` at version 0.
    pub fn load_buffer(text: &str) -> Self {
        Self::new(CodeBuffer::load(text))
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot_version(&self) -> BufferVersion {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version()
    }

    /// The committed state at `version`, if it is still in the history.
    pub fn snapshot_at(&self, version: BufferVersion) -> Option<BufferSnapshot> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|snapshot| snapshot.version() == version)
            .cloned()
    }

    pub fn window(&self, span: Option<LineSpan>, budget: Budget) -> Result<Window, FeederError> {
        self.snapshot().window(span, budget)
    }

    pub fn windows(
        &self,
        span: Option<LineSpan>,
        budget: Budget,
    ) -> Result<Vec<Window>, FeederError> {
        self.snapshot().windows(span, budget)
    }

    pub fn serialize(&self) -> String {
        self.snapshot().serialize()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    /// Take the single-writer lock. Blocks while another transaction is open.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();
        Transaction {
            feeder: self,
            _guard: guard,
            base,
        }
    }

    /// Replace the whole text (user opened another file). Committed as a
    /// normal version bump; ids continue from the old counter.
    pub fn reload(&self, text: &str) -> Result<BufferVersion, FeederError> {
        let txn = self.begin();
        let draft = txn.base.reloaded(text);
        let old = txn.base.first().zip(txn.base.last()).map(|(f, l)| LineSpan::new(f, l));
        let line_count = draft.order.len();
        let affected = if line_count == 0 { None } else { Some((0, line_count - 1)) };
        let new = draft
            .order
            .first()
            .zip(draft.order.last())
            .map(|(f, l)| LineSpan::new(*f, *l));
        let event = txn.commit(draft, vec![EditMapping { old, new }], affected)?;
        Ok(event.version)
    }

    fn publish(&self, next: CodeBuffer, event: ChangeEvent) {
        let next = Arc::new(next);
        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            history.push_back(Arc::clone(&next));
            while history.len() > self.history_depth {
                history.pop_front();
            }
        }
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.notifier.publish(event);
    }
}

/// An open write. Dropping it without [`Transaction::commit`] discards every
/// change: the live buffer and its version stay untouched.
pub struct Transaction<'a> {
    feeder: &'a CodeFeeder,
    _guard: MutexGuard<'a, ()>,
    base: BufferSnapshot,
}

impl<'a> Transaction<'a> {
    /// The committed state this transaction builds on.
    pub fn base(&self) -> &BufferSnapshot {
        &self.base
    }

    pub(crate) fn draft(&self) -> BufferDraft {
        self.base.draft()
    }

    /// Atomically publish `draft` as version `base + 1` and notify subscribers.
    ///
    /// `affected` is the inclusive position range, in the new buffer, that the
    /// edits touched.
    pub(crate) fn commit(
        self,
        draft: BufferDraft,
        edits: Vec<EditMapping>,
        affected: Option<(usize, usize)>,
    ) -> Result<ChangeEvent, FeederError> {
        let version = self.base.version().next();
        let next = draft.finish(version)?;

        let affected = affected.and_then(|(start, end)| {
            let last = next.len().checked_sub(1)?;
            let first = next.id_at(start.min(last))?;
            let last = next.id_at(end.min(last))?;
            Some(LineSpan::new(first, last))
        });
        let event = ChangeEvent {
            version,
            affected,
            line_count: next.len(),
            edits,
        };

        tracing::debug!(
            version = version.0,
            lines = next.len(),
            "committing buffer version"
        );
        self.feeder.publish(next, event.clone());
        Ok(event)
    }
}
