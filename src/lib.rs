//! Lab Cockpit: a two-brain local coding assistant core.
//!
//! A fast coding model (Scriptor) and a slower reasoning model (Master) work
//! against one shared, line-addressed code buffer. Models never see or emit
//! raw offsets: every line carries a stable [`LineId`] and edits arrive as
//! small patch blocks that name those ids.
//!
//! # Architecture
//!
//! - [`feeder`] owns the canonical buffer, versions every commit, and cuts
//!   budget-sized windows for prompts.
//! - [`patch`] parses patch blocks, validates them against the buffer
//!   snapshot, and commits the whole batch or nothing.
//! - [`engine`] serializes inference per brain behind a FIFO queue with a
//!   deadline and cancellation.
//! - [`router`] picks a brain for each request and builds its prompt.
//! - [`context`] wires the pieces into one session.
//!
//! # Safety
//!
//! - Stale or ambiguous anchors reject the batch; nothing is guessed
//! - A rejected batch leaves the buffer and its version untouched
//! - One writer at a time; readers always see a committed version
//! - Saves are atomic (tempfile + fsync + rename)
//!
//! # Example
//!
//! ```no_run
//! use lab_cockpit::brain::Brain;
//! use lab_cockpit::feeder::CodeFeeder;
//! use lab_cockpit::patch::{Autopatcher, PatchRequest};
//! use std::sync::Arc;
//!
//! let feeder = Arc::new(CodeFeeder::load_buffer("a\nb\nc\n"));
//! let patcher = Autopatcher::new(Arc::clone(&feeder));
//! let request = PatchRequest::new(
//!     Brain::Scriptor,
//!     feeder.snapshot_version(),
//!     "<<<PATCH\nREPLACE #2\nB\nPATCH>>>",
//! );
//!
//! match patcher.apply(&request) {
//!     outcome if outcome.is_committed() => println!("{}", feeder.serialize()),
//!     outcome => eprintln!("{:?}", outcome.rejection()),
//! }
//! ```

pub mod brain;
pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod feeder;
pub mod journal;
pub mod lang;
pub mod patch;
pub mod router;
pub mod save;

// Re-exports
pub use brain::Brain;
pub use config::{load_from_path, load_from_str, load_or_default, ConfigError, LabConfig};
pub use context::{ContextError, LabContext, Turn};
pub use engine::{EngineAdapter, EngineError, EngineStatus, InferenceBackend};
pub use events::{ChangeEvent, EditMapping};
pub use feeder::{
    BufferVersion, Budget, CodeBuffer, CodeFeeder, FeederError, LineId, LineSpan, Window,
};
pub use patch::{
    Autopatcher, Commit, PatchOutcome, PatchRequest, RejectReason, Rejection, ValidationResult,
};
pub use router::{Dispatch, HelperRouter, Reply};
pub use save::{SaveError, SaveMode};
