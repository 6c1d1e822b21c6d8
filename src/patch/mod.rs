//! Autopatcher Core and its helpers.
//!
//! A model completion flows through [`parser`] (blocks to operations),
//! [`validator`] (anchors, overlap, delimiters) and finally
//! [`Autopatcher::apply_batch`], which commits through the feeder's single
//! write transaction or rejects the whole batch.

pub mod autopatcher;
pub mod delimiters;
pub mod operation;
pub mod parser;
pub mod rejection;
pub mod validator;

pub use autopatcher::{Autopatcher, Commit, PatchOutcome};
pub use operation::{InsertGuard, OperationKind, PatchBatch, PatchOperation, PatchRequest, RangeGuard};
pub use parser::{contains_patch, BLOCK_END, BLOCK_START};
pub use rejection::{RejectReason, Rejection, Stage};
pub use validator::{validate, ValidationResult, ValidationWarning};
