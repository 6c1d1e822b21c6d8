//! Autopatcher Core: completion text in, committed buffer version out.
//!
//! ```text
//! Idle -> Parsing -> Validating -> Applying -> Committed
//!            \            \            \
//!             +------------+------------+--> Rejected
//! ```
//!
//! Validation and apply both run inside one feeder write transaction, so the
//! batch is checked against exactly the state it is applied to. Nothing
//! reaches the live buffer unless every operation succeeded.

use crate::events::{ChangeEvent, EditMapping};
use crate::feeder::{BufferVersion, CodeBuffer, CodeFeeder, LineId, LineSpan};
use crate::lang;
use crate::patch::operation::{PatchBatch, PatchOperation, PatchRequest};
use crate::patch::parser;
use crate::patch::rejection::{RejectReason, Rejection, Stage};
use crate::patch::validator::{self, ValidationResult, ValidationWarning};
use std::sync::{Arc, Mutex, PoisonError};

/// A successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub version: BufferVersion,
    pub event: ChangeEvent,
    pub warnings: Vec<ValidationWarning>,
    /// Number of operations applied.
    pub operations: usize,
}

/// Terminal state of one patch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Committed(Commit),
    Rejected(Rejection),
}

impl PatchOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, PatchOutcome::Committed(_))
    }

    pub fn version(&self) -> Option<BufferVersion> {
        match self {
            PatchOutcome::Committed(commit) => Some(commit.version),
            PatchOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            PatchOutcome::Committed(_) => None,
            PatchOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Autopatcher {
    feeder: Arc<CodeFeeder>,
    syntax_check: bool,
    /// Syntax error count of the last version this patcher re-parsed.
    syntax_baseline: Arc<Mutex<Option<(BufferVersion, usize)>>>,
}

impl Autopatcher {
    pub fn new(feeder: Arc<CodeFeeder>) -> Self {
        Self {
            feeder,
            syntax_check: true,
            syntax_baseline: Arc::new(Mutex::new(None)),
        }
    }

    /// Toggle the tree-sitter re-parse after commit (warning only).
    pub fn with_syntax_check(mut self, enabled: bool) -> Self {
        self.syntax_check = enabled;
        self
    }

    pub fn feeder(&self) -> &Arc<CodeFeeder> {
        &self.feeder
    }

    /// Parse a completion into a batch resolved against the buffer version it
    /// was generated for. Validation then checks that batch against the live
    /// buffer, so anything that moved since that version is caught as stale.
    pub fn prepare(&self, request: &PatchRequest) -> Result<PatchBatch, Rejection> {
        let live = self.feeder.snapshot_version();
        tracing::debug!(
            brain = %request.brain,
            base = %request.base_version,
            live = %live,
            "parsing completion"
        );
        let Some(base) = self.feeder.snapshot_at(request.base_version) else {
            return Err(Rejection::new(
                Stage::Validating,
                RejectReason::StaleAnchor(format!(
                    "completion was generated against {}, which is no longer retained (live is {live})",
                    request.base_version
                )),
                None,
            ));
        };
        if base.version() < live {
            tracing::debug!(
                brain = %request.brain,
                base = %base.version(),
                "resolving anchors against the version the completion saw"
            );
        }
        parser::parse(&request.text, &base)
    }

    /// Parse, validate, apply and commit a model completion.
    pub fn apply(&self, request: &PatchRequest) -> PatchOutcome {
        match self.prepare(request) {
            Ok(batch) => self.apply_batch(batch),
            Err(rejection) => rejected(rejection),
        }
    }

    /// Direct user edits go through the same transactional path as model patches.
    pub fn apply_user_edit(&self, operations: Vec<PatchOperation>) -> PatchOutcome {
        let batch = PatchBatch::resolve(&self.feeder.snapshot(), operations);
        self.apply_batch(batch)
    }

    /// Validate and commit an already-resolved batch.
    pub fn apply_batch(&self, batch: PatchBatch) -> PatchOutcome {
        let txn = self.feeder.begin();
        let base = Arc::clone(txn.base());

        tracing::debug!(
            operations = batch.len(),
            live = %base.version(),
            "validating patch batch"
        );
        let mut warnings = match validator::validate(&batch, &base) {
            ValidationResult::Accepted { warnings } => warnings,
            ValidationResult::Rejected {
                reason,
                offending_operation,
            } => return rejected(Rejection::new(Stage::Validating, reason, offending_operation)),
        };

        tracing::debug!(operations = batch.len(), "applying patch batch");
        let mut draft = txn.draft();
        let applied = match splice(&base, &batch, |text| draft.alloc(text)) {
            Ok(applied) => applied,
            Err(reason) => return rejected(Rejection::new(Stage::Applying, reason, None)),
        };
        draft.order = applied.order;

        if let Err(reason) = check_consistency(&base, &batch, draft.len()) {
            return rejected(Rejection::new(Stage::Applying, reason, None));
        }

        let operations = batch.len();
        match txn.commit(draft, applied.edits, applied.affected) {
            Ok(event) => {
                // Writer lock is released by now.
                if let Some(warning) = self.syntax_regression(&base, event.version) {
                    warnings.push(warning);
                }
                for warning in &warnings {
                    tracing::warn!(version = %event.version, "{warning}");
                }
                tracing::info!(
                    version = %event.version,
                    operations,
                    lines = event.line_count,
                    "patch committed"
                );
                PatchOutcome::Committed(Commit {
                    version: event.version,
                    event,
                    warnings,
                    operations,
                })
            }
            Err(err) => rejected(Rejection::new(
                Stage::Applying,
                RejectReason::ValidationFailed(err.to_string()),
                None,
            )),
        }
    }
}

impl Autopatcher {
    /// Compare tree-sitter error counts of `base` and the committed version.
    /// The committed count is cached as the next baseline, so consecutive
    /// commits parse each version once.
    fn syntax_regression(&self, base: &CodeBuffer, committed: BufferVersion) -> Option<ValidationWarning> {
        if !self.syntax_check {
            return None;
        }
        let language = validator::classify(base)?;
        let after = self.feeder.snapshot_at(committed)?;

        let cached = *self
            .syntax_baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = match cached {
            Some((version, count)) if version == base.version() => count,
            _ => lang::syntax_error_count(language, &base.serialize())?,
        };
        let now = lang::syntax_error_count(language, &after.serialize())?;
        *self
            .syntax_baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((committed, now));

        (now > before).then(|| ValidationWarning::SyntaxRegression {
            language: format!("{language:?}"),
            new_errors: now - before,
        })
    }
}

fn rejected(rejection: Rejection) -> PatchOutcome {
    tracing::warn!(
        stage = %rejection.stage,
        reason = %rejection.reason,
        operation = ?rejection.offending_operation,
        "patch rejected"
    );
    PatchOutcome::Rejected(rejection)
}

struct Spliced {
    order: Vec<LineId>,
    edits: Vec<EditMapping>,
    affected: Option<(usize, usize)>,
}

/// Rebuild the line order with every operation applied, in ascending
/// position order. `alloc` hands out ids for new lines.
fn splice<F>(base: &CodeBuffer, batch: &PatchBatch, mut alloc: F) -> Result<Spliced, RejectReason>
where
    F: FnMut(&str) -> LineId,
{
    let mut located = Vec::with_capacity(batch.len());
    for op in &batch.operations {
        located.push((validator::footprint(op, base)?, op));
    }
    located.sort_by_key(|(fp, _)| fp.lo);

    let old = base.ids();
    let mut order = Vec::with_capacity(old.len() + batch.operations.iter().map(|op| op.new_lines().len()).sum::<usize>());
    let mut edits = Vec::with_capacity(batch.len());
    let mut affected: Option<(usize, usize)> = None;
    let mut cursor = 0;

    for (_, op) in located {
        let (from, resume, removed) = match op {
            PatchOperation::Insert { after, .. } => {
                let at = match after {
                    Some(a) => position(base, *a)? + 1,
                    None => 0,
                };
                (at, at, None)
            }
            PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } => {
                let s = position(base, *start)?;
                let e = position(base, *end)?;
                (s, e + 1, Some(LineSpan::new(*start, *end)))
            }
        };
        if from < cursor {
            return Err(RejectReason::ValidationFailed(format!(
                "operation {op} lands before an earlier edit"
            )));
        }

        order.extend_from_slice(&old[cursor..from]);
        cursor = resume;

        let written_at = order.len();
        for line in op.new_lines() {
            order.push(alloc(line));
        }
        let written = order[written_at..]
            .first()
            .zip(order[written_at..].last())
            .map(|(f, l)| LineSpan::new(*f, *l));

        let touched = (written_at, order.len().saturating_sub(1).max(written_at));
        affected = Some(match affected {
            Some((lo, hi)) => (lo.min(touched.0), hi.max(touched.1)),
            None => touched,
        });
        edits.push(EditMapping {
            old: removed,
            new: written,
        });
    }
    order.extend_from_slice(&old[cursor.min(old.len())..]);

    Ok(Spliced {
        order,
        edits,
        affected,
    })
}

fn position(buffer: &CodeBuffer, id: LineId) -> Result<usize, RejectReason> {
    buffer
        .position(id)
        .ok_or_else(|| RejectReason::StaleAnchor(format!("anchor {id} no longer exists")))
}

fn check_consistency(base: &CodeBuffer, batch: &PatchBatch, produced: usize) -> Result<(), RejectReason> {
    let mut expected = base.len();
    for op in &batch.operations {
        expected += op.new_lines().len();
        if let PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } = op {
            let span = base
                .span_positions(LineSpan::new(*start, *end))
                .map_err(|err| RejectReason::ValidationFailed(err.to_string()))?;
            expected = expected.saturating_sub(span.1 - span.0 + 1);
        }
    }
    if expected != produced {
        return Err(RejectReason::ValidationFailed(format!(
            "consistency check failed: expected {expected} lines after apply, produced {produced}"
        )));
    }
    Ok(())
}
