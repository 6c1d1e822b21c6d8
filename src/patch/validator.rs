//! Patch Validator: pure structural checks run before any mutation.
//!
//! # Hard rules
//!
//! 1. **Anchors exist** in the buffer being patched. INSERT points have not
//!    moved and REPLACE/DELETE ranges cover the same lines as when the batch
//!    was resolved.
//! 2. **No overlap** between operations of one batch, whatever their kind.
//! 3. **Delimiter balance** of written lines matches the lines they replace,
//!    when the language can be classified.
//!
//! Any failure rejects the whole batch.

use crate::feeder::{CodeBuffer, LineId};
use crate::lang;
use crate::patch::delimiters;
use crate::patch::operation::{PatchBatch, PatchOperation};
use crate::patch::rejection::RejectReason;
use std::fmt;

const SNIFF_LINES: usize = 200;

/// Outcome of validating a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted {
        warnings: Vec<ValidationWarning>,
    },
    Rejected {
        reason: RejectReason,
        offending_operation: Option<usize>,
    },
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted { .. })
    }
}

/// Non-blocking findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Language unknown; delimiter balance was not checked.
    UnclassifiedLanguage,
    /// Re-parsing the edited buffer found syntax errors that were not there before.
    SyntaxRegression { language: String, new_errors: usize },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::UnclassifiedLanguage => {
                write!(f, "could not classify language; delimiter check skipped")
            }
            ValidationWarning::SyntaxRegression {
                language,
                new_errors,
            } => write!(f, "{language} parser reports {new_errors} new syntax error(s)"),
        }
    }
}

/// Where an operation sits, in half-line coordinates: the line at position
/// `p` covers `2p + 1`; an INSERT after `p` covers `[2p + 1, 2p + 2]`; an
/// INSERT at the start covers `[0, 0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub lo: usize,
    pub hi: usize,
}

impl Footprint {
    fn overlaps(&self, other: &Footprint) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }
}

/// Locate one operation in `buffer`, checking its anchors.
pub fn footprint(op: &PatchOperation, buffer: &CodeBuffer) -> Result<Footprint, RejectReason> {
    let position = |id: LineId| {
        buffer
            .position(id)
            .ok_or_else(|| RejectReason::StaleAnchor(format!("anchor {id} no longer exists")))
    };

    match op {
        PatchOperation::Insert { after: None, .. } => Ok(Footprint { lo: 0, hi: 0 }),
        PatchOperation::Insert { after: Some(a), .. } => {
            let p = position(*a)?;
            Ok(Footprint {
                lo: 2 * p + 1,
                hi: 2 * p + 2,
            })
        }
        PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } => {
            let s = position(*start)?;
            let e = position(*end)?;
            if s > e {
                return Err(RejectReason::ValidationFailed(format!(
                    "inverted range {start}..{end}"
                )));
            }
            Ok(Footprint {
                lo: 2 * s + 1,
                hi: 2 * e + 1,
            })
        }
    }
}

/// Run every check of `batch` against `buffer`.
pub fn validate(batch: &PatchBatch, buffer: &CodeBuffer) -> ValidationResult {
    if batch.is_empty() {
        return reject(RejectReason::ValidationFailed("batch has no operations".into()), None);
    }

    let mut footprints = Vec::with_capacity(batch.len());
    for (index, op) in batch.operations.iter().enumerate() {
        match footprint(op, buffer) {
            Ok(fp) => footprints.push((fp, index)),
            Err(reason) => return reject(reason, Some(index)),
        }
        if let Err(reason) = check_guard(batch, index, op, buffer) {
            return reject(reason, Some(index));
        }
        if let Err(reason) = check_range(batch, index, op, buffer) {
            return reject(reason, Some(index));
        }
    }

    if let Some((first, second)) = first_overlap(&footprints) {
        return reject(RejectReason::OverlappingEdits { first, second }, Some(second));
    }

    let mut warnings = Vec::new();
    match classify(buffer) {
        Some(language) => {
            let syntax = lang::syntax_of(language);
            for (index, op) in batch.operations.iter().enumerate() {
                let removed = removed_lines(op, buffer);
                let before = delimiters::balance(syntax, &removed);
                let after = delimiters::balance(syntax, op.new_lines());
                if before != after {
                    return reject(
                        RejectReason::ValidationFailed(format!(
                            "unbalanced delimiters in {} operation: lines removed have {before}, lines written have {after}",
                            op.kind()
                        )),
                        Some(index),
                    );
                }
            }
        }
        None => warnings.push(ValidationWarning::UnclassifiedLanguage),
    }

    ValidationResult::Accepted { warnings }
}

/// Language of the buffer, from its source path or its first lines.
pub fn classify(buffer: &CodeBuffer) -> Option<lang::SupportLang> {
    let head = buffer
        .iter()
        .take(SNIFF_LINES)
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n");
    lang::classify(buffer.source(), &head)
}

fn check_guard(
    batch: &PatchBatch,
    index: usize,
    op: &PatchOperation,
    buffer: &CodeBuffer,
) -> Result<(), RejectReason> {
    let Some(guard) = batch.guard_for(index) else {
        return Ok(());
    };
    let (actual, label) = match op {
        PatchOperation::Insert { after: Some(a), .. } => (buffer.successor(*a), format!("after {a}")),
        PatchOperation::Insert { after: None, .. } => (buffer.first(), "at start".to_string()),
        _ => return Ok(()),
    };
    if actual != guard.expected_next {
        return Err(RejectReason::StaleAnchor(format!(
            "insertion point {label} has moved (expected next line {}, found {})",
            describe(guard.expected_next),
            describe(actual)
        )));
    }
    Ok(())
}

fn check_range(
    batch: &PatchBatch,
    index: usize,
    op: &PatchOperation,
    buffer: &CodeBuffer,
) -> Result<(), RejectReason> {
    let Some(guard) = batch.range_for(index) else {
        return Ok(());
    };
    let (PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end }) = op else {
        return Ok(());
    };
    let (Some(s), Some(e)) = (buffer.position(*start), buffer.position(*end)) else {
        return Ok(());
    };
    if s > e {
        return Ok(());
    }
    let live = &buffer.ids()[s..=e];
    if live != guard.members.as_slice() {
        return Err(RejectReason::StaleAnchor(format!(
            "range {start}..{end} changed since {} (was {} lines, now {})",
            batch.base_version,
            guard.members.len(),
            live.len()
        )));
    }
    Ok(())
}

fn describe(id: Option<LineId>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "end of buffer".to_string())
}

fn first_overlap(footprints: &[(Footprint, usize)]) -> Option<(usize, usize)> {
    let mut sorted: Vec<(Footprint, usize)> = footprints.to_vec();
    sorted.sort_by_key(|(fp, index)| (fp.lo, *index));

    let mut widest: Option<(Footprint, usize)> = None;
    for (fp, index) in sorted {
        if let Some((prev, prev_index)) = widest {
            if prev.overlaps(&fp) {
                return Some((prev_index.min(index), prev_index.max(index)));
            }
            if fp.hi > prev.hi {
                widest = Some((fp, index));
            }
        } else {
            widest = Some((fp, index));
        }
    }
    None
}

fn removed_lines<'a>(op: &PatchOperation, buffer: &'a CodeBuffer) -> Vec<&'a str> {
    match op {
        PatchOperation::Insert { .. } => Vec::new(),
        PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } => {
            match (buffer.position(*start), buffer.position(*end)) {
                (Some(s), Some(e)) if s <= e => buffer.lines_in(s, e),
                _ => Vec::new(),
            }
        }
    }
}

fn reject(reason: RejectReason, offending_operation: Option<usize>) -> ValidationResult {
    ValidationResult::Rejected {
        reason,
        offending_operation,
    }
}
