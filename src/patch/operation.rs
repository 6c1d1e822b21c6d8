use crate::brain::Brain;
use crate::feeder::{BufferVersion, CodeBuffer, LineId, LineSpan};
use serde::Serialize;
use std::fmt;

/// One atomic edit intent against LineId anchors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Insert `lines` after `after`, or at the very start when `after` is `None`.
    Insert {
        after: Option<LineId>,
        lines: Vec<String>,
    },
    /// Replace `start..=end` with `lines`.
    Replace {
        start: LineId,
        end: LineId,
        lines: Vec<String>,
    },
    /// Remove `start..=end`.
    Delete { start: LineId, end: LineId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Replace,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Replace => "REPLACE",
            OperationKind::Delete => "DELETE",
        })
    }
}

impl PatchOperation {
    pub fn insert_after(after: LineId, lines: Vec<String>) -> Self {
        PatchOperation::Insert {
            after: Some(after),
            lines,
        }
    }

    pub fn insert_at_start(lines: Vec<String>) -> Self {
        PatchOperation::Insert { after: None, lines }
    }

    pub fn replace(start: LineId, end: LineId, lines: Vec<String>) -> Self {
        PatchOperation::Replace { start, end, lines }
    }

    pub fn delete(start: LineId, end: LineId) -> Self {
        PatchOperation::Delete { start, end }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            PatchOperation::Insert { .. } => OperationKind::Insert,
            PatchOperation::Replace { .. } => OperationKind::Replace,
            PatchOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Every LineId this operation refers to.
    pub fn anchors(&self) -> Vec<LineId> {
        match self {
            PatchOperation::Insert { after, .. } => after.iter().copied().collect(),
            PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } => {
                vec![*start, *end]
            }
        }
    }

    /// Lines this operation writes into the buffer.
    pub fn new_lines(&self) -> &[String] {
        match self {
            PatchOperation::Insert { lines, .. } | PatchOperation::Replace { lines, .. } => lines,
            PatchOperation::Delete { .. } => &[],
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOperation::Insert { after: Some(id), lines } => {
                write!(f, "INSERT AFTER {id} (+{} lines)", lines.len())
            }
            PatchOperation::Insert { after: None, lines } => {
                write!(f, "INSERT AT START (+{} lines)", lines.len())
            }
            PatchOperation::Replace { start, end, lines } => {
                write!(f, "REPLACE {start}..{end} (+{} lines)", lines.len())
            }
            PatchOperation::Delete { start, end } => write!(f, "DELETE {start}..{end}"),
        }
    }
}

/// Raw completion text returned by an engine, tagged with who produced it
/// and which buffer version it was generated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRequest {
    pub brain: Brain,
    pub base_version: BufferVersion,
    pub text: String,
}

impl PatchRequest {
    pub fn new(brain: Brain, base_version: BufferVersion, text: impl Into<String>) -> Self {
        Self {
            brain,
            base_version,
            text: text.into(),
        }
    }
}

/// Records which line followed an INSERT's anchor when the batch was
/// resolved, so a moved insertion point is caught as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertGuard {
    pub op_index: usize,
    pub expected_next: Option<LineId>,
}

/// Records the exact lines a REPLACE/DELETE covered when the batch was
/// resolved, so a line added inside the range later is caught as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeGuard {
    pub op_index: usize,
    pub members: Vec<LineId>,
}

/// Ordered operations resolved against one buffer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBatch {
    pub base_version: BufferVersion,
    pub operations: Vec<PatchOperation>,
    pub guards: Vec<InsertGuard>,
    pub ranges: Vec<RangeGuard>,
}

impl PatchBatch {
    /// Resolve insertion and range guards for `operations` against `buffer`,
    /// the state the operations were written for.
    pub fn resolve(buffer: &CodeBuffer, operations: Vec<PatchOperation>) -> Self {
        let guards = operations
            .iter()
            .enumerate()
            .filter_map(|(op_index, op)| match op {
                PatchOperation::Insert { after: Some(a), .. } => Some(InsertGuard {
                    op_index,
                    expected_next: buffer.successor(*a),
                }),
                PatchOperation::Insert { after: None, .. } => Some(InsertGuard {
                    op_index,
                    expected_next: buffer.first(),
                }),
                _ => None,
            })
            .collect();
        let ranges = operations
            .iter()
            .enumerate()
            .filter_map(|(op_index, op)| match op {
                PatchOperation::Replace { start, end, .. } | PatchOperation::Delete { start, end } => {
                    let (s, e) = buffer.span_positions(LineSpan::new(*start, *end)).ok()?;
                    Some(RangeGuard {
                        op_index,
                        members: buffer.ids()[s..=e].to_vec(),
                    })
                }
                PatchOperation::Insert { .. } => None,
            })
            .collect();
        Self {
            base_version: buffer.version(),
            operations,
            guards,
            ranges,
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn guard_for(&self, op_index: usize) -> Option<&InsertGuard> {
        self.guards.iter().find(|g| g.op_index == op_index)
    }

    pub fn range_for(&self, op_index: usize) -> Option<&RangeGuard> {
        self.ranges.iter().find(|r| r.op_index == op_index)
    }
}
