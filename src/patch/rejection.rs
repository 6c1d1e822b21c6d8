use std::fmt;
use thiserror::Error;

/// Why a patch batch was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("malformed patch: {0}")]
    MalformedPatch(String),

    #[error("stale anchor: {0}")]
    StaleAnchor(String),

    #[error("operations {first} and {second} target overlapping lines")]
    OverlappingEdits { first: usize, second: usize },

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl RejectReason {
    pub fn is_stale(&self) -> bool {
        matches!(self, RejectReason::StaleAnchor(_))
    }
}

/// Autopatcher state reached when a batch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    Validating,
    Applying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parsing => "parsing",
            Stage::Validating => "validating",
            Stage::Applying => "applying",
        })
    }
}

/// Terminal failure of one patch attempt. The buffer is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("patch rejected while {stage}: {reason}{}", offending_suffix(.offending_operation))]
pub struct Rejection {
    pub stage: Stage,
    pub reason: RejectReason,
    pub offending_operation: Option<usize>,
}

fn offending_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (operation {i})"),
        None => String::new(),
    }
}

impl Rejection {
    pub fn new(stage: Stage, reason: RejectReason, offending_operation: Option<usize>) -> Self {
        Self {
            stage,
            reason,
            offending_operation,
        }
    }
}
