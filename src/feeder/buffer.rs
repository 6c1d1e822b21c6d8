//! Line arena with stable identities.
//!
//! Every line gets a [`LineId`] from an ever-incrementing counter when it
//! enters the buffer. Positions are derived: the position index is rebuilt
//! whenever a new buffer state is produced, so an id keeps naming the same
//! line no matter what is inserted or deleted around it.

use crate::feeder::errors::FeederError;
use crate::feeder::window::{Budget, Window};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identifier of a buffer line. Never reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub u64);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic counter identifying a committed buffer state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BufferVersion(pub u64);

impl BufferVersion {
    pub fn next(self) -> Self {
        BufferVersion(self.0 + 1)
    }
}

impl fmt::Display for BufferVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Inclusive range of lines named by their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    pub first: LineId,
    pub last: LineId,
}

impl LineSpan {
    pub fn new(first: LineId, last: LineId) -> Self {
        Self { first, last }
    }

    pub fn single(id: LineId) -> Self {
        Self {
            first: id,
            last: id,
        }
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}..{}", self.first, self.last)
        }
    }
}

/// Line terminator written back by `serialize`, taken from the first line
/// break of the loaded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(pos) if text[..pos].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A committed buffer state: ordered line ids over an arena of line texts.
#[derive(Debug, Clone)]
pub struct CodeBuffer {
    order: Vec<LineId>,
    arena: HashMap<LineId, Arc<str>>,
    positions: HashMap<LineId, usize>,
    next_id: u64,
    version: BufferVersion,
    trailing_newline: bool,
    line_ending: LineEnding,
    source: Option<PathBuf>,
}

impl CodeBuffer {
    /// Split `text` into lines, assign sequential ids starting at 1, version 0.
    ///
    /// Line texts never carry their terminator. In a CRLF buffer the `\r` of
    /// each `\r\n` is dropped; any other `\r` stays part of the line, so
    /// `serialize` gives back the loaded text.
    pub fn load(text: &str) -> Self {
        let trailing_newline = text.ends_with('\n');
        let line_ending = LineEnding::detect(text);
        let body = text.strip_suffix('\n').unwrap_or(text);

        let mut order = Vec::new();
        let mut arena = HashMap::new();
        let mut next_id = 1;

        if !text.is_empty() {
            let segments: Vec<&str> = body.split('\n').collect();
            let last = segments.len() - 1;
            for (idx, segment) in segments.into_iter().enumerate() {
                let terminated = idx < last || trailing_newline;
                let line = match line_ending {
                    LineEnding::CrLf if terminated => segment.strip_suffix('\r').unwrap_or(segment),
                    _ => segment,
                };
                let id = LineId(next_id);
                next_id += 1;
                order.push(id);
                arena.insert(id, Arc::from(line));
            }
        }

        let positions = index_positions(&order);
        Self {
            order,
            arena,
            positions,
            next_id,
            version: BufferVersion::default(),
            trailing_newline,
            line_ending,
            source: None,
        }
    }

    /// Attach the path the text was read from (used for language detection).
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn version(&self) -> BufferVersion {
        self.version
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: LineId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Current zero-based position of a line.
    pub fn position(&self, id: LineId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn text(&self, id: LineId) -> Option<&str> {
        self.arena.get(&id).map(|t| t.as_ref())
    }

    pub fn id_at(&self, position: usize) -> Option<LineId> {
        self.order.get(position).copied()
    }

    pub fn first(&self) -> Option<LineId> {
        self.order.first().copied()
    }

    pub fn last(&self) -> Option<LineId> {
        self.order.last().copied()
    }

    /// The line directly after `id`, if any.
    pub fn successor(&self, id: LineId) -> Option<LineId> {
        self.position(id).and_then(|pos| self.id_at(pos + 1))
    }

    pub fn ids(&self) -> &[LineId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (LineId, &str)> + '_ {
        self.order
            .iter()
            .map(move |id| (*id, self.arena.get(id).map(|t| t.as_ref()).unwrap_or("")))
    }

    /// Lines `first..=last` in buffer order, or an error if the span is unknown.
    pub fn span_positions(&self, span: LineSpan) -> Result<(usize, usize), FeederError> {
        let start = self
            .position(span.first)
            .ok_or(FeederError::UnknownLine { id: span.first })?;
        let end = self
            .position(span.last)
            .ok_or(FeederError::UnknownLine { id: span.last })?;
        if start > end {
            return Err(FeederError::InvertedSpan {
                first: span.first,
                last: span.last,
            });
        }
        Ok((start, end))
    }

    pub fn lines_in(&self, start: usize, end: usize) -> Vec<&str> {
        self.order[start..=end]
            .iter()
            .map(|id| self.arena.get(id).map(|t| t.as_ref()).unwrap_or(""))
            .collect()
    }

    /// Ids of every line whose text contains `needle`, in buffer order.
    pub fn find_text(&self, needle: &str) -> Vec<LineId> {
        self.iter()
            .filter(|(_, text)| text.contains(needle))
            .map(|(id, _)| id)
            .collect()
    }

    /// Join lines back into text with the loaded line ending, restoring the
    /// trailing newline if the original had one.
    pub fn serialize(&self) -> String {
        join_lines(
            self.iter().map(|(_, text)| text),
            self.line_ending,
            self.trailing_newline,
        )
    }

    /// See [`Window`]: the first budget-sized chunk of `span` (whole buffer if `None`).
    pub fn window(&self, span: Option<LineSpan>, budget: Budget) -> Result<Window, FeederError> {
        Window::build(self, span, budget)
    }

    /// Every greedy chunk covering `span`.
    pub fn windows(
        &self,
        span: Option<LineSpan>,
        budget: Budget,
    ) -> Result<Vec<Window>, FeederError> {
        let Some(span) = span.or_else(|| self.first().zip(self.last()).map(|(f, l)| LineSpan::new(f, l)))
        else {
            return Ok(vec![Window::build(self, None, budget)?]);
        };

        let mut out = Vec::new();
        let mut cursor = Some(span.first);
        while let Some(first) = cursor {
            let window = Window::build(self, Some(LineSpan::new(first, span.last)), budget)?;
            cursor = window.next;
            out.push(window);
        }
        Ok(out)
    }

    /// Start a mutable copy. Nothing touches `self`; the draft becomes a new
    /// buffer only through [`BufferDraft::finish`].
    pub(crate) fn draft(&self) -> BufferDraft {
        BufferDraft {
            order: self.order.clone(),
            arena: self.arena.clone(),
            next_id: self.next_id,
            trailing_newline: self.trailing_newline,
            line_ending: self.line_ending,
            source: self.source.clone(),
        }
    }

    /// Replacement buffer for a full reload: fresh lines whose ids continue
    /// from this buffer's counter.
    pub(crate) fn reloaded(&self, text: &str) -> BufferDraft {
        let fresh = CodeBuffer::load(text);
        let mut draft = BufferDraft {
            order: Vec::with_capacity(fresh.len()),
            arena: HashMap::with_capacity(fresh.len()),
            next_id: self.next_id,
            trailing_newline: fresh.trailing_newline,
            line_ending: fresh.line_ending,
            source: self.source.clone(),
        };
        for (_, line) in fresh.iter() {
            let id = draft.alloc(line);
            draft.order.push(id);
        }
        draft
    }
}

/// Mutable working copy used inside a write transaction.
#[derive(Debug, Clone)]
pub(crate) struct BufferDraft {
    pub(crate) order: Vec<LineId>,
    arena: HashMap<LineId, Arc<str>>,
    next_id: u64,
    trailing_newline: bool,
    line_ending: LineEnding,
    source: Option<PathBuf>,
}

impl BufferDraft {
    /// Allocate an id for a brand-new line. Ids are only ever handed out here.
    pub(crate) fn alloc(&mut self, text: &str) -> LineId {
        let id = LineId(self.next_id);
        self.next_id += 1;
        self.arena.insert(id, Arc::from(text));
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Seal the draft into a buffer at `version`, checking that the order is
    /// a set of known, unique ids.
    pub(crate) fn finish(self, version: BufferVersion) -> Result<CodeBuffer, FeederError> {
        let mut seen = HashSet::with_capacity(self.order.len());
        for id in &self.order {
            if !seen.insert(*id) {
                return Err(FeederError::Inconsistent {
                    message: format!("line {id} appears twice"),
                });
            }
            if !self.arena.contains_key(id) {
                return Err(FeederError::Inconsistent {
                    message: format!("line {id} has no text"),
                });
            }
        }

        let mut arena = self.arena;
        arena.retain(|id, _| seen.contains(id));
        let positions = index_positions(&self.order);

        Ok(CodeBuffer {
            order: self.order,
            arena,
            positions,
            next_id: self.next_id,
            version,
            trailing_newline: self.trailing_newline,
            line_ending: self.line_ending,
            source: self.source,
        })
    }
}

fn index_positions(order: &[LineId]) -> HashMap<LineId, usize> {
    order
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect()
}

fn join_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
    ending: LineEnding,
    trailing_newline: bool,
) -> String {
    let mut out = String::new();
    let mut any = false;
    for (idx, line) in lines.enumerate() {
        if idx > 0 {
            out.push_str(ending.as_str());
        }
        out.push_str(line);
        any = true;
    }
    if trailing_newline && any {
        out.push_str(ending.as_str());
    }
    out
}
