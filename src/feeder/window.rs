//! Budget-bounded views of the buffer for model consumption.

use crate::feeder::buffer::{BufferVersion, CodeBuffer, LineId, LineSpan};
use crate::feeder::errors::FeederError;
use std::fmt::Write as _;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Rough chars-per-token ratio used to turn a token budget into chars.
pub const CHARS_PER_TOKEN: usize = 4;

/// Size limit for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Chars(usize),
    Tokens(usize),
}

impl Budget {
    pub fn as_chars(&self) -> usize {
        match self {
            Budget::Chars(n) => *n,
            Budget::Tokens(n) => n.saturating_mul(CHARS_PER_TOKEN),
        }
    }
}

/// Render one line the way a model sees it: `#<id>| <text>`.
pub fn render_line(id: LineId, text: &str) -> String {
    format!("#{}| {}", id.0, text)
}

fn rendered_cost(id: LineId, text: &str) -> usize {
    // "#" + digits + "| " + text + "\n"
    1 + decimal_width(id.0) + 2 + text.chars().count() + 1
}

fn decimal_width(mut n: u64) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLine {
    pub id: LineId,
    pub text: Arc<str>,
}

/// A contiguous, read-only slice of one committed buffer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Version the slice was cut from.
    pub version: BufferVersion,
    /// Ids of the first and last line included (None for an empty buffer).
    pub span: Option<LineSpan>,
    pub lines: Vec<WindowLine>,
    /// First line of the requested range that did not fit; restart point.
    pub next: Option<LineId>,
    /// Set when a single line alone exceeds the budget.
    pub oversized: bool,
    /// xxh3 of the rendered content.
    pub fingerprint: u64,
}

impl Window {
    pub(crate) fn build(
        buffer: &CodeBuffer,
        span: Option<LineSpan>,
        budget: Budget,
    ) -> Result<Self, FeederError> {
        let range = match span {
            Some(span) => Some(buffer.span_positions(span)?),
            None if buffer.is_empty() => None,
            None => Some((0, buffer.len() - 1)),
        };

        let Some((start, end)) = range else {
            return Ok(Window {
                version: buffer.version(),
                span: None,
                lines: Vec::new(),
                next: None,
                oversized: false,
                fingerprint: xxh3_64(b""),
            });
        };

        let limit = budget.as_chars();
        let mut used = 0usize;
        let mut lines = Vec::new();
        let mut oversized = false;
        let mut last_taken = start;

        for pos in start..=end {
            let Some(id) = buffer.id_at(pos) else { break };
            let text = buffer.text(id).unwrap_or("");
            let cost = rendered_cost(id, text);

            if used + cost > limit {
                if lines.is_empty() {
                    // Never cut a line: an oversized line travels alone.
                    oversized = true;
                } else {
                    break;
                }
            }

            used += cost;
            lines.push(WindowLine {
                id,
                text: Arc::from(text),
            });
            last_taken = pos;
            if oversized {
                break;
            }
        }

        let next = if last_taken < end {
            buffer.id_at(last_taken + 1)
        } else {
            None
        };
        let span = lines
            .first()
            .zip(lines.last())
            .map(|(f, l)| LineSpan::new(f.id, l.id));

        let mut window = Window {
            version: buffer.version(),
            span,
            lines,
            next,
            oversized,
            fingerprint: 0,
        };
        window.fingerprint = xxh3_64(window.render().as_bytes());
        Ok(window)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn contains(&self, id: LineId) -> bool {
        self.lines.iter().any(|l| l.id == id)
    }

    /// The window as handed to a model, one `#<id>| <text>` line each.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "#{}| {}", line.id.0, line.text);
        }
        out
    }

    /// Plain text of the window without id prefixes.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_ref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
