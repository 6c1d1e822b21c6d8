//! Patch block parser.
//!
//! A completion may carry any number of blocks; text outside them is ignored.
//!
//! ```text
//! <<<PATCH
//! REPLACE "let total = 0;" TO #42
//! let mut total = 0u64;
//! PATCH>>>
//! ```
//!
//! Header forms: `INSERT AFTER <anchor>`, `INSERT AT START`,
//! `REPLACE <anchor> [TO <anchor>]`, `DELETE <anchor> [TO <anchor>]`.
//! An anchor is `#<LineId>` or a double-quoted substring of exactly one line.

use crate::feeder::{CodeBuffer, LineId};
use crate::patch::operation::{PatchBatch, PatchOperation};
use crate::patch::rejection::{RejectReason, Rejection, Stage};

pub const BLOCK_START: &str = "<<<PATCH";
pub const BLOCK_END: &str = "PATCH>>>";

/// Anchor as written in a block header, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorSpec {
    Id(LineId),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHeader {
    InsertAfter(AnchorSpec),
    InsertAtStart,
    Replace(AnchorSpec, Option<AnchorSpec>),
    Delete(AnchorSpec, Option<AnchorSpec>),
}

/// One syntactically valid block, anchors unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlock {
    pub header: BlockHeader,
    pub body: Vec<String>,
    /// 1-based line of the start marker in the completion text.
    pub line: usize,
}

/// True if `text` contains at least one block start marker.
pub fn contains_patch(text: &str) -> bool {
    text.lines().any(|l| l.trim().eq_ignore_ascii_case(BLOCK_START))
}

/// Split a completion into blocks.
pub fn parse_blocks(text: &str) -> Result<Vec<PatchBlock>, Rejection> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((idx, line)) = lines.next() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(BLOCK_END) {
            return Err(malformed(
                blocks.len(),
                format!("line {}: end marker without a matching start", idx + 1),
            ));
        }
        if !trimmed.eq_ignore_ascii_case(BLOCK_START) {
            continue;
        }

        let start_line = idx + 1;
        let op_index = blocks.len();

        let header_text = loop {
            match lines.next() {
                Some((_, l)) if l.trim().is_empty() => continue,
                Some((_, l)) => break l.trim().to_string(),
                None => {
                    return Err(malformed(
                        op_index,
                        format!("block at line {start_line} has no header"),
                    ))
                }
            }
        };
        if header_text.eq_ignore_ascii_case(BLOCK_END) {
            return Err(malformed(
                op_index,
                format!("block at line {start_line} has no header"),
            ));
        }
        let header = parse_header(&header_text)
            .map_err(|detail| malformed(op_index, format!("line {start_line}: {detail}")))?;

        let mut body = Vec::new();
        let mut closed = false;
        for (_, l) in lines.by_ref() {
            let t = l.trim();
            if t.eq_ignore_ascii_case(BLOCK_END) {
                closed = true;
                break;
            }
            if t.eq_ignore_ascii_case(BLOCK_START) {
                return Err(malformed(
                    op_index,
                    format!("block at line {start_line} opens another block before closing"),
                ));
            }
            body.push(l.strip_suffix('\r').unwrap_or(l).to_string());
        }
        if !closed {
            return Err(malformed(
                op_index,
                format!("block at line {start_line} is not terminated with {BLOCK_END}"),
            ));
        }

        match &header {
            BlockHeader::Delete(..) if body.iter().any(|l| !l.trim().is_empty()) => {
                return Err(malformed(
                    op_index,
                    format!("DELETE block at line {start_line} must not carry lines"),
                ));
            }
            BlockHeader::Delete(..) => body.clear(),
            BlockHeader::InsertAfter(_) | BlockHeader::InsertAtStart | BlockHeader::Replace(..)
                if body.is_empty() =>
            {
                return Err(malformed(
                    op_index,
                    format!("block at line {start_line} has no lines to write"),
                ));
            }
            _ => {}
        }

        blocks.push(PatchBlock {
            header,
            body,
            line: start_line,
        });
    }

    Ok(blocks)
}

/// Resolve block anchors against `buffer`, producing a batch.
///
/// Text anchors are looked up once, here. Explicit ids are passed through;
/// whether they still exist is the validator's call.
pub fn resolve_blocks(blocks: Vec<PatchBlock>, buffer: &CodeBuffer) -> Result<PatchBatch, Rejection> {
    let mut operations = Vec::with_capacity(blocks.len());

    for (index, block) in blocks.into_iter().enumerate() {
        let op = match block.header {
            BlockHeader::InsertAfter(anchor) => {
                PatchOperation::insert_after(resolve_anchor(&anchor, buffer, index)?, block.body)
            }
            BlockHeader::InsertAtStart => PatchOperation::insert_at_start(block.body),
            BlockHeader::Replace(start, end) => {
                let (start, end) = resolve_range(&start, end.as_ref(), buffer, index)?;
                PatchOperation::replace(start, end, block.body)
            }
            BlockHeader::Delete(start, end) => {
                let (start, end) = resolve_range(&start, end.as_ref(), buffer, index)?;
                PatchOperation::delete(start, end)
            }
        };
        operations.push(op);
    }

    Ok(PatchBatch::resolve(buffer, operations))
}

/// Parse and resolve in one step.
pub fn parse(text: &str, buffer: &CodeBuffer) -> Result<PatchBatch, Rejection> {
    let blocks = parse_blocks(text)?;
    if blocks.is_empty() {
        return Err(Rejection::new(
            Stage::Parsing,
            RejectReason::MalformedPatch("completion contains no patch blocks".into()),
            None,
        ));
    }
    resolve_blocks(blocks, buffer)
}

fn resolve_range(
    start: &AnchorSpec,
    end: Option<&AnchorSpec>,
    buffer: &CodeBuffer,
    index: usize,
) -> Result<(LineId, LineId), Rejection> {
    let start = resolve_anchor(start, buffer, index)?;
    let end = match end {
        Some(end) => resolve_anchor(end, buffer, index)?,
        None => start,
    };
    Ok((start, end))
}

fn resolve_anchor(anchor: &AnchorSpec, buffer: &CodeBuffer, index: usize) -> Result<LineId, Rejection> {
    let needle = match anchor {
        AnchorSpec::Id(id) => return Ok(*id),
        AnchorSpec::Text(needle) => needle,
    };

    let matches = buffer.find_text(needle);
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => {
            let hint = closest_line(buffer, needle)
                .map(|(id, text)| format!("; closest line is {id} `{}`", text.trim()))
                .unwrap_or_default();
            Err(Rejection::new(
                Stage::Validating,
                RejectReason::StaleAnchor(format!("no line contains \"{needle}\"{hint}")),
                Some(index),
            ))
        }
        many => Err(Rejection::new(
            Stage::Validating,
            RejectReason::ValidationFailed(format!(
                "ambiguous anchor: \"{needle}\" matches {} lines",
                many.len()
            )),
            Some(index),
        )),
    }
}

fn closest_line<'a>(buffer: &'a CodeBuffer, needle: &str) -> Option<(LineId, &'a str)> {
    buffer
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(id, text)| (id, text, strsim::normalized_levenshtein(text.trim(), needle.trim())))
        .filter(|(_, _, score)| *score >= 0.5)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(id, text, _)| (id, text))
}

fn malformed(index: usize, detail: String) -> Rejection {
    Rejection::new(
        Stage::Parsing,
        RejectReason::MalformedPatch(detail),
        Some(index),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Id(LineId),
    Text(String),
}

fn tokenize(header: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = header.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => break,
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err("unterminated quoted anchor".into());
            }
            if text.is_empty() {
                return Err("empty text anchor".into());
            }
            tokens.push(Token::Text(text));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            word.push(c);
            chars.next();
        }
        if let Some(digits) = word.strip_prefix('#') {
            let id = digits
                .parse::<u64>()
                .map_err(|_| format!("bad line id token '{word}'"))?;
            tokens.push(Token::Id(LineId(id)));
        } else {
            tokens.push(Token::Word(word.to_ascii_uppercase()));
        }
    }

    Ok(tokens)
}

fn parse_header(header: &str) -> Result<BlockHeader, String> {
    let tokens = tokenize(header)?;
    let mut iter = tokens.into_iter();

    let kind = match iter.next() {
        Some(Token::Word(w)) => w,
        Some(_) => return Err(format!("header must start with an operation kind: '{header}'")),
        None => return Err("empty header".into()),
    };
    let rest: Vec<Token> = iter.collect();

    match kind.as_str() {
        "INSERT" => match rest.as_slice() {
            [Token::Word(w), anchor] if w == "AFTER" => {
                Ok(BlockHeader::InsertAfter(to_anchor(anchor)?))
            }
            [Token::Word(at), Token::Word(start)] if at == "AT" && start == "START" => {
                Ok(BlockHeader::InsertAtStart)
            }
            _ => Err(format!(
                "expected `INSERT AFTER <anchor>` or `INSERT AT START`, got '{header}'"
            )),
        },
        "REPLACE" | "DELETE" => {
            let (start, end) = match rest.as_slice() {
                [start] => (to_anchor(start)?, None),
                [start, Token::Word(to), end] if to == "TO" || to == ".." => {
                    (to_anchor(start)?, Some(to_anchor(end)?))
                }
                _ => {
                    return Err(format!(
                        "expected `{kind} <anchor> [TO <anchor>]`, got '{header}'"
                    ))
                }
            };
            Ok(if kind == "REPLACE" {
                BlockHeader::Replace(start, end)
            } else {
                BlockHeader::Delete(start, end)
            })
        }
        other => Err(format!("unknown operation kind '{other}'")),
    }
}

fn to_anchor(token: &Token) -> Result<AnchorSpec, String> {
    match token {
        Token::Id(id) => Ok(AnchorSpec::Id(*id)),
        Token::Text(text) => Ok(AnchorSpec::Text(text.clone())),
        Token::Word(w) => Err(format!(
            "'{w}' is not an anchor (use #<id> or a quoted line fragment)"
        )),
    }
}
