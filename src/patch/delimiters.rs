//! Bracket and quote balance of a line fragment.
//!
//! The validator compares the balance of the lines an operation removes
//! with the balance of the lines it writes: a REPLACE may restructure code
//! but must leave the surrounding nesting exactly as it found it.

use crate::lang::Syntax;
use std::fmt;

/// Net nesting change and unterminated construct of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub parens: i64,
    pub brackets: i64,
    pub braces: i64,
    /// String or block comment still open at the end of the fragment.
    pub open: Option<OpenConstruct>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenConstruct {
    String,
    BlockComment,
}

impl Balance {
    pub fn is_neutral(&self) -> bool {
        *self == Balance::default()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "() {:+}, [] {:+}, {{}} {:+}",
            self.parens, self.brackets, self.braces
        )?;
        match self.open {
            Some(OpenConstruct::String) => write!(f, ", open string"),
            Some(OpenConstruct::BlockComment) => write!(f, ", open block comment"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment(u32),
    Str(char),
    TripleStr(char),
    RawStr(usize),
}

/// Scan `lines` (joined with newlines) under the rules of `syntax`.
pub fn balance<S: AsRef<str>>(syntax: Syntax, lines: &[S]) -> Balance {
    let text = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    let chars: Vec<char> = text.chars().collect();

    let mut out = Balance::default();
    let mut state = State::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment(depth) => {
                if c == '*' && next == Some('/') {
                    i += 1;
                    state = if depth <= 1 {
                        State::Code
                    } else {
                        State::BlockComment(depth - 1)
                    };
                } else if c == '/' && next == Some('*') && syntax == (Syntax::CFamily { rust: true }) {
                    i += 1;
                    state = State::BlockComment(depth + 1);
                }
            }
            State::Str(quote) => {
                if c == '\\' {
                    i += 1;
                } else if c == quote {
                    state = State::Code;
                }
            }
            State::TripleStr(quote) => {
                if c == '\\' {
                    i += 1;
                } else if c == quote && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    i += 2;
                    state = State::Code;
                }
            }
            State::RawStr(hashes) => {
                if c == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
                    i += hashes;
                    state = State::Code;
                }
            }
            State::Code => {
                match c {
                    '(' => out.parens += 1,
                    ')' => out.parens -= 1,
                    '[' => out.brackets += 1,
                    ']' => out.brackets -= 1,
                    '{' => out.braces += 1,
                    '}' => out.braces -= 1,
                    _ => {}
                }
                state = enter(syntax, &chars, &mut i).unwrap_or(State::Code);
            }
        }
        i += 1;
    }

    out.open = match state {
        State::Str(_) | State::TripleStr(_) | State::RawStr(_) => Some(OpenConstruct::String),
        State::BlockComment(_) => Some(OpenConstruct::BlockComment),
        State::Code | State::LineComment => None,
    };
    out
}

/// If a comment or string starts at `chars[*i]`, consume its opener and
/// return the new state.
fn enter(syntax: Syntax, chars: &[char], i: &mut usize) -> Option<State> {
    let c = chars[*i];
    let next = chars.get(*i + 1).copied();

    match syntax {
        Syntax::CFamily { rust } => match c {
            '/' if next == Some('/') => {
                *i += 1;
                Some(State::LineComment)
            }
            '/' if next == Some('*') => {
                *i += 1;
                Some(State::BlockComment(1))
            }
            '"' => Some(State::Str('"')),
            'r' if rust && !prev_is_ident(chars, *i) => {
                let hashes = chars[*i + 1..].iter().take_while(|c| **c == '#').count();
                if chars.get(*i + 1 + hashes) == Some(&'"') {
                    *i += 1 + hashes;
                    Some(State::RawStr(hashes))
                } else {
                    None
                }
            }
            '\'' if rust => rust_char_literal(chars, i),
            '\'' => Some(State::Str('\'')),
            '`' => Some(State::Str('`')),
            _ => None,
        },
        Syntax::Hash { triple_quotes } => match c {
            '#' => Some(State::LineComment),
            '"' | '\'' if triple_quotes && next == Some(c) && chars.get(*i + 2) == Some(&c) => {
                *i += 2;
                Some(State::TripleStr(c))
            }
            '"' | '\'' => Some(State::Str(c)),
            _ => None,
        },
        Syntax::Generic => match c {
            '"' => Some(State::Str('"')),
            _ => None,
        },
    }
}

/// `'x'`, `'\n'` and `'\u{..}'` are char literals; anything else after a
/// quote (`'a`, `'static`) is a lifetime or label and is skipped.
fn rust_char_literal(chars: &[char], i: &mut usize) -> Option<State> {
    let start = *i;
    if chars.get(start + 1) == Some(&'\\') {
        let close = (start + 3..(start + 12).min(chars.len())).find(|k| chars[*k] == '\'')?;
        *i = close;
        return None;
    }
    if chars.get(start + 2) == Some(&'\'') {
        *i = start + 2;
    }
    None
}

fn prev_is_ident(chars: &[char], i: usize) -> bool {
    i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_')
}
