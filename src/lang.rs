//! Language heuristics for the patch validator.
//!
//! Classification prefers the buffer's file extension (resolved through
//! ast-grep-language aliases), then falls back to a few content sniffs.
//! Syntax checks re-parse with tree-sitter and count ERROR/MISSING nodes;
//! parsers are pooled per thread and per language.

pub use ast_grep_language::SupportLang;

use ast_grep_language::LanguageExt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Node, Parser};

const MAX_POOLED_PARSERS: usize = 16;

thread_local! {
    // Keyed by "<lang_debug>" so each grammar keeps its own parser.
    static PARSERS: RefCell<HashMap<String, Parser>> = RefCell::new(HashMap::new());
}

/// Lexical family used by the delimiter scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `//` and `/* */` comments, `"` strings, `'` chars. Rust lifetimes are
    /// not treated as quotes.
    CFamily { rust: bool },
    /// `#` comments, `'`/`"` strings, optional triple-quoted strings.
    Hash { triple_quotes: bool },
    /// Brackets and double quotes only.
    Generic,
}

/// Best-effort language detection. `None` means "could not classify".
pub fn classify(path: Option<&Path>, text: &str) -> Option<SupportLang> {
    if let Some(lang) = path.and_then(from_extension) {
        return Some(lang);
    }
    sniff(text)
}

fn from_extension(path: &Path) -> Option<SupportLang> {
    let ext = path.extension()?.to_str()?;
    ext.parse::<SupportLang>().ok()
}

fn sniff(text: &str) -> Option<SupportLang> {
    let head: String = text.lines().take(200).collect::<Vec<_>>().join("\n");
    let first = head.lines().next().unwrap_or("");

    if first.starts_with("#!") {
        if first.contains("python") {
            return Some(SupportLang::Python);
        }
        if first.contains("bash") || first.ends_with("/sh") {
            return Some(SupportLang::Bash);
        }
        if first.contains("node") {
            return Some(SupportLang::JavaScript);
        }
    }

    let rust_hits = ["fn ", "let mut ", "impl ", "pub struct ", "use std::", "-> "]
        .iter()
        .filter(|m| head.contains(*m))
        .count();
    let python_hits = ["def ", "import ", "self.", "elif ", "):\n"]
        .iter()
        .filter(|m| head.contains(*m))
        .count();
    let js_hits = ["function ", "const ", "=> {", "require(", "export "]
        .iter()
        .filter(|m| head.contains(*m))
        .count();

    let best = rust_hits.max(python_hits).max(js_hits);
    if best < 2 {
        return None;
    }
    if best == rust_hits {
        Some(SupportLang::Rust)
    } else if best == python_hits {
        Some(SupportLang::Python)
    } else {
        Some(SupportLang::JavaScript)
    }
}

/// Lexical family of a language, for delimiter scanning.
pub fn syntax_of(lang: SupportLang) -> Syntax {
    match lang {
        SupportLang::Rust => Syntax::CFamily { rust: true },
        SupportLang::C
        | SupportLang::Cpp
        | SupportLang::CSharp
        | SupportLang::Go
        | SupportLang::Java
        | SupportLang::JavaScript
        | SupportLang::Kotlin
        | SupportLang::Php
        | SupportLang::Scala
        | SupportLang::Swift
        | SupportLang::Tsx
        | SupportLang::TypeScript => Syntax::CFamily { rust: false },
        SupportLang::Python => Syntax::Hash {
            triple_quotes: true,
        },
        SupportLang::Bash | SupportLang::Ruby | SupportLang::Elixir => Syntax::Hash {
            triple_quotes: false,
        },
        _ => Syntax::Generic,
    }
}

/// Number of ERROR/MISSING nodes tree-sitter finds in `source`.
///
/// Returns `None` when the grammar could not be loaded or parsing failed.
pub fn syntax_error_count(lang: SupportLang, source: &str) -> Option<usize> {
    with_parser(lang, |parser| {
        let tree = parser.parse(source, None)?;
        Some(count_errors(tree.root_node()))
    })
    .flatten()
}

fn with_parser<F, R>(lang: SupportLang, f: F) -> Option<R>
where
    F: FnOnce(&mut Parser) -> R,
{
    let key = format!("{lang:?}");
    PARSERS.with(|cell| {
        let mut pool = cell.borrow_mut();
        if !pool.contains_key(&key) {
            if pool.len() >= MAX_POOLED_PARSERS {
                pool.clear();
            }
            let mut parser = Parser::new();
            let ts_lang = lang.get_ts_language();
            if parser.set_language(&ts_lang).is_err() {
                tracing::debug!(language = %key, "tree-sitter grammar unavailable");
                return None;
            }
            pool.insert(key.clone(), parser);
        }
        pool.get_mut(&key).map(f)
    })
}

fn count_errors(node: Node<'_>) -> usize {
    let mut count = usize::from(node.is_error() || node.is_missing());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_errors(child);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_by_extension() {
        let rs = PathBuf::from("src/main.rs");
        let py = PathBuf::from("tool.py");
        assert_eq!(classify(Some(rs.as_path()), ""), Some(SupportLang::Rust));
        assert_eq!(classify(Some(py.as_path()), ""), Some(SupportLang::Python));
    }

    #[test]
    fn sniffs_content_when_extension_is_unknown() {
        let odd = PathBuf::from("notes.unknownext");
        let python = "import os\n\ndef main():\n    print(os.getcwd())\n";
        assert_eq!(classify(Some(odd.as_path()), python), Some(SupportLang::Python));
        assert_eq!(
            classify(None, "#!/usr/bin/env python3\nprint('x')\n"),
            Some(SupportLang::Python)
        );
        assert_eq!(
            classify(None, "use std::io;\nfn main() {\n    let mut x = 1;\n}\n"),
            Some(SupportLang::Rust)
        );
    }

    #[test]
    fn plain_prose_is_unclassified() {
        assert_eq!(classify(None, "a\nb\nc\nd\ne"), None);
    }

    #[test]
    fn counts_syntax_errors() {
        assert_eq!(syntax_error_count(SupportLang::Rust, "fn main() {}"), Some(0));
        let broken = syntax_error_count(SupportLang::Rust, "fn main( {").unwrap();
        assert!(broken > 0);
    }

    #[test]
    fn families() {
        assert_eq!(syntax_of(SupportLang::Rust), Syntax::CFamily { rust: true });
        assert_eq!(
            syntax_of(SupportLang::Python),
            Syntax::Hash {
                triple_quotes: true
            }
        );
    }
}
