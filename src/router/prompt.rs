//! Prompt construction and completion cleanup.

use crate::feeder::{CodeBuffer, Window};

/// How Scriptor is told to answer when it wants to change the buffer.
pub const PATCH_INSTRUCTIONS: &str = "\
To change the buffer, answer with one or more patch blocks. Anchors are line ids
(`#12`) or a double-quoted piece of text that appears on exactly one line.

<<<PATCH
REPLACE #12 TO #14
replacement lines
PATCH>>>

Other headers: `INSERT AFTER #7`, `INSERT AT START`, `DELETE #3 TO #5`.
Text outside blocks is ignored. Do not renumber lines; never invent ids.
";

/// Chars reserved for the fixed parts of a Scriptor prompt.
const SCRIPTOR_OVERHEAD: usize = 512;

/// Window budget left for the buffer once instructions and the request fit.
pub fn window_budget(max_context: usize, input: &str) -> usize {
    max_context
        .saturating_sub(PATCH_INSTRUCTIONS.len() + SCRIPTOR_OVERHEAD + input.chars().count())
        .max(1)
}

pub fn scriptor_prompt(input: &str, window: Option<&Window>) -> String {
    let mut prompt = String::new();
    if let Some(window) = window.filter(|w| !w.is_empty()) {
        let shown = window
            .span
            .map(|span| span.to_string())
            .unwrap_or_default();
        prompt.push_str(&format!(
            "Source buffer at version {} (lines {shown}). Each line is shown as `#<id>| <text>`.\n",
            window.version
        ));
        prompt.push_str("=== BUFFER START ===\n");
        prompt.push_str(&window.render());
        prompt.push_str("=== BUFFER END ===\n");
        if let Some(next) = window.next {
            prompt.push_str(&format!("(The buffer continues from {next}.)\n"));
        }
        prompt.push('\n');
        prompt.push_str(PATCH_INSTRUCTIONS);
        prompt.push('\n');
    }
    prompt.push_str("Request: ");
    prompt.push_str(input);
    prompt
}

pub fn master_prompt(input: &str, buffer: &CodeBuffer) -> String {
    let source = buffer
        .source()
        .map(|p| format!(" from {}", p.display()))
        .unwrap_or_default();
    format!(
        "Open buffer{source}: {} lines at version {}.\n\nRequest: {input}",
        buffer.len(),
        buffer.version()
    )
}

/// Drop markdown code-fence lines and trim.
pub fn clean_markdown(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Remove control characters except newline and tab.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
