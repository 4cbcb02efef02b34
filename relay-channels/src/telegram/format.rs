//! Telegram HTML format converter.
//!
//! Completion models answer in Markdown. Telegram's HTML parse mode needs far
//! less escaping than its MarkdownV2 mode, so replies are converted to the
//! small HTML subset Telegram accepts (`b`, `i`, `code`, `pre`, `a`).
//!
//! The text is HTML-escaped first and the Markdown constructs are rewritten
//! afterwards, so stray `<` or `&` in model output (e.g. `<3`) never produce
//! invalid entities.

use regex::{Captures, Regex};
use std::sync::LazyLock;

// ============================================================================
// Regex Patterns
// ============================================================================

static CODE_BLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9_+-]*\n?([\s\S]*?)```").unwrap());
static HEADING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*$").unwrap());
// Matches after escaping, so `>` has become `&gt;`.
static QUOTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^&gt;\s?(.*)$").unwrap());
static BULLET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").unwrap());
static BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").unwrap());
static ITALIC_ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\s][^*\n]*?)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+?)_\b").unwrap());

// ============================================================================
// Public API
// ============================================================================

/// Convert Markdown to Telegram-compatible HTML.
///
/// | Input              | Output                    |
/// |--------------------|---------------------------|
/// | `# Title`          | `<b>Title</b>`            |
/// | `- Item`           | `• Item`                  |
/// | `> Quote`          | `┃ <i>Quote</i>`          |
/// | ` ```code``` `     | `<pre>code</pre>`         |
/// | `**bold**`         | `<b>bold</b>`             |
/// | `*italic*`         | `<i>italic</i>`           |
/// | `` `code` ``       | `<code>code</code>`       |
/// | `[text](url)`      | `<a href="url">text</a>`  |
pub fn convert_to_telegram_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len() + 16);
    let mut last = 0;

    for caps in CODE_BLOCK_PATTERN.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        output.push_str(&convert_prose(&input[last..whole.start()]));
        let code = caps.get(1).map_or("", |m| m.as_str());
        output.push_str("<pre>");
        output.push_str(&escape_html(code.trim_end_matches('\n')));
        output.push_str("</pre>");
        last = whole.end();
    }
    output.push_str(&convert_prose(&input[last..]));

    output
}

/// Escape the characters Telegram's HTML parser treats specially.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ============================================================================
// Block Conversion
// ============================================================================

fn convert_prose(segment: &str) -> String {
    if segment.is_empty() {
        return String::new();
    }

    escape_html(segment)
        .split('\n')
        .map(convert_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn convert_line(line: &str) -> String {
    if let Some(caps) = HEADING_PATTERN.captures(line) {
        let title = caps.get(1).map_or("", |m| m.as_str());
        return format!("<b>{}</b>", strip_emphasis(title));
    }

    if let Some(caps) = QUOTE_PATTERN.captures(line) {
        let text = caps.get(1).map_or("", |m| m.as_str());
        return format!("┃ <i>{}</i>", convert_inline(text));
    }

    if let Some(caps) = BULLET_PATTERN.captures(line) {
        let indent = caps.get(1).map_or("", |m| m.as_str());
        let item = caps.get(2).map_or("", |m| m.as_str());
        return format!("{indent}• {}", convert_inline(item));
    }

    convert_inline(line)
}

// ============================================================================
// Inline Formatting
// ============================================================================

/// Convert inline formatting, leaving inline code spans untouched.
fn convert_inline(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for caps in INLINE_CODE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        output.push_str(&convert_emphasis(&text[last..whole.start()]));
        let code = caps.get(1).map_or("", |m| m.as_str());
        output.push_str(&format!("<code>{code}</code>"));
        last = whole.end();
    }
    output.push_str(&convert_emphasis(&text[last..]));

    output
}

fn convert_emphasis(text: &str) -> String {
    let linked = LINK_PATTERN.replace_all(text, |caps: &Captures| {
        let label = caps.get(1).map_or("", |m| m.as_str());
        let url = caps.get(2).map_or("", |m| m.as_str()).replace('"', "&quot;");
        format!("<a href=\"{url}\">{label}</a>")
    });

    let bold = BOLD_PATTERN.replace_all(&linked, |caps: &Captures| {
        let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        format!("<b>{inner}</b>")
    });

    let italic = ITALIC_ASTERISK.replace_all(&bold, "<i>$1</i>");
    ITALIC_UNDERSCORE.replace_all(&italic, "<i>$1</i>").into_owned()
}

/// Headings are already bold; drop redundant emphasis markers inside them.
fn strip_emphasis(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

// ============================================================================
// Tests
// ============================================================================
