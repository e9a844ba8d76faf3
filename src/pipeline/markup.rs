//! Inline markup: text normalisation, XML escaping, and emphasis.
//!
//! Each rule is a pure `&str → String` pass, testable on its own.
//!
//! ## Rule Order
//!
//! Escaping runs **before** emphasis conversion. The emphasis delimiters
//! (`*`, `_`) are not XML-special, so they survive escaping untouched, and
//! every `<`/`>` that reaches the output is one we inserted. Source text
//! containing literal angle brackets therefore cannot corrupt a chapter.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise extracted or translated text into a single logical line.
///
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 2. Collapse every whitespace run (including newlines) to one space
/// 3. Trim both ends
pub fn normalize_text(input: &str) -> String {
    let visible = remove_invisible_chars(input);
    collapse_whitespace(&visible)
}

/// Escape text for inclusion in XHTML element content or attribute values.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape, then convert paired emphasis delimiters to XHTML inline markup.
///
/// `**bold**` / `__bold__` → `<strong>`, `*italic*` / `_italic_` → `<em>`.
/// Unpaired delimiters are left as literal characters.
pub fn render_inline(input: &str) -> String {
    let s = escape_xml(input);
    let s = convert_bold(&s);
    convert_italic(&s)
}

/// Remove emphasis delimiters, keeping the emphasised words.
///
/// Used where the target cannot show emphasis (the paginated PDF).
pub fn strip_emphasis(input: &str) -> String {
    let s = RE_BOLD_STARS.replace_all(input, "$1");
    let s = RE_BOLD_UNDERSCORES.replace_all(&s, "$1");
    let s = RE_ITALIC_STAR.replace_all(&s, "$1");
    RE_ITALIC_UNDERSCORE
        .replace_all(&s, "${pre}${body}")
        .to_string()
}

// ── Rule 1: Remove invisible Unicode ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Collapse whitespace ──────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Rule 3: Bold ─────────────────────────────────────────────────────────────
//
// The body must start and end with a non-space, non-delimiter character so
// "2 ** 3 ** 4" stays literal.

static RE_BOLD_STARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\s](?:[^*]*?[^*\s])?)\*\*").unwrap());
static RE_BOLD_UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([^_\s](?:[^_]*?[^_\s])?)__").unwrap());

fn convert_bold(input: &str) -> String {
    let s = RE_BOLD_STARS.replace_all(input, "<strong>$1</strong>");
    RE_BOLD_UNDERSCORES
        .replace_all(&s, "<strong>$1</strong>")
        .to_string()
}

// ── Rule 4: Italic ───────────────────────────────────────────────────────────
//
// Underscore emphasis must not fire inside identifiers like snake_case_name,
// so the opening `_` has to follow start-of-text or a non-word character.

static RE_ITALIC_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*]*?[^*\s])?)\*").unwrap());
static RE_ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<pre>^|[^\w])_(?P<body>[^_\s](?:[^_]*?[^_\s])?)_\b").unwrap()
});

fn convert_italic(input: &str) -> String {
    let s = RE_ITALIC_STAR.replace_all(input, "<em>$1</em>");
    RE_ITALIC_UNDERSCORE
        .replace_all(&s, "${pre}<em>${body}</em>")
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_and_strips() {
        assert_eq!(
            normalize_text("  hello\u{200B}\n\n  wor\u{00AD}ld \t "),
            "hello world"
        );
    }

    #[test]
    fn test_escape_all_specials() {
        assert_eq!(
            escape_xml(r#"a < b && c > "d" 'e'"#),
            "a &lt; b &amp;&amp; c &gt; &quot;d&quot; &#39;e&#39;"
        );
    }

    #[test]
    fn test_bold_and_italic() {
        assert_eq!(
            render_inline("a **bold** and *it* word"),
            "a <strong>bold</strong> and <em>it</em> word"
        );
        assert_eq!(
            render_inline("__strong__ _soft_"),
            "<strong>strong</strong> <em>soft</em>"
        );
    }

    #[test]
    fn test_literal_angle_brackets_are_escaped() {
        let out = render_inline("if x <b> y then **z**");
        assert_eq!(out, "if x &lt;b&gt; y then <strong>z</strong>");
    }

    #[test]
    fn test_unpaired_delimiters_stay_literal() {
        assert_eq!(render_inline("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(render_inline("2 ** 3 ** 4"), "2 ** 3 ** 4");
    }

    #[test]
    fn test_snake_case_is_not_italic() {
        assert_eq!(render_inline("call my_long_name now"), "call my_long_name now");
    }

    #[test]
    fn test_strip_emphasis() {
        assert_eq!(strip_emphasis("a **b** *c* _d_"), "a b c d");
    }
}
