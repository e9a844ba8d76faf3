//! Structured text produced by extraction and consumed by every later stage.
//!
//! A document is an ordered `Vec<TextBlock>`: reading order is the vector
//! order, and no stage reorders it. The flattened text form
//! ([`blocks_to_text`] / [`text_to_blocks`]) is a Markdown-like rendering
//! (`## Heading`, blank-line separated paragraphs) used for the working file
//! and for callers that only have plain text.

use crate::pipeline::markup::normalize_text;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Heading depth. The layout extractor only emits [`HeadingLevel::H2`];
/// the other levels come from the text form or from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    /// Numeric depth, 1–3.
    pub fn depth(self) -> usize {
        match self {
            HeadingLevel::H1 => 1,
            HeadingLevel::H2 => 2,
            HeadingLevel::H3 => 3,
        }
    }

    /// Inverse of [`HeadingLevel::depth`]; depths beyond 3 clamp to H3.
    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => None,
            1 => Some(HeadingLevel::H1),
            2 => Some(HeadingLevel::H2),
            _ => Some(HeadingLevel::H3),
        }
    }

    /// The `#` prefix used in the flattened text form.
    pub fn marker(self) -> &'static str {
        match self {
            HeadingLevel::H1 => "#",
            HeadingLevel::H2 => "##",
            HeadingLevel::H3 => "###",
        }
    }
}

/// What a block is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Heading(HeadingLevel),
    Paragraph,
}

/// One classified unit of text in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub kind: BlockKind,
    /// Single logical line: no newlines, whitespace collapsed.
    pub text: String,
}

impl TextBlock {
    pub fn heading(level: HeadingLevel, text: impl AsRef<str>) -> Self {
        Self {
            kind: BlockKind::Heading(level),
            text: normalize_text(text.as_ref()),
        }
    }

    pub fn paragraph(text: impl AsRef<str>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: normalize_text(text.as_ref()),
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.kind, BlockKind::Heading(_))
    }

    pub fn heading_level(&self) -> Option<HeadingLevel> {
        match self.kind {
            BlockKind::Heading(level) => Some(level),
            BlockKind::Paragraph => None,
        }
    }

    /// Same kind, new text. Used when a translation replaces the content.
    pub fn with_text(&self, text: impl AsRef<str>) -> Self {
        Self {
            kind: self.kind,
            text: normalize_text(text.as_ref()),
        }
    }
}

impl fmt::Display for TextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BlockKind::Heading(level) => write!(f, "{} {}", level.marker(), self.text),
            BlockKind::Paragraph => f.write_str(&self.text),
        }
    }
}

/// Render blocks into the flattened text form (blank-line separated).
pub fn blocks_to_text(blocks: &[TextBlock]) -> String {
    let mut out = blocks
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Split a leading `#`/`##`/`###` marker off a unit of flattened text.
///
/// Returns the heading level (if any) and the remaining text. A run of `#`
/// only counts as a marker when followed by whitespace, so `#hashtag` stays
/// body text.
pub fn split_heading_marker(unit: &str) -> (Option<HeadingLevel>, &str) {
    let trimmed = unit.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 {
        return (None, unit);
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return (None, unit);
    }
    (HeadingLevel::from_depth(hashes), rest.trim_start())
}

/// Split flattened text into its blank-line separated units, in order.
///
/// Whitespace-only units are kept (as empty strings are not): callers that
/// must pass blank units through untouched rely on seeing them.
pub fn split_units(text: &str) -> Vec<&str> {
    let normalised_breaks = text.contains('\r');
    if normalised_breaks {
        // CRLF input: fall back to line scanning so "\r\n\r\n" splits too.
        return split_units_by_lines(text);
    }
    text.split("\n\n")
        .map(|u| u.trim_matches('\n'))
        .filter(|u| !u.is_empty())
        .collect()
}

fn split_units_by_lines(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']);
        if content.trim().is_empty() {
            if let Some(s) = start.take() {
                units.push(&text[s..end]);
            }
        } else {
            if start.is_none() {
                start = Some(offset);
            }
            end = offset + content.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        units.push(&text[s..end]);
    }
    units
}

/// Parse the flattened text form back into blocks.
///
/// Lenient by construction: blank units are dropped, a unit starting with
/// `#`+space becomes a heading, everything else a paragraph.
pub fn text_to_blocks(text: &str) -> Vec<TextBlock> {
    split_units(text)
        .into_iter()
        .filter(|u| !u.trim().is_empty())
        .map(|unit| match split_heading_marker(unit) {
            (Some(level), rest) => TextBlock::heading(level, rest),
            (None, body) => TextBlock::paragraph(body),
        })
        .filter(|b| !b.text.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trips_structure() {
        let blocks = vec![
            TextBlock::paragraph("Preface text."),
            TextBlock::heading(HeadingLevel::H2, "Chapter One"),
            TextBlock::paragraph("It was a dark night."),
        ];
        let text = blocks_to_text(&blocks);
        assert_eq!(
            text,
            "Preface text.\n\n## Chapter One\n\nIt was a dark night.\n"
        );
        assert_eq!(text_to_blocks(&text), blocks);
    }

    #[test]
    fn paragraph_text_is_single_line() {
        let b = TextBlock::paragraph("  line one\nline   two  ");
        assert_eq!(b.text, "line one line two");
    }

    #[test]
    fn hashtag_is_not_a_heading() {
        let (level, rest) = split_heading_marker("#rustlang rocks");
        assert_eq!(level, None);
        assert_eq!(rest, "#rustlang rocks");
    }

    #[test]
    fn deep_markers_clamp_to_h3() {
        let (level, rest) = split_heading_marker("##### Deep");
        assert_eq!(level, Some(HeadingLevel::H3));
        assert_eq!(rest, "Deep");
    }

    #[test]
    fn crlf_units_split() {
        let units = split_units("a\r\nb\r\n\r\n## c\r\n");
        assert_eq!(units, vec!["a\r\nb", "## c"]);
    }

    #[test]
    fn empty_text_yields_no_blocks() {
        assert!(text_to_blocks("").is_empty());
        assert!(text_to_blocks("\n\n   \n\n").is_empty());
        assert_eq!(blocks_to_text(&[]), "");
    }
}
