//! Layout reconstruction: positioned words → ordered heading/paragraph blocks.
//!
//! Everything here is pure: no pdfium types, no I/O. The extractor turns a
//! page into `Vec<Word>` and hands it to [`layout_page`]; tests build
//! synthetic pages directly.
//!
//! ## Coordinates
//!
//! PDF user space: the origin is bottom-left and `y` grows upwards, so the
//! top of the page has the **largest** `top`/`bottom` values. Lines are
//! therefore sorted by bucket descending to get reading order, and the gap
//! between two consecutive lines is `previous.bottom − current.top`.
//!
//! ## Algorithm
//!
//! 1. Group words into lines by `floor(bottom / bucket_size)`
//! 2. Mean font size over the page's words (size-0 glyphs excluded)
//! 3. Heading iff `max_font_size ≥ heading_ratio × mean` and the line is short
//! 4. Body lines fold into paragraphs; a gap strictly larger than
//!    `gap_ratio × mean` starts a new one
//! 5. A trailing `-` (or soft hyphen) joins the next line with no space

use crate::model::{HeadingLevel, TextBlock};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// One word as placed on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bounds: Rect,
    /// Scaled font size in points. `0.0` for glyphs pdfium could not size.
    pub font_size: f32,
}

impl Word {
    pub fn new(text: impl Into<String>, bounds: Rect, font_size: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            font_size,
        }
    }
}

/// Words sharing a vertical bucket, in left-to-right order.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub words: Vec<Word>,
    /// Quantised bottom coordinate; grouping key only.
    pub bucket: i64,
    pub max_font_size: f32,
    /// Highest `top` among the words.
    pub top: f32,
    /// Lowest `bottom` among the words.
    pub bottom: f32,
}

impl Line {
    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Tunables for layout reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// Height of a line bucket in points. Default: 5.
    pub bucket_size: f32,
    /// Heading threshold as a multiple of the page's mean font size. Default: 1.2.
    pub heading_ratio: f32,
    /// Headings must be strictly shorter than this (in chars). Default: 100.
    pub max_heading_chars: usize,
    /// Paragraph gap as a multiple of the mean font size. Default: 1.5.
    pub gap_ratio: f32,
    /// Pages scanned for an embedded cover image. Default: 3.
    pub cover_scan_pages: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            bucket_size: 5.0,
            heading_ratio: 1.2,
            max_heading_chars: 100,
            gap_ratio: 1.5,
            cover_scan_pages: 3,
        }
    }
}

// ── Step 1: Line grouping ────────────────────────────────────────────────────

/// Partition words into lines, top of page first.
pub fn group_lines(words: &[Word], bucket_size: f32) -> Vec<Line> {
    let bucket_size = if bucket_size > 0.0 { bucket_size } else { 5.0 };

    let mut lines: Vec<Line> = Vec::new();
    for word in words {
        let bucket = (word.bounds.bottom / bucket_size).floor() as i64;
        match lines.iter_mut().find(|l| l.bucket == bucket) {
            Some(line) => line.words.push(word.clone()),
            None => lines.push(Line {
                words: vec![word.clone()],
                bucket,
                max_font_size: 0.0,
                top: f32::MIN,
                bottom: f32::MAX,
            }),
        }
    }

    for line in &mut lines {
        line.words.sort_by(|a, b| a.bounds.left.total_cmp(&b.bounds.left));
        for w in &line.words {
            line.max_font_size = line.max_font_size.max(w.font_size);
            line.top = line.top.max(w.bounds.top);
            line.bottom = line.bottom.min(w.bounds.bottom);
        }
    }

    lines.sort_by(|a, b| b.bucket.cmp(&a.bucket));
    lines
}

// ── Step 2: Heading threshold ────────────────────────────────────────────────

/// Mean font size over words with a non-zero size; `None` if there are none.
pub fn mean_font_size(words: &[Word]) -> Option<f32> {
    let sized: Vec<f32> = words
        .iter()
        .map(|w| w.font_size)
        .filter(|&s| s > 0.0)
        .collect();
    if sized.is_empty() {
        return None;
    }
    Some(sized.iter().sum::<f32>() / sized.len() as f32)
}

fn is_heading(line: &Line, text: &str, threshold: Option<f32>, opts: &LayoutOptions) -> bool {
    match threshold {
        Some(t) => line.max_font_size >= t && text.chars().count() < opts.max_heading_chars,
        None => false,
    }
}

// ── Step 4: Hyphenation join ─────────────────────────────────────────────────

/// Append a continuation line to an accumulating paragraph.
///
/// A trailing `-` or U+00AD is dropped and the line is glued on directly;
/// otherwise a single space separates the two.
pub fn join_line(paragraph: &mut String, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if paragraph.ends_with('-') || paragraph.ends_with('\u{00AD}') {
        paragraph.pop();
    } else if !paragraph.is_empty() {
        paragraph.push(' ');
    }
    paragraph.push_str(line);
}

// ── Steps 3–6: Fold over lines ───────────────────────────────────────────────

/// Accumulator threaded through the per-page fold.
#[derive(Debug, Default)]
struct PageState {
    current_paragraph: Option<String>,
    previous_bottom: Option<f32>,
    blocks: Vec<TextBlock>,
}

impl PageState {
    fn flush(&mut self) {
        if let Some(text) = self.current_paragraph.take() {
            let block = TextBlock::paragraph(&text);
            if !block.text.is_empty() {
                self.blocks.push(block);
            }
        }
    }
}

/// Whether a body line starts a new paragraph. Strict comparison: a gap
/// exactly equal to `gap_ratio × mean` is a continuation.
pub fn starts_new_paragraph(
    previous_bottom: Option<f32>,
    current_top: f32,
    mean: f32,
    gap_ratio: f32,
) -> bool {
    match previous_bottom {
        None => true,
        Some(prev) => prev - current_top > gap_ratio * mean,
    }
}

fn step(
    mut state: PageState,
    line: &Line,
    mean: f32,
    threshold: Option<f32>,
    opts: &LayoutOptions,
) -> PageState {
    let text = line.text();

    if is_heading(line, &text, threshold, opts) {
        state.flush();
        let heading = TextBlock::heading(HeadingLevel::H2, &text);
        if !heading.text.is_empty() {
            state.blocks.push(heading);
        }
        state.previous_bottom = None;
        return state;
    }

    let new_paragraph = state.current_paragraph.is_none()
        || starts_new_paragraph(state.previous_bottom, line.top, mean, opts.gap_ratio);
    if new_paragraph {
        state.flush();
        state.current_paragraph = Some(String::new());
    }
    if let Some(paragraph) = state.current_paragraph.as_mut() {
        join_line(paragraph, &text);
    }
    state.previous_bottom = Some(line.bottom);
    state
}

/// Reconstruct one page's blocks from its words.
pub fn layout_page(words: &[Word], opts: &LayoutOptions) -> Vec<TextBlock> {
    let lines = group_lines(words, opts.bucket_size);
    if lines.is_empty() {
        return Vec::new();
    }

    let mean = mean_font_size(words);
    let threshold = mean.map(|m| m * opts.heading_ratio);
    let mean = mean.unwrap_or(0.0);

    let mut state = lines.iter().fold(PageState::default(), |state, line| {
        step(state, line, mean, threshold, opts)
    });
    state.flush();
    state.blocks
}

/// Lay out every page and concatenate the blocks in page order.
pub fn layout_document(pages: &[Vec<Word>], opts: &LayoutOptions) -> Vec<TextBlock> {
    pages
        .iter()
        .flat_map(|words| layout_page(words, opts))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockKind;

    /// A single-word-per-line helper: `bottom` is the baseline, the glyph box
    /// extends `size` points above it.
    fn word(text: &str, left: f32, bottom: f32, size: f32) -> Word {
        Word::new(
            text,
            Rect {
                left,
                right: left + text.len() as f32 * size * 0.5,
                top: bottom + size,
                bottom,
            },
            size,
        )
    }

    #[test]
    fn test_group_lines_sorts_top_down_and_left_right() {
        let words = vec![
            word("second", 10.0, 700.0, 10.0),
            word("world", 60.0, 750.0, 10.0),
            word("hello", 10.0, 751.0, 10.0),
        ];
        let lines = group_lines(&words, 5.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "hello world");
        assert_eq!(lines[1].text(), "second");
    }

    #[test]
    fn test_empty_page_has_no_blocks() {
        assert!(layout_page(&[], &LayoutOptions::default()).is_empty());
    }

    #[test]
    fn test_mean_excludes_zero_sizes() {
        let words = vec![word("a", 0.0, 0.0, 10.0), word("b", 0.0, 0.0, 0.0)];
        assert_eq!(mean_font_size(&words), Some(10.0));
        assert_eq!(mean_font_size(&[word("c", 0.0, 0.0, 0.0)]), None);
    }

    #[test]
    fn test_all_zero_sizes_yield_no_headings() {
        let words = vec![
            word("Title", 10.0, 700.0, 0.0),
            word("body", 10.0, 690.0, 0.0),
        ];
        let blocks = layout_page(&words, &LayoutOptions::default());
        assert!(blocks.iter().all(|b| !b.is_heading()));
    }

    #[test]
    fn test_long_large_line_is_body() {
        let long = "x".repeat(120);
        let words = vec![
            word(&long, 10.0, 700.0, 20.0),
            word("small", 10.0, 680.0, 10.0),
            word("small", 10.0, 668.0, 10.0),
        ];
        let blocks = layout_page(&words, &LayoutOptions::default());
        assert!(blocks.iter().all(|b| b.kind == BlockKind::Paragraph));
    }

    #[test]
    fn test_heading_resets_paragraph() {
        let words = vec![
            word("intro", 10.0, 700.0, 10.0),
            word("Heading", 10.0, 688.0, 16.0),
            // Tight gap, but the heading forces a fresh paragraph.
            word("after", 10.0, 676.0, 10.0),
            word("more", 10.0, 664.0, 10.0),
        ];
        let blocks = layout_page(&words, &LayoutOptions::default());
        assert_eq!(
            blocks,
            vec![
                TextBlock::paragraph("intro"),
                TextBlock::heading(HeadingLevel::H2, "Heading"),
                TextBlock::paragraph("after more"),
            ]
        );
    }

    #[test]
    fn test_join_line_rules() {
        let mut p = String::from("Hello-");
        join_line(&mut p, "World");
        assert_eq!(p, "HelloWorld");

        let mut p = String::from("soft\u{00AD}");
        join_line(&mut p, "ware");
        assert_eq!(p, "software");

        let mut p = String::from("plain");
        join_line(&mut p, "text");
        assert_eq!(p, "plain text");

        let mut p = String::new();
        join_line(&mut p, "  first  ");
        assert_eq!(p, "first");
    }

    #[test]
    fn test_gap_comparison_is_strict() {
        // mean 10 → limit 15
        assert!(!starts_new_paragraph(Some(100.0), 85.0, 10.0, 1.5));
        assert!(starts_new_paragraph(Some(100.0), 84.9, 10.0, 1.5));
        assert!(starts_new_paragraph(None, 85.0, 10.0, 1.5));
    }

    #[test]
    fn test_pages_concatenate_in_order() {
        let pages = vec![
            vec![word("one", 10.0, 700.0, 10.0)],
            vec![],
            vec![word("two", 10.0, 700.0, 10.0)],
        ];
        let blocks = layout_document(&pages, &LayoutOptions::default());
        assert_eq!(
            blocks,
            vec![TextBlock::paragraph("one"), TextBlock::paragraph("two")]
        );
    }
}
