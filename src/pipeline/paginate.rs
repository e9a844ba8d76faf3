//! Paginated (PDF) rendering.
//!
//! Two steps:
//!
//! 1. [`paginate`] is pure layout: blocks → pages of positioned words. Body
//!    lines are justified by spreading the leftover width across word gaps;
//!    the last line of a paragraph keeps normal spacing. Pages break when the
//!    next line would cross the bottom margin.
//! 2. [`render_pdf`] serialises the layout with `printpdf` 0.8 using the
//!    built-in Times fonts, adding a running header, a `Page N of M` footer
//!    and an optional full-page cover.
//!
//! Glyph widths come from an approximate Times metric table; the built-in
//! fonts carry no metrics we can query at layout time.

use crate::model::{HeadingLevel, TextBlock};
use crate::pipeline::extract::CoverImage;
use crate::pipeline::markup::strip_emphasis;
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, warn};

pub const H1_SIZE: f32 = 18.0;
pub const H2_SIZE: f32 = 14.0;
pub const BODY_SIZE: f32 = 11.0;
const HEADER_SIZE: f32 = 9.0;
/// Baseline-to-baseline distance as a multiple of the font size.
const LEADING: f32 = 1.4;
const MM_PER_PT: f32 = 25.4 / 72.0;

/// Page geometry in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSetup {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageSetup {
    pub fn a4() -> Self {
        Self {
            width: Mm(210.0).into_pt().0,
            height: Mm(297.0).into_pt().0,
            margin: Mm(20.0).into_pt().0,
        }
    }

    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn size_mm(&self) -> (Mm, Mm) {
        (Mm(self.width * MM_PER_PT), Mm(self.height * MM_PER_PT))
    }
}

impl Default for PageSetup {
    fn default() -> Self {
        Self::a4()
    }
}

/// One word at its final x position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub text: String,
    pub x: f32,
}

/// One line of text; `y` is the baseline, measured from the page bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub words: Vec<PlacedWord>,
}

impl PlacedLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Right edge of the last word.
    pub fn right_edge(&self) -> f32 {
        self.words
            .last()
            .map(|w| w.x + text_width(&w.text, self.size))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutPage {
    /// 1-based, cover excluded.
    pub number: usize,
    pub lines: Vec<PlacedLine>,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedDocument {
    pub title: String,
    pub setup: PageSetup,
    pub pages: Vec<LaidOutPage>,
}

// ── Metrics ──────────────────────────────────────────────────────────────

/// Approximate Times-Roman advance width in em.
fn char_width_em(c: char) -> f32 {
    match c {
        ' ' => 0.25,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' => 0.28,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' => 0.33,
        'm' | 'w' => 0.72,
        'M' | 'W' => 0.89,
        'A'..='Z' => 0.67,
        '0'..='9' => 0.5,
        _ if c.is_alphabetic() => 0.47,
        _ => 0.5,
    }
}

/// Approximate rendered width of `text` at `size` points.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(char_width_em).sum::<f32>() * size
}

// ── Layout ───────────────────────────────────────────────────────────────

fn style_for(block: &TextBlock) -> (f32, bool) {
    match block.heading_level() {
        Some(HeadingLevel::H1) => (H1_SIZE, true),
        Some(_) => (H2_SIZE, true),
        None => (BODY_SIZE, false),
    }
}

/// Split a word that does not fit on a line into pieces that do.
fn break_word(word: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        if !current.is_empty() && text_width(&current, size) + char_width_em(c) * size > max_width
        {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Greedy line breaking; each line is the list of its words.
fn wrap_words(text: &str, size: f32, max_width: f32) -> Vec<Vec<String>> {
    let space = char_width_em(' ') * size;
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut width = 0.0f32;

    for word in text.split_whitespace() {
        for piece in break_word(word, size, max_width) {
            let w = text_width(&piece, size);
            let needed = if current.is_empty() { w } else { width + space + w };
            if !current.is_empty() && needed > max_width {
                lines.push(std::mem::take(&mut current));
                width = w;
            } else {
                width = needed;
            }
            current.push(piece);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Position words on a line starting at `left`.
fn place_words(
    words: Vec<String>,
    size: f32,
    left: f32,
    max_width: f32,
    justify: bool,
) -> Vec<PlacedWord> {
    let space = char_width_em(' ') * size;
    let widths: Vec<f32> = words.iter().map(|w| text_width(w, size)).collect();
    let gap = if justify && words.len() > 1 {
        let used: f32 = widths.iter().sum();
        ((max_width - used) / (words.len() - 1) as f32).max(space)
    } else {
        space
    };

    let mut x = left;
    words
        .into_iter()
        .zip(widths)
        .map(|(text, w)| {
            let placed = PlacedWord { text, x };
            x += w + gap;
            placed
        })
        .collect()
}

struct PageCursor {
    setup: PageSetup,
    pages: Vec<Vec<PlacedLine>>,
    current: Vec<PlacedLine>,
    /// Baseline of the last line placed, or the top margin on a fresh page.
    y: f32,
}

impl PageCursor {
    fn new(setup: PageSetup) -> Self {
        Self {
            setup,
            pages: Vec::new(),
            current: Vec::new(),
            y: setup.height - setup.margin,
        }
    }

    fn at_page_top(&self) -> bool {
        self.current.is_empty()
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = self.setup.height - self.setup.margin;
    }

    /// Advance by `extra` points of vertical space, unless at the top of a page.
    fn skip(&mut self, extra: f32) {
        if !self.at_page_top() {
            self.y -= extra;
        }
    }

    fn push(&mut self, size: f32, bold: bool, words: Vec<PlacedWord>) {
        let advance = size * LEADING;
        if self.y - advance < self.setup.margin && !self.at_page_top() {
            self.break_page();
        }
        self.y -= advance;
        self.current.push(PlacedLine {
            y: self.y,
            size,
            bold,
            words,
        });
    }

    fn finish(mut self) -> Vec<Vec<PlacedLine>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Lay out `blocks` on pages. Always yields at least one page.
pub fn paginate(blocks: &[TextBlock], title: &str, setup: PageSetup) -> PaginatedDocument {
    let max_width = setup.text_width();
    let mut cursor = PageCursor::new(setup);

    for block in blocks {
        let text = strip_emphasis(&block.text);
        if text.trim().is_empty() {
            continue;
        }
        let (size, bold) = style_for(block);

        if block.is_heading() {
            cursor.skip(size * 0.8);
        }

        let lines = wrap_words(&text, size, max_width);
        let last = lines.len().saturating_sub(1);
        for (i, words) in lines.into_iter().enumerate() {
            let justify = !bold && i < last;
            let placed = place_words(words, size, setup.margin, max_width, justify);
            cursor.push(size, bold, placed);
        }

        cursor.skip(if bold { size * 0.4 } else { size * 0.5 });
    }

    let raw_pages = cursor.finish();
    let total = raw_pages.len();
    let pages = raw_pages
        .into_iter()
        .enumerate()
        .map(|(i, lines)| LaidOutPage {
            number: i + 1,
            lines,
            footer: format!("Page {} of {}", i + 1, total),
        })
        .collect();

    PaginatedDocument {
        title: title.to_string(),
        setup,
        pages,
    }
}

// ── Serialisation ────────────────────────────────────────────────────────

fn text_ops(ops: &mut Vec<Op>, text: &str, x: f32, y: f32, size: f32, font: BuiltinFont) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(text.to_string())],
        font,
    });
    ops.push(Op::EndTextSection);
}

fn cover_page(doc: &mut PdfDocument, cover: &CoverImage, setup: PageSetup) -> Option<PdfPage> {
    let Some(img) = cover.decode() else {
        warn!("Cover image could not be decoded; PDF written without a cover");
        return None;
    };
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    if w == 0 || h == 0 {
        return None;
    }
    let raw = RawImage {
        pixels: RawImageData::U8(rgb.into_raw()),
        width: w,
        height: h,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    };
    let id = doc.add_image(&raw);

    // At 72 dpi one pixel is one point.
    let dpi = 72.0f32;
    let usable_w = setup.width - 2.0 * setup.margin;
    let usable_h = setup.height - 2.0 * setup.margin;
    let scale = (usable_w / w as f32).min(usable_h / h as f32);
    let drawn_w = w as f32 * scale;
    let drawn_h = h as f32 * scale;

    let ops = vec![Op::UseXobject {
        id,
        transform: XObjectTransform {
            translate_x: Some(Pt((setup.width - drawn_w) / 2.0)),
            translate_y: Some(Pt((setup.height - drawn_h) / 2.0)),
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(dpi),
            rotate: None,
        },
    }];
    let (w_mm, h_mm) = setup.size_mm();
    Some(PdfPage::new(w_mm, h_mm, ops))
}

/// Serialise a laid-out document to PDF bytes.
pub fn render_pdf(layout: &PaginatedDocument, cover: Option<&CoverImage>) -> Vec<u8> {
    let setup = layout.setup;
    let mut doc = PdfDocument::new(&layout.title);
    let mut pages: Vec<PdfPage> = Vec::with_capacity(layout.pages.len() + 1);

    if let Some(page) = cover.and_then(|c| cover_page(&mut doc, c, setup)) {
        pages.push(page);
    }

    for page in &layout.pages {
        let mut ops: Vec<Op> = Vec::new();

        if !layout.title.is_empty() {
            let y = setup.height - setup.margin / 2.0;
            text_ops(
                &mut ops,
                &layout.title,
                setup.margin,
                y,
                HEADER_SIZE,
                BuiltinFont::TimesItalic,
            );
        }

        for line in &page.lines {
            let font = if line.bold {
                BuiltinFont::TimesBold
            } else {
                BuiltinFont::TimesRoman
            };
            for word in &line.words {
                text_ops(&mut ops, &word.text, word.x, line.y, line.size, font);
            }
        }

        let footer_x = (setup.width - text_width(&page.footer, HEADER_SIZE)) / 2.0;
        text_ops(
            &mut ops,
            &page.footer,
            footer_x,
            setup.margin / 2.0,
            HEADER_SIZE,
            BuiltinFont::TimesRoman,
        );

        let (w_mm, h_mm) = setup.size_mm();
        pages.push(PdfPage::new(w_mm, h_mm, ops));
    }

    doc.with_pages(pages);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    debug!(
        "PDF rendered: {} pages, {} warnings, {} bytes",
        layout.pages.len(),
        warnings.len(),
        bytes.len()
    );
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_paragraph(words: usize) -> TextBlock {
        TextBlock::paragraph(vec!["lorem"; words].join(" "))
    }

    #[test]
    fn empty_input_has_one_blank_page() {
        let doc = paginate(&[], "T", PageSetup::a4());
        assert_eq!(doc.pages.len(), 1);
        assert!(doc.pages[0].lines.is_empty());
        assert_eq!(doc.pages[0].footer, "Page 1 of 1");
    }

    #[test]
    fn body_lines_are_justified_except_the_last() {
        let setup = PageSetup::a4();
        let doc = paginate(&[long_paragraph(80)], "T", setup);
        let lines = &doc.pages[0].lines;
        assert!(lines.len() >= 2);
        let right = setup.width - setup.margin;
        for line in &lines[..lines.len() - 1] {
            assert!((line.right_edge() - right).abs() < 0.5, "{}", line.right_edge());
        }
        assert!(lines.last().unwrap().right_edge() < right - 1.0);
    }

    #[test]
    fn heading_tiers_use_their_sizes() {
        let blocks = vec![
            TextBlock::heading(HeadingLevel::H1, "Big"),
            TextBlock::heading(HeadingLevel::H2, "Medium"),
            TextBlock::heading(HeadingLevel::H3, "Also medium"),
            TextBlock::paragraph("body"),
        ];
        let doc = paginate(&blocks, "T", PageSetup::a4());
        let sizes: Vec<f32> = doc.pages[0].lines.iter().map(|l| l.size).collect();
        assert_eq!(sizes, vec![H1_SIZE, H2_SIZE, H2_SIZE, BODY_SIZE]);
        assert!(doc.pages[0].lines[0].bold);
        assert!(!doc.pages[0].lines[3].bold);
    }

    #[test]
    fn long_text_breaks_pages_and_numbers_them() {
        let blocks: Vec<TextBlock> = (0..40).map(|_| long_paragraph(60)).collect();
        let setup = PageSetup::a4();
        let doc = paginate(&blocks, "T", setup);
        assert!(doc.pages.len() > 1);
        let total = doc.pages.len();
        assert_eq!(doc.pages[total - 1].footer, format!("Page {total} of {total}"));
        for page in &doc.pages {
            assert!(page.lines.iter().all(|l| l.y >= setup.margin));
            assert!(page.lines.windows(2).all(|w| w[0].y > w[1].y));
        }
    }

    #[test]
    fn emphasis_markers_are_dropped() {
        let doc = paginate(&[TextBlock::paragraph("a **bold** word")], "T", PageSetup::a4());
        assert_eq!(doc.pages[0].lines[0].text(), "a bold word");
    }

    #[test]
    fn overlong_word_is_broken() {
        let word = "x".repeat(400);
        let doc = paginate(&[TextBlock::paragraph(&word)], "T", PageSetup::a4());
        let joined: String = doc.pages[0].lines.iter().map(|l| l.text()).collect();
        assert_eq!(joined, word);
        assert!(doc.pages[0].lines.len() > 1);
    }

    #[test]
    fn render_produces_pdf_bytes() {
        let doc = paginate(&[long_paragraph(20)], "Title", PageSetup::a4());
        let bytes = render_pdf(&doc, None);
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn undecodable_cover_is_skipped() {
        let doc = paginate(&[], "Title", PageSetup::a4());
        let cover = CoverImage {
            bytes: vec![1, 2, 3],
            media_type: "image/png",
        };
        let bytes = render_pdf(&doc, Some(&cover));
        assert!(bytes.starts_with(b"%PDF"));
    }
}
