//! Text extraction: PDF → positioned words → [`TextBlock`]s, plus cover image.
//!
//! ## Fail-soft
//!
//! [`extract_document`] never returns an error. Open/parse failures, pdfium
//! binding failures, a panicking worker, or a document with no extractable
//! words all collapse into a single paragraph block describing the problem,
//! and [`ExtractedDocument::degraded`] is set. A batch keeps going past
//! unreadable files; the job report carries the note.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a synchronous C++ library with thread-local state. All calls
//! into it run on the blocking pool so Tokio workers never stall.

use crate::model::TextBlock;
use crate::pipeline::layout::{layout_document, LayoutOptions, Rect, Word};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Title/author pulled from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// An encoded cover image ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    /// `image/jpeg` or `image/png`.
    pub media_type: &'static str,
}

impl CoverImage {
    /// File extension matching [`CoverImage::media_type`].
    pub fn extension(&self) -> &'static str {
        match self.media_type {
            "image/png" => "png",
            _ => "jpg",
        }
    }

    /// Encode a decoded image as JPEG.
    pub fn from_image(img: &DynamicImage) -> Option<Self> {
        let rgb = img.to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        match rgb.write_to(&mut buf, ImageFormat::Jpeg) {
            Ok(()) => Some(Self {
                bytes: buf.into_inner(),
                media_type: "image/jpeg",
            }),
            Err(e) => {
                debug!("Cover JPEG encoding failed: {}", e);
                None
            }
        }
    }

    /// Decode pixels back out. Used by the paginated renderer.
    pub fn decode(&self) -> Option<DynamicImage> {
        image::load_from_memory(&self.bytes).ok()
    }
}

/// Result of extracting one PDF.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Always non-empty.
    pub blocks: Vec<TextBlock>,
    pub metadata: DocumentMetadata,
    pub page_count: usize,
    /// `true` when `blocks` is the single error-message fallback.
    pub degraded: bool,
}

impl ExtractedDocument {
    fn fallback(message: impl Into<String>) -> Self {
        Self {
            blocks: vec![TextBlock::paragraph(message.into())],
            metadata: DocumentMetadata::default(),
            page_count: 0,
            degraded: true,
        }
    }
}

/// Why an extraction produced nothing usable.
#[derive(Debug)]
enum ExtractFailure {
    NotAPdf,
    Io(std::io::Error),
    Bind(String),
    Open(String),
    NoText { page_count: usize, metadata: DocumentMetadata },
}

impl ExtractFailure {
    fn message(&self, path: &Path) -> String {
        let name = path.display();
        match self {
            ExtractFailure::NotAPdf => {
                format!("[Extraction failed: '{name}' is not a PDF document]")
            }
            ExtractFailure::Io(e) => format!("[Extraction failed: cannot read '{name}': {e}]"),
            ExtractFailure::Bind(e) => {
                format!("[Extraction failed: PDF engine unavailable: {e}]")
            }
            ExtractFailure::Open(e) => {
                format!("[Extraction failed: cannot open '{name}': {e}]")
            }
            ExtractFailure::NoText { page_count, .. } => format!(
                "[Extraction failed: no selectable text found in '{name}' ({page_count} pages). \
                 Scanned documents need OCR first.]"
            ),
        }
    }
}

/// Readers accept the header anywhere in this many leading bytes.
const MAGIC_SCAN_BYTES: usize = 1024;

/// `true` when `%PDF` appears within the first 1024 bytes.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(MAGIC_SCAN_BYTES)];
    head.windows(4).any(|w| w == b"%PDF")
}

/// Extract structured text and metadata from a PDF. Never fails.
pub async fn extract_document(pdf_path: &Path, opts: &LayoutOptions) -> ExtractedDocument {
    let path = pdf_path.to_path_buf();
    let opts = *opts;

    let joined =
        tokio::task::spawn_blocking(move || extract_document_blocking(&path, &opts)).await;

    let result = match joined {
        Ok(r) => r,
        Err(e) => {
            warn!("Extraction task panicked: {}", e);
            return ExtractedDocument::fallback(format!(
                "[Extraction failed: internal error: {e}]"
            ));
        }
    };

    match result {
        Ok(doc) => {
            info!(
                "Extracted {} blocks from {} pages",
                doc.blocks.len(),
                doc.page_count
            );
            doc
        }
        Err(failure) => {
            let message = failure.message(pdf_path);
            warn!("{}", message);
            let mut doc = ExtractedDocument::fallback(message);
            if let ExtractFailure::NoText {
                page_count,
                metadata,
            } = failure
            {
                doc.page_count = page_count;
                doc.metadata = metadata;
            }
            doc
        }
    }
}

fn extract_document_blocking(
    pdf_path: &Path,
    opts: &LayoutOptions,
) -> Result<ExtractedDocument, ExtractFailure> {
    let bytes = std::fs::read(pdf_path).map_err(ExtractFailure::Io)?;
    // Checked before binding pdfium so garbage input never triggers a library download.
    if !has_pdf_magic(&bytes) {
        return Err(ExtractFailure::NotAPdf);
    }

    let pdfium =
        pdfium_auto::bind_pdfium_silent().map_err(|e| ExtractFailure::Bind(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(|e| ExtractFailure::Open(format!("{:?}", e)))?;

    let metadata = read_metadata(&document);
    let pages = document.pages();
    let page_count = pages.len() as usize;
    debug!("PDF loaded: {} pages", page_count);

    let mut page_words = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        let words = match page.text() {
            Ok(text) => page_words_from_text(&text),
            Err(e) => {
                debug!("Page {}: no text layer ({:?})", idx + 1, e);
                Vec::new()
            }
        };
        debug!("Page {}: {} words", idx + 1, words.len());
        page_words.push(words);
    }

    let blocks = layout_document(&page_words, opts);
    if blocks.is_empty() {
        return Err(ExtractFailure::NoText {
            page_count,
            metadata,
        });
    }

    Ok(ExtractedDocument {
        blocks,
        metadata,
        page_count,
        degraded: false,
    })
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };
    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
    }
}

/// A glyph as read from pdfium, before word merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub ch: char,
    /// Horizontal extent of the ink; vertical extent of the font box, so
    /// every glyph of one font and size on a line shares `bottom`.
    pub bounds: Rect,
    pub font_size: f32,
}

impl Glyph {
    /// Combine the ink box (`tight`) and the font box (`loose`).
    ///
    /// Descenders and accents move the ink box off the baseline; the font
    /// box does not, and line bucketing keys on `bottom`.
    pub fn from_boxes(ch: char, tight: Rect, loose: Rect, font_size: f32) -> Self {
        Self {
            ch,
            bounds: Rect {
                left: tight.left,
                right: tight.right,
                top: loose.top,
                bottom: loose.bottom,
            },
            font_size,
        }
    }
}

#[allow(deprecated)] // PdfRect field access deprecated in 0.8.28, removed in 0.9.0
fn to_rect(rect: &PdfRect) -> Rect {
    Rect {
        left: rect.left.value,
        right: rect.right.value,
        top: rect.top.value,
        bottom: rect.bottom.value,
    }
}

fn page_words_from_text(text: &PdfPageText<'_>) -> Vec<Word> {
    let mut glyphs = Vec::new();
    for ch in text.chars().iter() {
        let (Some(unicode_ch), Ok(tight)) = (ch.unicode_char(), ch.tight_bounds()) else {
            continue;
        };
        let tight = to_rect(&tight);
        let loose = ch.loose_bounds().map(|r| to_rect(&r)).unwrap_or(tight);
        glyphs.push(Glyph::from_boxes(
            unicode_ch,
            tight,
            loose,
            ch.scaled_font_size().value,
        ));
    }
    merge_glyphs(&glyphs)
}

/// Merge glyphs (in content-stream order) into words.
///
/// A word ends at whitespace, at a baseline jump larger than half the font
/// size, or at a horizontal gap wider than 30% of the average glyph width.
pub fn merge_glyphs(glyphs: &[Glyph]) -> Vec<Word> {
    let widths: Vec<f32> = glyphs
        .iter()
        .filter(|g| !g.ch.is_whitespace())
        .map(|g| (g.bounds.right - g.bounds.left).abs())
        .collect();
    let avg_width = if widths.is_empty() {
        0.0
    } else {
        widths.iter().sum::<f32>() / widths.len() as f32
    };
    let space_threshold = avg_width * 0.3;

    let mut words = Vec::new();
    let mut current: Option<(String, Rect, f32)> = None;

    for g in glyphs {
        if g.ch.is_whitespace() || g.ch.is_control() {
            if let Some(w) = current.take() {
                words.push(Word::new(w.0, w.1, w.2));
            }
            continue;
        }

        let breaks = match &current {
            None => false,
            Some((_, rect, size)) => {
                let baseline_jump = (g.bounds.bottom - rect.bottom).abs();
                let gap = g.bounds.left - rect.right;
                baseline_jump > size.max(g.font_size) * 0.5 || gap > space_threshold
            }
        };
        if breaks {
            if let Some(w) = current.take() {
                words.push(Word::new(w.0, w.1, w.2));
            }
        }

        match current.as_mut() {
            Some((text, rect, size)) => {
                text.push(g.ch);
                rect.right = rect.right.max(g.bounds.right);
                rect.top = rect.top.max(g.bounds.top);
                rect.bottom = rect.bottom.min(g.bounds.bottom);
                *size = size.max(g.font_size);
            }
            None => current = Some((g.ch.to_string(), g.bounds, g.font_size)),
        }
    }
    if let Some(w) = current {
        words.push(Word::new(w.0, w.1, w.2));
    }
    words
}

// ── Cover ────────────────────────────────────────────────────────────────────

/// First embedded image on the first `scan_pages` pages, re-encoded as JPEG.
///
/// Every failure maps to `None`; absence of a cover is not an error.
pub async fn extract_cover(pdf_path: &Path, scan_pages: usize) -> Option<CoverImage> {
    let path = pdf_path.to_path_buf();
    match tokio::task::spawn_blocking(move || extract_cover_blocking(&path, scan_pages)).await {
        Ok(cover) => cover,
        Err(e) => {
            debug!("Cover task panicked: {}", e);
            None
        }
    }
}

fn extract_cover_blocking(pdf_path: &Path, scan_pages: usize) -> Option<CoverImage> {
    let bytes = std::fs::read(pdf_path).ok()?;
    if !has_pdf_magic(&bytes) {
        return None;
    }
    let pdfium = match pdfium_auto::bind_pdfium_silent() {
        Ok(p) => p,
        Err(e) => {
            debug!("Cover: pdfium unavailable: {}", e);
            return None;
        }
    };
    let document = match pdfium.load_pdf_from_byte_slice(&bytes, None) {
        Ok(d) => d,
        Err(e) => {
            debug!("Cover: cannot open PDF: {:?}", e);
            return None;
        }
    };

    for (idx, page) in document.pages().iter().enumerate().take(scan_pages) {
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(img) => {
                    debug!(
                        "Cover: image {}x{} on page {}",
                        img.width(),
                        img.height(),
                        idx + 1
                    );
                    return CoverImage::from_image(&img);
                }
                Err(e) => debug!("Cover: unreadable image on page {}: {:?}", idx + 1, e),
            }
        }
    }
    debug!("Cover: no embedded image in first {} pages", scan_pages);
    None
}

/// Load a user-supplied cover file. PNG stays PNG; anything else decodable
/// is re-encoded as JPEG.
pub async fn load_cover_file(path: &Path) -> Result<CoverImage, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read cover '{}': {}", path.display(), e))?;
    match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => Ok(CoverImage {
            bytes,
            media_type: "image/png",
        }),
        Ok(ImageFormat::Jpeg) => Ok(CoverImage {
            bytes,
            media_type: "image/jpeg",
        }),
        _ => {
            let img = image::load_from_memory(&bytes)
                .map_err(|e| format!("cover '{}' is not an image: {}", path.display(), e))?;
            CoverImage::from_image(&img)
                .ok_or_else(|| format!("cover '{}' could not be re-encoded", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::layout_page;

    fn glyph(ch: char, left: f32, bottom: f32) -> Glyph {
        Glyph {
            ch,
            bounds: Rect {
                left,
                right: left + 5.0,
                top: bottom + 10.0,
                bottom,
            },
            font_size: 10.0,
        }
    }

    #[test]
    fn test_merge_splits_on_whitespace() {
        let glyphs = vec![
            glyph('H', 0.0, 100.0),
            glyph('i', 5.0, 100.0),
            glyph(' ', 10.0, 100.0),
            glyph('y', 12.0, 100.0),
            glyph('o', 17.0, 100.0),
        ];
        let words = merge_glyphs(&glyphs);
        let texts: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi", "yo"]);
        assert_eq!(words[0].bounds.left, 0.0);
        assert_eq!(words[0].bounds.right, 10.0);
    }

    #[test]
    fn test_merge_splits_on_horizontal_gap() {
        // avg width 5 → threshold 1.5; gap of 3 splits
        let glyphs = vec![glyph('a', 0.0, 100.0), glyph('b', 8.0, 100.0)];
        assert_eq!(merge_glyphs(&glyphs).len(), 2);
    }

    #[test]
    fn test_merge_splits_on_baseline_change() {
        let glyphs = vec![glyph('a', 0.0, 100.0), glyph('b', 5.0, 80.0)];
        assert_eq!(merge_glyphs(&glyphs).len(), 2);
    }

    #[test]
    fn test_magic_detection() {
        assert!(has_pdf_magic(b"%PDF-1.7\n"));
        assert!(!has_pdf_magic(b"PK\x03\x04"));
        assert!(!has_pdf_magic(b"%P"));
    }

    #[test]
    fn test_magic_found_after_leading_junk() {
        let mut bytes = b"\xEF\xBB\xBFjunk before the header\n".to_vec();
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert!(has_pdf_magic(&bytes));

        let mut late = vec![b' '; 1024];
        late.extend_from_slice(b"%PDF-1.4\n");
        assert!(!has_pdf_magic(&late));
    }

    #[test]
    fn test_descender_word_stays_in_its_line() {
        // One visual line at baseline 700. The ink of 'j' and 'p' dips below
        // it; the font box does not.
        let loose = |left: f32, right: f32| Rect {
            left,
            right,
            top: 711.0,
            bottom: 697.6,
        };
        let mut glyphs = Vec::new();
        let mut x = 10.0;
        for ch in "The fox jumps over".chars() {
            let right = x + 5.0;
            let ink_bottom = if "jp".contains(ch) { 697.9 } else { 700.2 };
            let tight = Rect {
                left: x,
                right,
                top: 708.0,
                bottom: ink_bottom,
            };
            glyphs.push(Glyph::from_boxes(ch, tight, loose(x, right), 10.0));
            x = right + 0.5;
        }

        let words = merge_glyphs(&glyphs);
        assert_eq!(words.len(), 4);
        assert!(words.iter().all(|w| w.bounds.bottom == 697.6));

        let blocks = layout_page(&words, &LayoutOptions::default());
        assert_eq!(blocks, vec![TextBlock::paragraph("The fox jumps over")]);
    }

    #[tokio::test]
    async fn test_non_pdf_degrades_to_single_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"this is plain text, not a PDF").unwrap();

        let doc = extract_document(&path, &LayoutOptions::default()).await;
        assert!(doc.degraded);
        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.blocks[0].text.contains("not a PDF"));
    }

    #[tokio::test]
    async fn test_missing_file_degrades() {
        let doc =
            extract_document(Path::new("/nonexistent/x.pdf"), &LayoutOptions::default()).await;
        assert!(doc.degraded);
        assert!(doc.blocks[0].text.contains("cannot read"));
    }

    #[tokio::test]
    async fn test_cover_of_non_pdf_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pdf");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(extract_cover(&path, 3).await.is_none());
    }

    #[tokio::test]
    async fn test_load_png_cover_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        let img = DynamicImage::new_rgb8(4, 4);
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let cover = load_cover_file(&path).await.unwrap();
        assert_eq!(cover.media_type, "image/png");
        assert_eq!(cover.extension(), "png");
    }

    #[tokio::test]
    async fn test_load_bad_cover_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_cover_file(&path).await.is_err());
    }
}
