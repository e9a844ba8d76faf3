//! Unit translation: blocks (or flattened text) → translated blocks.
//!
//! One [`TranslationUnit`] per block. Units go to the backend one at a time,
//! in order, each under its own deadline. A unit that fails for any reason
//! (provider error, timeout, empty answer) keeps its source text; nothing a
//! backend does can reorder, drop or abort the document.
//!
//! Progress is reported after **every** unit, blank pass-throughs included,
//! so `completed` runs `1, 2, …, total` with no gaps.

use crate::cancel::CancellationFlag;
use crate::error::{Pdf2EpubError, TranslateError};
use crate::model::{split_heading_marker, split_units, HeadingLevel, TextBlock};
use crate::translator::Translator;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One independently translatable chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Position in the document, 0-based.
    pub index: usize,
    /// Text without any heading marker.
    pub text: String,
    /// Set for units that came from a heading; the marker is reattached
    /// after translation.
    pub heading: Option<HeadingLevel>,
}

impl TranslationUnit {
    pub fn from_block(index: usize, block: &TextBlock) -> Self {
        Self {
            index,
            text: block.text.clone(),
            heading: block.heading_level(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Counts for one job's translation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSummary {
    pub total: usize,
    pub translated: usize,
    /// Units that kept their source text because the backend failed.
    pub failed: usize,
    /// Blank units passed through without a backend call.
    pub skipped: usize,
}

impl TranslationSummary {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }

    /// Note recorded on the job when some units stayed untranslated.
    pub fn partial_note(&self) -> Option<String> {
        if !self.is_partial() {
            return None;
        }
        Some(format!(
            "partially translated ({}/{} units kept in source language)",
            self.failed, self.total
        ))
    }
}

/// Settings for one translation pass.
#[derive(Debug, Clone)]
pub struct TranslateOptions<'a> {
    pub target: &'a str,
    /// ISO code or `"auto"`.
    pub source: &'a str,
    pub unit_timeout: Duration,
}

/// Translate one unit; `Err` means "keep the original".
async fn translate_unit(
    translator: &dyn Translator,
    unit: &TranslationUnit,
    opts: &TranslateOptions<'_>,
) -> Result<String, TranslateError> {
    let call = translator.translate(&unit.text, opts.target, opts.source);
    let translated = match tokio::time::timeout(opts.unit_timeout, call).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TranslateError::Timeout {
                provider: translator.name().to_string(),
                secs: opts.unit_timeout.as_secs(),
            })
        }
    };
    let translated = translated.trim();
    if translated.is_empty() {
        return Err(TranslateError::EmptyResponse {
            provider: translator.name().to_string(),
        });
    }
    Ok(translated.to_string())
}

/// Translate `blocks` in order, one unit per block.
///
/// `on_progress(completed, total)` fires after every unit. Cancellation is
/// checked before each unit.
pub async fn translate_blocks<F>(
    blocks: &[TextBlock],
    translator: &dyn Translator,
    opts: &TranslateOptions<'_>,
    cancel: &CancellationFlag,
    mut on_progress: F,
) -> Result<(Vec<TextBlock>, TranslationSummary), Pdf2EpubError>
where
    F: FnMut(usize, usize),
{
    let total = blocks.len();
    let mut summary = TranslationSummary {
        total,
        ..Default::default()
    };
    let mut out = Vec::with_capacity(total);

    info!(
        "Translating {} units into '{}' via {}",
        total,
        opts.target,
        translator.name()
    );

    for (index, block) in blocks.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Pdf2EpubError::Cancelled);
        }

        let unit = TranslationUnit::from_block(index, block);
        if unit.is_blank() {
            summary.skipped += 1;
            out.push(block.clone());
        } else {
            match translate_unit(translator, &unit, opts).await {
                Ok(text) => {
                    summary.translated += 1;
                    out.push(block.with_text(text));
                }
                Err(e) => {
                    warn!("Unit {}/{} kept in source language: {}", index + 1, total, e);
                    summary.failed += 1;
                    out.push(block.clone());
                }
            }
        }

        debug!("Unit {}/{} done", index + 1, total);
        on_progress(index + 1, total);
    }

    Ok((out, summary))
}

/// Translate flattened text (blank-line separated units, `#` markers).
///
/// Blank units pass through untouched; heading markers are stripped before
/// the backend call and reattached after. The result uses the same form.
pub async fn translate_text<F>(
    text: &str,
    translator: &dyn Translator,
    opts: &TranslateOptions<'_>,
    cancel: &CancellationFlag,
    mut on_progress: F,
) -> Result<(String, TranslationSummary), Pdf2EpubError>
where
    F: FnMut(usize, usize),
{
    let units = split_units(text);
    let total = units.len();
    let mut summary = TranslationSummary {
        total,
        ..Default::default()
    };
    let mut out: Vec<String> = Vec::with_capacity(total);

    for (index, raw) in units.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Pdf2EpubError::Cancelled);
        }

        let (heading, body) = split_heading_marker(raw);
        let unit = TranslationUnit {
            index,
            text: body.to_string(),
            heading,
        };

        if unit.is_blank() {
            summary.skipped += 1;
            out.push(raw.to_string());
        } else {
            match translate_unit(translator, &unit, opts).await {
                Ok(translated) => {
                    summary.translated += 1;
                    out.push(match heading {
                        Some(level) => format!("{} {}", level.marker(), translated),
                        None => translated,
                    });
                }
                Err(e) => {
                    warn!("Unit {}/{} kept in source language: {}", index + 1, total, e);
                    summary.failed += 1;
                    out.push(raw.to_string());
                }
            }
        }

        on_progress(index + 1, total);
    }

    let mut joined = out.join("\n\n");
    if !joined.is_empty() {
        joined.push('\n');
    }
    Ok((joined, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Upper;

    #[async_trait]
    impl Translator for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, TranslateError> {
            if text.contains("FAIL") || text.contains("fail") {
                return Err(TranslateError::Provider {
                    provider: "upper".into(),
                    message: "refused".into(),
                });
            }
            if text.contains("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if text.contains("blank") {
                return Ok("   ".into());
            }
            Ok(text.to_uppercase())
        }
    }

    fn opts() -> TranslateOptions<'static> {
        TranslateOptions {
            target: "xx",
            source: "auto",
            unit_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn headings_keep_their_level() {
        let blocks = vec![
            TextBlock::heading(HeadingLevel::H2, "title"),
            TextBlock::paragraph("body"),
        ];
        let (out, summary) =
            translate_blocks(&blocks, &Upper, &opts(), &CancellationFlag::new(), |_, _| {})
                .await
                .unwrap();
        assert_eq!(
            out,
            vec![
                TextBlock::heading(HeadingLevel::H2, "TITLE"),
                TextBlock::paragraph("BODY"),
            ]
        );
        assert_eq!(summary.translated, 2);
        assert!(summary.partial_note().is_none());
    }

    #[tokio::test]
    async fn timeout_and_empty_answers_keep_source() {
        let blocks = vec![
            TextBlock::paragraph("slow one"),
            TextBlock::paragraph("blank answer"),
            TextBlock::paragraph("fine"),
        ];
        let (out, summary) =
            translate_blocks(&blocks, &Upper, &opts(), &CancellationFlag::new(), |_, _| {})
                .await
                .unwrap();
        assert_eq!(out[0].text, "slow one");
        assert_eq!(out[1].text, "blank answer");
        assert_eq!(out[2].text, "FINE");
        assert_eq!(summary.failed, 2);
        assert_eq!(
            summary.partial_note().as_deref(),
            Some("partially translated (2/3 units kept in source language)")
        );
    }

    #[tokio::test]
    async fn cancelled_before_first_unit() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let blocks = vec![TextBlock::paragraph("x")];
        let result = translate_blocks(&blocks, &Upper, &opts(), &cancel, |_, _| {}).await;
        assert!(matches!(result, Err(Pdf2EpubError::Cancelled)));
    }

    #[tokio::test]
    async fn text_form_reattaches_markers_and_passes_blanks() {
        let text = "## chapter one\n\n   \n\nsome words\n\n### fail here\n";
        let mut seen = Vec::new();
        let (out, summary) = translate_text(
            text,
            &Upper,
            &opts(),
            &CancellationFlag::new(),
            |done, total| seen.push((done, total)),
        )
        .await
        .unwrap();
        assert_eq!(out, "## CHAPTER ONE\n\n   \n\nSOME WORDS\n\n### fail here\n");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test]
    async fn empty_input_reports_nothing() {
        let mut calls = 0;
        let (out, summary) =
            translate_blocks(&[], &Upper, &opts(), &CancellationFlag::new(), |_, _| calls += 1)
                .await
                .unwrap();
        assert!(out.is_empty());
        assert_eq!(summary, TranslationSummary::default());
        assert_eq!(calls, 0);
    }
}
