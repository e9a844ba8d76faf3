//! Job and batch orchestration.
//!
//! One job runs its stages strictly in order:
//!
//! ```text
//! Extracting ──▶ Translating? ──▶ Rendering ──▶ RoundTrip? ──▶ Done
//!      └──────────────┴──────────────┴──────────────┴───────▶ Failed
//! ```
//!
//! Every transition is reported through
//! [`crate::progress::ConversionProgressCallback::on_job_stage`]. A batch runs
//! its jobs one at a time in list order; a failed job is recorded and the
//! batch moves on. The cancellation flag is checked between jobs and between
//! translation units.

use crate::cancel::CancellationFlag;
use crate::config::{ConversionConfig, OutputFormat};
use crate::error::Pdf2EpubError;
use crate::model::{blocks_to_text, TextBlock};
use crate::output::{BatchReport, ConversionJob, JobOutcome, JobReport, JobStage};
use crate::pipeline::chapters::split_chapters;
use crate::pipeline::epub::{build_epub, EpubMetadata};
use crate::pipeline::extract::{extract_cover, extract_document, load_cover_file, CoverImage};
use crate::pipeline::input::{
    ensure_dir, output_paths, remove_working_file, validate_input, write_atomic, OutputPaths,
};
use crate::pipeline::paginate::{paginate, render_pdf, PageSetup};
use crate::pipeline::roundtrip::{
    probe_converter, round_trip, RoundTripOptions, RoundTripOutcome,
};
use crate::pipeline::translate::{translate_blocks, TranslateOptions};
use crate::translator::build_translator;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Convert one file.
///
/// Never returns an error: a fatal problem ends the job and is recorded in
/// the report's outcome. Non-fatal problems become report notes.
pub async fn convert_file(
    job: &ConversionJob,
    config: &ConversionConfig,
    cancel: &CancellationFlag,
) -> JobReport {
    let available = needs_converter(std::slice::from_ref(job), config)
        && probe_converter(&config.converter_tool);
    run_job(0, job, config, available, cancel).await
}

/// Convert every job in order, continuing past failures.
pub async fn convert_batch(
    jobs: &[ConversionJob],
    config: &ConversionConfig,
    cancel: &CancellationFlag,
) -> BatchReport {
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(jobs.len());
    }
    info!("Starting batch of {} job(s)", jobs.len());

    let available = converter_available(jobs, config);
    let mut batch = BatchReport::default();

    for (index, job) in jobs.iter().enumerate() {
        let report = if cancel.is_cancelled() {
            debug!("Batch cancelled; skipping {}", job.input.display());
            JobReport::cancelled(&job.input)
        } else {
            run_job(index, job, config, available, cancel).await
        };
        if let Some(ref cb) = config.progress_callback {
            cb.on_job_complete(index, &report);
        }
        batch.push(report);
    }

    info!("Batch complete: {}", batch.status_line());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&batch);
    }
    batch
}

/// Synchronous wrapper around [`convert_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_batch_sync(
    jobs: &[ConversionJob],
    config: &ConversionConfig,
    cancel: &CancellationFlag,
) -> Result<BatchReport, Pdf2EpubError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2EpubError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_batch(jobs, config, cancel)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn needs_converter(jobs: &[ConversionJob], config: &ConversionConfig) -> bool {
    config.round_trip && jobs.iter().any(|j| j.format == OutputFormat::Epub)
}

/// Probe the converter once for the whole batch.
pub(crate) fn converter_available(jobs: &[ConversionJob], config: &ConversionConfig) -> bool {
    if !needs_converter(jobs, config) {
        return false;
    }
    let available = probe_converter(&config.converter_tool);
    if !available {
        warn!(
            "Converter '{}' not found; round-trip will be skipped",
            config.converter_tool
        );
    }
    available
}

/// Record the stage on the report and tell the callback.
fn enter(
    config: &ConversionConfig,
    index: usize,
    job: &ConversionJob,
    report: &mut JobReport,
    stage: JobStage,
    status: &str,
) {
    report.stage = stage;
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_stage(index, &job.input, stage, status);
    }
}

/// Run one job to a terminal state.
pub(crate) async fn run_job(
    index: usize,
    job: &ConversionJob,
    config: &ConversionConfig,
    converter_available: bool,
    cancel: &CancellationFlag,
) -> JobReport {
    let start = Instant::now();
    let mut report = JobReport::new(&job.input);
    info!("Converting {}", job.input.display());

    let result = run_stages(index, job, config, converter_available, cancel, &mut report).await;
    match result {
        Ok(output) => {
            info!("Wrote {}", output.display());
            let status = output.display().to_string();
            report.outcome = JobOutcome::Succeeded { output };
            enter(config, index, job, &mut report, JobStage::Done, &status);
        }
        Err(e) => {
            let message = match e {
                Pdf2EpubError::Cancelled => "cancelled".to_string(),
                other => other.to_string(),
            };
            warn!(
                "{} failed during {}: {}",
                job.input.display(),
                report.stage,
                message
            );
            report.outcome = JobOutcome::Failed {
                message: message.clone(),
            };
            enter(config, index, job, &mut report, JobStage::Failed, &message);
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    report
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

async fn run_stages(
    index: usize,
    job: &ConversionJob,
    config: &ConversionConfig,
    converter_available: bool,
    cancel: &CancellationFlag,
    report: &mut JobReport,
) -> Result<PathBuf, Pdf2EpubError> {
    if cancel.is_cancelled() {
        return Err(Pdf2EpubError::Cancelled);
    }

    // ── Step 1: Extract ──────────────────────────────────────────────────
    enter(config, index, job, report, JobStage::Extracting, "extracting text");
    validate_input(&job.input)?;
    let extracted = extract_document(&job.input, &config.layout).await;
    report.page_count = extracted.page_count;
    if extracted.degraded {
        let reason = extracted
            .blocks
            .first()
            .map(|b| b.text.clone())
            .unwrap_or_default();
        report.notes.push(format!("extraction degraded: {reason}"));
    }

    let title = non_blank(config.title.as_deref())
        .or_else(|| non_blank(extracted.metadata.title.as_deref()))
        .unwrap_or_else(|| file_stem(&job.input));
    let author = non_blank(config.author.as_deref())
        .or_else(|| non_blank(extracted.metadata.author.as_deref()));

    // ── Step 2: Translate ────────────────────────────────────────────────
    let target = job.translation_target();
    let blocks = match target {
        Some(lang) => {
            enter(
                config,
                index,
                job,
                report,
                JobStage::Translating,
                &format!("translating into {lang}"),
            );
            let translator = build_translator(config).await?;
            let opts = TranslateOptions {
                target: lang,
                source: &config.source_language,
                unit_timeout: Duration::from_secs(config.unit_timeout_secs),
            };
            let on_progress = |done: usize, total: usize| {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_unit_progress(index, done, total);
                }
            };
            let (blocks, summary) = translate_blocks(
                &extracted.blocks,
                translator.as_ref(),
                &opts,
                cancel,
                on_progress,
            )
            .await?;
            if let Some(note) = summary.partial_note() {
                report.notes.push(note);
            }
            report.translation = Some(summary);
            blocks
        }
        None => extracted.blocks,
    };
    report.block_count = blocks.len();

    // ── Step 3: Render ───────────────────────────────────────────────────
    let paths = output_paths(&job.input, job.output_dir.as_deref(), target, job.format);
    enter(
        config,
        index,
        job,
        report,
        JobStage::Rendering,
        &format!("rendering {}", job.format),
    );
    ensure_dir(&paths.dir).await?;

    let text = blocks_to_text(&blocks);
    write_atomic(&paths.working, text.as_bytes()).await?;
    debug!("Working file: {}", paths.working.display());

    let cover = resolve_cover(job, config, extracted.degraded, report).await;
    report.cover_embedded = cover.is_some();

    let rendered = render_output(job, &paths, &blocks, title, author, target, cover).await;
    if !config.keep_working_files {
        remove_working_file(&paths.working).await;
    }
    rendered?;

    // ── Step 4: Round-trip ───────────────────────────────────────────────
    if !config.round_trip {
        return Ok(paths.output);
    }
    if job.format != OutputFormat::Epub {
        report
            .notes
            .push("round-trip skipped: only EPUB output is converted".to_string());
        return Ok(paths.output);
    }

    enter(
        config,
        index,
        job,
        report,
        JobStage::RoundTrip,
        &format!("converting via {}", config.converter_tool),
    );
    let opts = RoundTripOptions {
        tool: &config.converter_tool,
        intermediate_format: &config.intermediate_format,
        timeout: Duration::from_secs(config.converter_timeout_secs),
        keep_unpolished: config.keep_unpolished,
    };
    match round_trip(&paths.output, &opts, converter_available).await {
        RoundTripOutcome::Polished { output } => Ok(output),
        RoundTripOutcome::Skipped { note } | RoundTripOutcome::Failed { note } => {
            report.notes.push(note);
            Ok(paths.output)
        }
    }
}

/// User cover first, then the PDF's own; failures become notes.
async fn resolve_cover(
    job: &ConversionJob,
    config: &ConversionConfig,
    degraded: bool,
    report: &mut JobReport,
) -> Option<CoverImage> {
    if let Some(ref path) = config.cover_image {
        match load_cover_file(path).await {
            Ok(cover) => return Some(cover),
            Err(e) => {
                warn!("{}", e);
                report.notes.push(format!("cover not used: {e}"));
            }
        }
    }
    if config.extract_cover && !degraded {
        return extract_cover(&job.input, config.layout.cover_scan_pages).await;
    }
    None
}

/// Render `blocks` into the job's output format and write it atomically.
async fn render_output(
    job: &ConversionJob,
    paths: &OutputPaths,
    blocks: &[TextBlock],
    title: String,
    author: Option<String>,
    target: Option<&str>,
    cover: Option<CoverImage>,
) -> Result<(), Pdf2EpubError> {
    let bytes = match job.format {
        OutputFormat::Epub => {
            let meta = EpubMetadata {
                title: title.clone(),
                author,
                language: target.unwrap_or("en").to_string(),
                source_name: job
                    .input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                modified: Utc::now(),
            };
            render_epub(blocks, &meta, cover.as_ref()).map_err(|e| {
                Pdf2EpubError::EpubWriteFailed {
                    path: paths.output.clone(),
                    detail: e.to_string(),
                }
            })?
        }
        OutputFormat::Pdf => render_paginated(paths, blocks.to_vec(), title, cover).await?,
    };
    write_atomic(&paths.output, &bytes).await
}

/// Chapters come straight from the blocks; body text is never re-parsed
/// for heading markers.
fn render_epub(
    blocks: &[TextBlock],
    meta: &EpubMetadata,
    cover: Option<&CoverImage>,
) -> Result<Vec<u8>, zip::result::ZipError> {
    let chapters = split_chapters(blocks, &meta.title);
    build_epub(&chapters, meta, cover)
}

/// Lay out and serialise the PDF off the async runtime.
async fn render_paginated(
    paths: &OutputPaths,
    blocks: Vec<TextBlock>,
    title: String,
    cover: Option<CoverImage>,
) -> Result<Vec<u8>, Pdf2EpubError> {
    tokio::task::spawn_blocking(move || {
        let layout = paginate(&blocks, &title, PageSetup::a4());
        render_pdf(&layout, cover.as_ref())
    })
    .await
    .map_err(|e| Pdf2EpubError::PdfWriteFailed {
        path: paths.output.clone(),
        detail: format!("render task failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ConversionProgressCallback;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Stages(Mutex<Vec<JobStage>>);

    impl ConversionProgressCallback for Stages {
        fn on_job_stage(&self, _: usize, _: &Path, stage: JobStage, _: &str) {
            self.0.lock().unwrap().push(stage);
        }
    }

    fn config(dir: &Path) -> ConversionConfig {
        ConversionConfig::builder()
            .output_dir(dir)
            .extract_cover(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_input_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let job = ConversionJob::new(dir.path().join("missing.pdf"));
        let report = convert_file(&job, &config(dir.path()), &CancellationFlag::new()).await;
        assert!(!report.succeeded());
        assert_eq!(report.stage, JobStage::Failed);
        assert!(report.status_line().contains("not found"));
    }

    #[tokio::test]
    async fn non_pdf_input_degrades_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.pdf");
        std::fs::write(&input, b"just some text").unwrap();

        let stages = Arc::new(Stages::default());
        let config = ConversionConfig::builder()
            .output_dir(dir.path())
            .extract_cover(false)
            .progress_callback(stages.clone())
            .build()
            .unwrap();

        let report =
            convert_file(&ConversionJob::new(&input), &config, &CancellationFlag::new()).await;
        assert!(report.succeeded(), "{:?}", report.outcome);
        assert_eq!(report.output(), Some(dir.path().join("notes.epub").as_path()));
        assert!(report.notes.iter().any(|n| n.starts_with("extraction degraded")));
        assert!(!dir.path().join(".notes.work.md").exists());
        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![JobStage::Extracting, JobStage::Rendering, JobStage::Done]
        );
    }

    #[tokio::test]
    async fn keep_working_files_leaves_the_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.pdf");
        std::fs::write(&input, b"nope").unwrap();
        let config = ConversionConfig::builder()
            .output_dir(dir.path())
            .extract_cover(false)
            .keep_working_files(true)
            .build()
            .unwrap();
        let report =
            convert_file(&ConversionJob::new(&input), &config, &CancellationFlag::new()).await;
        assert!(report.succeeded());
        let working = std::fs::read_to_string(dir.path().join(".a.work.md")).unwrap();
        assert!(working.contains("Extraction failed"));
    }

    #[tokio::test]
    async fn cancelled_batch_reports_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let jobs = vec![
            ConversionJob::new(dir.path().join("a.pdf")),
            ConversionJob::new(dir.path().join("b.pdf")),
        ];
        let batch = convert_batch(&jobs, &config(dir.path()), &cancel).await;
        assert_eq!(batch.failed, 2);
        assert!(batch.jobs.iter().all(|j| j.status_line() == "cancelled"));
    }

    #[test]
    fn marker_like_paragraph_stays_body_text() {
        let blocks = vec![
            TextBlock::paragraph("Intro text."),
            TextBlock::paragraph("# 1 rule of the club is silence."),
        ];
        let meta = EpubMetadata {
            title: "Book".to_string(),
            author: None,
            language: "en".to_string(),
            source_name: "book.pdf".to_string(),
            modified: Utc::now(),
        };
        let bytes = render_epub(&blocks, &meta, None).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("OEBPS/text/chapter_002.xhtml").is_err());
        let mut chapter = String::new();
        std::io::Read::read_to_string(
            &mut archive.by_name("OEBPS/text/chapter_001.xhtml").unwrap(),
            &mut chapter,
        )
        .unwrap();
        assert!(chapter.contains("<h1>Book</h1>"));
        assert!(chapter.contains("<p># 1 rule of the club is silence.</p>"));
    }

    #[test]
    fn marker_like_paragraph_is_not_a_pdf_heading() {
        let blocks = vec![TextBlock::paragraph("# 1 rule of the club is silence.")];
        let doc = paginate(&blocks, "Book", PageSetup::a4());
        let lines: Vec<_> = doc.pages.iter().flat_map(|p| p.lines.iter()).collect();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| !l.bold));
        assert!(lines[0].text().starts_with("# 1 rule"));
    }

    struct Shouting;

    #[async_trait::async_trait]
    impl crate::translator::Translator for Shouting {
        fn name(&self) -> &str {
            "shouting"
        }

        async fn translate(
            &self,
            text: &str,
            _: &str,
            _: &str,
        ) -> Result<String, crate::error::TranslateError> {
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn degraded_placeholder_is_still_translated() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.pdf");
        std::fs::write(&input, b"just some text").unwrap();
        let config = ConversionConfig::builder()
            .output_dir(dir.path())
            .extract_cover(false)
            .target_language("fr")
            .translator(Arc::new(Shouting))
            .keep_working_files(true)
            .build()
            .unwrap();

        let report = convert_file(&config.job_for(&input), &config, &CancellationFlag::new()).await;
        assert!(report.succeeded(), "{:?}", report.outcome);
        let summary = report.translation.unwrap();
        assert_eq!((summary.total, summary.translated), (1, 1));
        let working = std::fs::read_to_string(dir.path().join(".notes_fr.work.md")).unwrap();
        assert!(working.contains("[EXTRACTION FAILED"));
    }

    #[tokio::test]
    async fn failed_render_removes_the_working_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.pdf");
        std::fs::write(&input, b"nope").unwrap();
        // A directory in the output's place makes the final rename fail.
        std::fs::create_dir(dir.path().join("a.epub")).unwrap();

        let report =
            convert_file(&ConversionJob::new(&input), &config(dir.path()), &CancellationFlag::new())
                .await;
        assert!(!report.succeeded());
        assert!(report.status_line().contains("Failed to write output file"));
        assert!(!dir.path().join(".a.work.md").exists());
    }

    #[test]
    fn sync_wrapper_runs_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![ConversionJob::new(dir.path().join("missing.pdf"))];
        let batch =
            convert_batch_sync(&jobs, &config(dir.path()), &CancellationFlag::new()).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert!(!batch.all_succeeded());
    }
}
