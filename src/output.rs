//! Jobs and their reports.
//!
//! A [`ConversionJob`] describes one input file; [`crate::convert::convert_file`]
//! turns it into a [`JobReport`]. A batch is a list of jobs in, a
//! [`BatchReport`] out. Reports are plain data (`Serialize`) so the CLI can
//! print them as JSON.

use crate::config::OutputFormat;
use crate::pipeline::translate::TranslationSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One input file queued for conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub input: PathBuf,
    /// `None` means no translation.
    pub target_language: Option<String>,
    pub format: OutputFormat,
    /// `None` means "next to the input".
    pub output_dir: Option<PathBuf>,
    pub translate: bool,
}

impl ConversionJob {
    /// A job with no translation, EPUB output, written next to the input.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            target_language: None,
            format: OutputFormat::default(),
            output_dir: None,
            translate: false,
        }
    }

    /// Set the target language and enable translation.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        let lang = lang.into();
        let lang = lang.trim();
        if lang.is_empty() {
            self.target_language = None;
            self.translate = false;
        } else {
            self.target_language = Some(lang.to_string());
            self.translate = true;
        }
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// The language to translate into, if this job translates at all.
    pub fn translation_target(&self) -> Option<&str> {
        if !self.translate {
            return None;
        }
        self.target_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Where a job is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Pending,
    Extracting,
    Translating,
    Rendering,
    RoundTrip,
    Done,
    Failed,
}

impl JobStage {
    pub fn label(self) -> &'static str {
        match self {
            JobStage::Pending => "pending",
            JobStage::Extracting => "extracting text",
            JobStage::Translating => "translating",
            JobStage::Rendering => "rendering",
            JobStage::RoundTrip => "converting",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { output: PathBuf },
    Failed { message: String },
}

/// Everything known about a finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub input: PathBuf,
    pub outcome: JobOutcome,
    /// Last stage entered before the job ended.
    pub stage: JobStage,
    pub block_count: usize,
    pub page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationSummary>,
    pub cover_embedded: bool,
    /// Non-fatal observations (degraded extraction, skipped round-trip, …).
    pub notes: Vec<String>,
    pub duration_ms: u64,
}

impl JobReport {
    pub(crate) fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            outcome: JobOutcome::Failed {
                message: "not started".to_string(),
            },
            stage: JobStage::Pending,
            block_count: 0,
            page_count: 0,
            translation: None,
            cover_embedded: false,
            notes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// A job that never ran because the batch was cancelled first.
    pub fn cancelled(input: &Path) -> Self {
        let mut report = Self::new(input);
        report.stage = JobStage::Failed;
        report.outcome = JobOutcome::Failed {
            message: "cancelled".to_string(),
        };
        report
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }

    pub fn output(&self) -> Option<&Path> {
        match &self.outcome {
            JobOutcome::Succeeded { output } => Some(output),
            JobOutcome::Failed { .. } => None,
        }
    }

    /// One-line human summary: the output path or the error.
    pub fn status_line(&self) -> String {
        match &self.outcome {
            JobOutcome::Succeeded { output } => output.display().to_string(),
            JobOutcome::Failed { message } => message.clone(),
        }
    }
}

/// Aggregate result of a batch, jobs in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn push(&mut self, report: JobReport) {
        if report.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.jobs.push(report);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// A single-job batch reports that job's output path or error text;
    /// larger batches report `"<n> succeeded, <m> failed"`.
    pub fn status_line(&self) -> String {
        match self.jobs.as_slice() {
            [only] => only.status_line(),
            _ => format!("{} succeeded, {} failed", self.succeeded, self.failed),
        }
    }
}

impl FromIterator<JobReport> for BatchReport {
    fn from_iter<I: IntoIterator<Item = JobReport>>(iter: I) -> Self {
        let mut batch = BatchReport::default();
        for report in iter {
            batch.push(report);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(path: &str) -> JobReport {
        let mut r = JobReport::new(Path::new("in.pdf"));
        r.outcome = JobOutcome::Succeeded {
            output: PathBuf::from(path),
        };
        r.stage = JobStage::Done;
        r
    }

    #[test]
    fn single_job_status_is_path_or_error() {
        let batch: BatchReport = vec![ok("/out/book.epub")].into_iter().collect();
        assert_eq!(batch.status_line(), "/out/book.epub");

        let batch: BatchReport = vec![JobReport::cancelled(Path::new("a.pdf"))]
            .into_iter()
            .collect();
        assert_eq!(batch.status_line(), "cancelled");
    }

    #[test]
    fn multi_job_status_counts() {
        let batch: BatchReport = vec![
            ok("a.epub"),
            JobReport::cancelled(Path::new("b.pdf")),
            ok("c.epub"),
        ]
        .into_iter()
        .collect();
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.status_line(), "2 succeeded, 1 failed");
        assert!(!batch.all_succeeded());
    }

    #[test]
    fn empty_language_disables_translation() {
        let job = ConversionJob::new("a.pdf").with_language("  ");
        assert!(!job.translate);
        assert_eq!(job.translation_target(), None);

        let job = ConversionJob::new("a.pdf").with_language("fr");
        assert_eq!(job.translation_target(), Some("fr"));
    }

    #[test]
    fn report_serialises_outcome_tag() {
        let json = serde_json::to_string(&ok("x.epub")).unwrap();
        assert!(json.contains(r#""status":"succeeded""#), "got: {json}");
        assert!(!json.contains("translation"));
    }
}
