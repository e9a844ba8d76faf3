//! Streaming batch API: emit job reports as jobs finish.
//!
//! ## Why stream?
//!
//! A batch of large books takes a long time. A stream lets callers show
//! each finished file immediately (or stop early by dropping the stream)
//! instead of waiting for the whole [`crate::output::BatchReport`].
//!
//! Jobs still run one at a time, so reports arrive in submission order.

use crate::cancel::CancellationFlag;
use crate::config::ConversionConfig;
use crate::convert::{converter_available, run_job};
use crate::output::{ConversionJob, JobReport};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of job reports.
pub type JobStream = Pin<Box<dyn Stream<Item = JobReport> + Send>>;

/// Convert `jobs` in order, yielding one [`JobReport`] per job.
///
/// Jobs not yet started when `cancel` is raised are reported as failed
/// with `"cancelled"`. `on_job_complete` fires for each report; the batch
/// callbacks do not, since there is no batch report.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2epub::{convert_stream, CancellationFlag, ConversionConfig, ConversionJob};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ConversionConfig::default();
/// let jobs = vec![ConversionJob::new("a.pdf"), ConversionJob::new("b.pdf")];
/// let mut reports = convert_stream(jobs, config, CancellationFlag::new());
/// while let Some(report) = reports.next().await {
///     println!("{}: {}", report.input.display(), report.status_line());
/// }
/// # }
/// ```
pub fn convert_stream(
    jobs: Vec<ConversionJob>,
    config: ConversionConfig,
    cancel: CancellationFlag,
) -> JobStream {
    info!("Starting streaming batch of {} job(s)", jobs.len());
    let available = converter_available(&jobs, &config);

    let s = stream::iter(jobs.into_iter().enumerate()).then(move |(index, job)| {
        let cfg = config.clone();
        let cancel = cancel.clone();
        async move {
            let report = if cancel.is_cancelled() {
                JobReport::cancelled(&job.input)
            } else {
                run_job(index, &job, &cfg, available, &cancel).await
            };
            if let Some(ref cb) = cfg.progress_callback {
                cb.on_job_complete(index, &report);
            }
            report
        }
    });

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_arrive_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        std::fs::write(&good, b"not really a pdf").unwrap();
        let jobs = vec![
            ConversionJob::new(dir.path().join("missing.pdf")),
            ConversionJob::new(&good),
        ];
        let config = ConversionConfig::builder()
            .output_dir(dir.path())
            .extract_cover(false)
            .build()
            .unwrap();

        let reports: Vec<JobReport> = convert_stream(jobs, config, CancellationFlag::new())
            .collect()
            .await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].succeeded());
        assert!(reports[1].succeeded());
        assert_eq!(reports[1].input, good);
    }

    #[tokio::test]
    async fn cancelled_stream_still_yields_every_job() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let jobs = vec![ConversionJob::new("a.pdf"), ConversionJob::new("b.pdf")];
        let reports: Vec<JobReport> = convert_stream(jobs, ConversionConfig::default(), cancel)
            .collect()
            .await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status_line() == "cancelled"));
    }
}
