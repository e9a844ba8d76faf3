//! Progress-callback trait for batch, job and translation-unit events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the batch runs.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: callers can forward
//! events to a channel, a GUI status line, or a terminal progress bar
//! without the library knowing how the host application communicates.
//!
//! # Ordering
//!
//! Jobs run one at a time and stages run in order within a job, so events
//! arrive in program order from a single task. `on_unit_progress` is strictly
//! increasing in `completed` with a constant `total`, ending at
//! `(total, total)`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2epub::{ConversionConfig, ConversionProgressCallback, JobStage};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ConversionProgressCallback for Printer {
//!     fn on_job_stage(&self, index: usize, input: &Path, stage: JobStage, status: &str) {
//!         eprintln!("[{}] {}: {} ({})", index + 1, input.display(), stage, status);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchReport, JobReport, JobStage};
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as the batch progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first job starts.
    ///
    /// # Arguments
    /// * `total_jobs` — number of jobs in the batch
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called on every stage transition of a job.
    ///
    /// # Arguments
    /// * `job_index` — 0-indexed position in the batch
    /// * `input`     — the job's input path
    /// * `stage`     — the stage just entered
    /// * `status`    — human-readable status string
    fn on_job_stage(&self, job_index: usize, input: &Path, stage: JobStage, status: &str) {
        let _ = (job_index, input, stage, status);
    }

    /// Called after every translation unit, including blank pass-throughs.
    ///
    /// # Arguments
    /// * `job_index` — 0-indexed position in the batch
    /// * `completed` — units finished so far (1-based)
    /// * `total`     — units in this job
    fn on_unit_progress(&self, job_index: usize, completed: usize, total: usize) {
        let _ = (job_index, completed, total);
    }

    /// Called when a job reaches `Done` or `Failed`.
    fn on_job_complete(&self, job_index: usize, report: &JobReport) {
        let _ = (job_index, report);
    }

    /// Called once after every job has been attempted (or cancelled).
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<JobStage>>,
        units: Mutex<Vec<(usize, usize)>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_job_stage(&self, _: usize, _: &Path, stage: JobStage, _: &str) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_unit_progress(&self, _: usize, completed: usize, total: usize) {
            self.units.lock().unwrap().push((completed, total));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_job_stage(0, Path::new("a.pdf"), JobStage::Extracting, "extracting");
        cb.on_unit_progress(0, 1, 3);
        cb.on_job_complete(0, &JobReport::cancelled(Path::new("a.pdf")));
        cb.on_batch_complete(&BatchReport::default());
    }

    #[test]
    fn recorder_receives_events() {
        let rec = Recorder::default();
        rec.on_job_stage(0, Path::new("a.pdf"), JobStage::Extracting, "");
        rec.on_job_stage(0, Path::new("a.pdf"), JobStage::Rendering, "");
        rec.on_unit_progress(0, 1, 2);
        rec.on_unit_progress(0, 2, 2);

        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![JobStage::Extracting, JobStage::Rendering]
        );
        assert_eq!(*rec.units.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_unit_progress(3, 1, 10);
    }
}
