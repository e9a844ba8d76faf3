//! Optional EPUB round-trip through an external converter.
//!
//! `<stem>.epub → <stem>.<intermediate> → <stem>_kindle.epub`, each leg run
//! as `<tool> <input> <output>`. A leg succeeds when the tool exits 0 **and**
//! the output file exists.
//!
//! The round-trip never fails a job: when the tool is missing or a leg fails
//! the un-polished EPUB stays in place and the outcome carries a note.

use crate::error::Pdf2EpubError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Whether `tool` resolves to an executable (bare name on `PATH`, or a path).
pub fn probe_converter(tool: &str) -> bool {
    !tool.trim().is_empty() && which::which(tool).is_ok()
}

#[derive(Debug, Clone)]
pub struct RoundTripOptions<'a> {
    pub tool: &'a str,
    /// Extension of the intermediate file, without the dot.
    pub intermediate_format: &'a str,
    pub timeout: Duration,
    pub keep_unpolished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundTripOutcome {
    /// The polished EPUB is the job's artifact now.
    Polished { output: PathBuf },
    /// The tool was not available; nothing ran.
    Skipped { note: String },
    /// A leg failed; the input EPUB is still the artifact.
    Failed { note: String },
}

/// `<dir>/<stem>.<intermediate>` and `<dir>/<stem>_kindle.epub` for `epub`.
pub fn round_trip_paths(epub: &Path, intermediate_format: &str) -> (PathBuf, PathBuf) {
    let stem = epub
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dir = epub.parent().unwrap_or_else(|| Path::new("."));
    (
        dir.join(format!("{stem}.{intermediate_format}")),
        dir.join(format!("{stem}_kindle.epub")),
    )
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

/// Run `<tool> <input> <output>` once, killing it after `timeout`.
pub async fn run_converter(
    tool: &str,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<(), Pdf2EpubError> {
    let failed = |detail: String| Pdf2EpubError::ConverterFailed {
        tool: tool.to_string(),
        input: input.to_path_buf(),
        detail,
    };

    debug!("Running {} {} {}", tool, input.display(), output.display());
    let child = Command::new(tool)
        .arg(input)
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let result = match tokio::time::timeout(timeout, child).await {
        Ok(result) => result.map_err(|e| failed(format!("could not start: {e}")))?,
        Err(_) => {
            return Err(Pdf2EpubError::ConverterTimeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    if !result.status.success() {
        let tail = stderr_tail(&result.stderr);
        let code = result
            .status
            .code()
            .map(|c| format!("exit code {c}"))
            .unwrap_or_else(|| "terminated by signal".to_string());
        return Err(failed(if tail.is_empty() {
            code
        } else {
            format!("{code}: {tail}")
        }));
    }
    if !output.exists() {
        return Err(failed(format!("no output produced at '{}'", output.display())));
    }
    Ok(())
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove '{}': {}", path.display(), e);
        }
    }
}

/// Polish `epub` through the converter. `available` comes from
/// [`probe_converter`], probed once per batch.
pub async fn round_trip(
    epub: &Path,
    opts: &RoundTripOptions<'_>,
    available: bool,
) -> RoundTripOutcome {
    if !available {
        let note = format!("round-trip skipped: '{}' not found", opts.tool);
        info!("{}", note);
        return RoundTripOutcome::Skipped { note };
    }

    let (intermediate, polished) = round_trip_paths(epub, opts.intermediate_format);
    info!(
        "Round-trip via {}: {} → {}",
        opts.tool,
        epub.display(),
        polished.display()
    );

    let legs = [
        (epub, intermediate.as_path()),
        (intermediate.as_path(), polished.as_path()),
    ];
    for (input, output) in legs {
        if let Err(e) = run_converter(opts.tool, input, output, opts.timeout).await {
            remove_quietly(&intermediate);
            remove_quietly(&polished);
            let note = format!("round-trip failed, kept un-polished EPUB: {e}");
            warn!("{}", note);
            return RoundTripOutcome::Failed { note };
        }
    }

    remove_quietly(&intermediate);
    if !opts.keep_unpolished {
        remove_quietly(epub);
    }
    RoundTripOutcome::Polished { output: polished }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(tool: &str) -> RoundTripOptions<'_> {
        RoundTripOptions {
            tool,
            intermediate_format: "azw3",
            timeout: Duration::from_secs(10),
            keep_unpolished: false,
        }
    }

    #[test]
    fn paths_follow_the_stem() {
        let (mid, out) = round_trip_paths(Path::new("/out/book_fr.epub"), "mobi");
        assert_eq!(mid, PathBuf::from("/out/book_fr.mobi"));
        assert_eq!(out, PathBuf::from("/out/book_fr_kindle.epub"));
    }

    #[test]
    fn missing_tool_is_not_available() {
        assert!(!probe_converter("definitely-not-a-converter-xyz"));
        assert!(!probe_converter("  "));
    }

    #[tokio::test]
    async fn unavailable_tool_skips() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("b.epub");
        std::fs::write(&epub, b"epub").unwrap();
        let outcome = round_trip(&epub, &opts("nope-xyz"), false).await;
        assert!(
            matches!(outcome, RoundTripOutcome::Skipped { ref note } if note.contains("nope-xyz"))
        );
        assert!(epub.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copying_tool_polishes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("b.epub");
        std::fs::write(&epub, b"epub").unwrap();

        let outcome = round_trip(&epub, &opts("cp"), probe_converter("cp")).await;
        let polished = dir.path().join("b_kindle.epub");
        assert_eq!(
            outcome,
            RoundTripOutcome::Polished {
                output: polished.clone()
            }
        );
        assert_eq!(std::fs::read(&polished).unwrap(), b"epub");
        assert!(!dir.path().join("b.azw3").exists());
        assert!(!epub.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn keep_unpolished_leaves_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("b.epub");
        std::fs::write(&epub, b"epub").unwrap();

        let mut o = opts("cp");
        o.keep_unpolished = true;
        let outcome = round_trip(&epub, &o, true).await;
        assert!(matches!(outcome, RoundTripOutcome::Polished { .. }));
        assert!(epub.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_keeps_the_epub() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("b.epub");
        std::fs::write(&epub, b"epub").unwrap();

        let outcome = round_trip(&epub, &opts("false"), true).await;
        match outcome {
            RoundTripOutcome::Failed { note } => assert!(note.contains("exit code 1"), "{note}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(epub.exists());
        assert!(!dir.path().join("b_kindle.epub").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_zero_without_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("b.epub");
        std::fs::write(&input, b"epub").unwrap();
        let output = dir.path().join("b.azw3");

        let err = run_converter("true", &input, &output, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no output produced"), "{err}");
    }
}
