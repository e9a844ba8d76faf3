//! Error types for the edgequake-pdf2epub library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2EpubError`] — **Fatal for one job**: the file cannot be read, the
//!   output cannot be written, the run was cancelled. A batch records it in
//!   the job's [`crate::output::JobReport`] and moves on to the next file.
//!
//! * [`TranslateError`] — **Non-fatal**: a single translation unit failed
//!   (network blip, rate limit, unsupported language pair). The unit keeps
//!   its source text and the job carries on.
//!
//! Extraction and cover failures have no error type at all: the extractor
//! degrades to a placeholder block and the cover step to `None`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a single conversion job.
#[derive(Debug, Error)]
pub enum Pdf2EpubError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input exists but is a directory or other non-regular file.
    #[error("Input '{path}' is not a regular file")]
    NotAFile { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The EPUB container could not be assembled.
    #[error("Failed to build EPUB '{path}': {detail}")]
    EpubWriteFailed { path: PathBuf, detail: String },

    /// The paginated PDF could not be assembled.
    #[error("Failed to build PDF '{path}': {detail}")]
    PdfWriteFailed { path: PathBuf, detail: String },

    // ── External converter errors ─────────────────────────────────────────
    /// The converter exited non-zero or produced no output file.
    #[error("'{tool}' failed converting '{input}': {detail}")]
    ConverterFailed {
        tool: String,
        input: PathBuf,
        detail: String,
    },

    /// The converter did not finish in time and was killed.
    #[error("'{tool}' timed out after {secs}s")]
    ConverterTimeout { tool: String, secs: u64 },

    // ── Translation setup ─────────────────────────────────────────────────
    /// A translation provider could not be constructed (missing key etc.).
    #[error("Translator '{provider}' is not configured.\n{hint}")]
    TranslatorNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller raised the cancellation flag.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single translation unit.
///
/// Returned by [`crate::translator::Translator::translate`]. The unit
/// translator maps every variant to "keep the original text".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// Transport-level failure (DNS, TLS, connection reset, bad status).
    #[error("{provider}: network error: {detail}")]
    Network { provider: String, detail: String },

    /// The service answered HTTP 429.
    #[error("{provider}: rate limit exceeded")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// No answer within the per-unit deadline.
    #[error("{provider}: timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// The service rejected the language pair.
    #[error("{provider}: unsupported language pair {source_lang} → {target_lang}")]
    UnsupportedLanguage {
        provider: String,
        source_lang: String,
        target_lang: String,
    },

    /// The service answered but the translation was empty or unparsable.
    #[error("{provider}: empty or malformed response")]
    EmptyResponse { provider: String },

    /// Any other provider-reported failure.
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    /// A fallback chain was built without any providers.
    #[error("no translation providers configured")]
    NoProviders,
}

impl TranslateError {
    /// Whether another attempt against the same provider might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranslateError::Network { .. }
                | TranslateError::RateLimited { .. }
                | TranslateError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_failed_display() {
        let e = Pdf2EpubError::ConverterFailed {
            tool: "ebook-convert".into(),
            input: PathBuf::from("/tmp/book.epub"),
            detail: "exit code 2".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("ebook-convert"), "got: {msg}");
        assert!(msg.contains("exit code 2"), "got: {msg}");
    }

    #[test]
    fn unsupported_language_display() {
        let e = TranslateError::UnsupportedLanguage {
            provider: "libretranslate".into(),
            source_lang: "auto".into(),
            target_lang: "tlh".into(),
        };
        assert!(e.to_string().contains("tlh"));
        assert!(!e.is_transient());
    }

    #[test]
    fn rate_limit_is_transient() {
        let e = TranslateError::RateLimited {
            provider: "google".into(),
            retry_after_secs: Some(30),
        };
        assert!(e.is_transient());
        assert!(e.to_string().contains("google"));
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(Pdf2EpubError::Cancelled.to_string(), "Conversion cancelled");
    }
}
