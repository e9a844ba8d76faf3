//! # edgequake-pdf2epub
//!
//! Turn text PDFs into reflowable EPUB books (or clean paginated PDFs),
//! optionally translating them paragraph by paragraph on the way.
//!
//! ## Why this crate?
//!
//! A PDF is a page description, not a document: it knows where each glyph
//! sits but not what a paragraph or a chapter is. This crate reads the glyph
//! positions through pdfium, rebuilds lines, headings and paragraphs from
//! font sizes and vertical gaps, and writes them out as a proper e-book with
//! chapters and a table of contents.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    words + font sizes via pdfium (spawn_blocking)
//!  ├─ 2. Layout     lines → headings / paragraphs (pure, fail-soft)
//!  ├─ 3. Translate  one unit per block; failed units keep their text
//!  ├─ 4. Render     EPUB 3 (zip) or paginated PDF (printpdf)
//!  └─ 5. Polish     optional round-trip through an external converter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2epub::{convert_batch, CancellationFlag, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConversionConfig::builder()
//!         .target_language("fr")
//!         .build()
//!         .unwrap();
//!     let jobs = vec![config.job_for("novel.pdf")];
//!     let batch = convert_batch(&jobs, &config, &CancellationFlag::new()).await;
//!     for job in &batch.jobs {
//!         println!("{}: {}", job.input.display(), job.status_line());
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `pdf2epub` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `bundled` | off     | Embeds the pdfium library in the binary |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2epub = { version = "0.1", default-features = false }
//! ```
//!
//! ## Translators
//!
//! | Backend | Key needed | Notes |
//! |---------|-----------|-------|
//! | `google` | no  | Public web endpoint; default first choice |
//! | `libre`  | optional | Any LibreTranslate instance |
//! | `llm`    | yes | Any edgequake-llm provider (OpenAI, Anthropic, Ollama, …) |
//!
//! Backends are tried in the configured order for every unit.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod translator;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationFlag;
pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{convert_batch, convert_batch_sync, convert_file};
pub use error::{Pdf2EpubError, TranslateError};
pub use model::{BlockKind, HeadingLevel, TextBlock};
pub use output::{BatchReport, ConversionJob, JobOutcome, JobReport, JobStage};
pub use pipeline::layout::LayoutOptions;
pub use pipeline::translate::TranslationSummary;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, JobStream};
pub use translator::{FallbackTranslator, Translator, TranslatorKind};
