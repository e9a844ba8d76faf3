//! CLI binary for edgequake-pdf2epub.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, runs the batch and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2epub::{
    convert_batch, BatchReport, CancellationFlag, ConversionConfig, ConversionProgressCallback,
    JobReport, JobStage, OutputFormat, ProgressCallback, TranslatorKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the batch's files, with the
/// current file's stage (and unit counter while translating) as the message.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Name of the file being converted.
    current: Mutex<String>,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:32.green/238}] {pos:>2}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(String::new()),
            failures: AtomicUsize::new(0),
        })
    }

    fn current(&self) -> String {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_jobs} file(s)…"))
        ));
    }

    fn on_job_stage(&self, _job_index: usize, input: &Path, stage: JobStage, _status: &str) {
        let name = file_name(input);
        if let Ok(mut current) = self.current.lock() {
            *current = name.clone();
        }
        self.bar.set_message(format!("{name}: {stage}"));
    }

    fn on_unit_progress(&self, _job_index: usize, completed: usize, total: usize) {
        self.bar.set_message(format!(
            "{}: translating {completed}/{total}",
            self.current()
        ));
    }

    fn on_job_complete(&self, _job_index: usize, report: &JobReport) {
        let name = file_name(&report.input);
        let secs = report.duration_ms as f64 / 1000.0;
        if report.succeeded() {
            self.bar.println(format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                name,
                report.status_line(),
                dim(&format!("{secs:.1}s")),
            ));
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
            let msg = report.status_line();
            // Keep the log tidy; the JSON report has the full message.
            let msg = match msg.char_indices().nth(100) {
                Some((cut, _)) => format!("{}…", &msg[..cut]),
                None => msg,
            };
            self.bar
                .println(format!("  {} {}  {}", red("✗"), name, red(&msg)));
        }
        for note in &report.notes {
            self.bar.println(format!("      {}", dim(note)));
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&report.succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if report.succeeded == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&report.succeeded.to_string()),
                report.jobs.len(),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert to EPUB next to the input
  pdf2epub novel.pdf

  # Translate into French, write into ./out
  pdf2epub -l fr -o out/ novel.pdf

  # Several files, paginated PDF output
  pdf2epub -f pdf a.pdf b.pdf c.pdf

  # Translate with an LLM only
  pdf2epub -l de --translator llm --provider openai --model gpt-4.1-mini novel.pdf

  # Polish through calibre's ebook-convert for Kindle
  pdf2epub --kindle novel.pdf

  # Machine-readable report
  pdf2epub --json novel.pdf > report.json

TRANSLATORS:
  google   Public Google Translate web endpoint, no key (default, first)
  libre    LibreTranslate instance (--libre-url, --libre-api-key) (default, second)
  llm      Any edgequake-llm provider; needs an API key

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (llm translator)
  ANTHROPIC_API_KEY       Anthropic API key (llm translator)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  LIBRETRANSLATE_URL      LibreTranslate base URL
  LIBRETRANSLATE_API_KEY  LibreTranslate API key
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

NOTES:
  Only PDFs with selectable text are supported; scanned pages need OCR first.
  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Convert text PDFs to EPUB (or paginated PDF), optionally translating them.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2epub",
    version,
    about = "Convert text PDFs to EPUB books, optionally translated",
    long_about = "Rebuild headings and paragraphs from a PDF's text layout and write a \
reflowable EPUB 3 book (or a clean paginated PDF). Paragraphs can be translated through \
Google Translate, LibreTranslate or any LLM provider supported by edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to convert, processed in order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for outputs (default: next to each input).
    #[arg(short, long, env = "PDF2EPUB_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Translate into this language (ISO 639-1, e.g. fr, de, ja).
    #[arg(short, long, env = "PDF2EPUB_LANG")]
    lang: Option<String>,

    /// Source language (ISO 639-1) or "auto".
    #[arg(long, env = "PDF2EPUB_SOURCE_LANG", default_value = "auto")]
    source_lang: String,

    /// Do not translate even when --lang is set.
    #[arg(long)]
    no_translate: bool,

    /// Translators to try, in order: google, libre, llm.
    #[arg(
        long,
        env = "PDF2EPUB_TRANSLATOR",
        value_delimiter = ',',
        default_value = "google,libre"
    )]
    translator: Vec<TranslatorKind>,

    /// LLM provider for the llm translator: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID for the llm translator.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Path to a text file with a custom LLM system prompt ({target}/{source}).
    #[arg(long, env = "PDF2EPUB_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LibreTranslate base URL.
    #[arg(long, env = "LIBRETRANSLATE_URL", default_value = "https://libretranslate.com")]
    libre_url: String,

    /// LibreTranslate API key.
    #[arg(long, env = "LIBRETRANSLATE_API_KEY")]
    libre_api_key: Option<String>,

    /// Deadline per translation unit, in seconds.
    #[arg(long, env = "PDF2EPUB_UNIT_TIMEOUT", default_value_t = 60)]
    unit_timeout: u64,

    /// Retries per unit on a transient LLM failure.
    #[arg(long, env = "PDF2EPUB_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Output format.
    #[arg(short, long, env = "PDF2EPUB_FORMAT", value_enum, default_value = "epub")]
    format: FormatArg,

    /// Cover image file (PNG or JPEG) instead of the PDF's first image.
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Do not look for a cover image in the PDF.
    #[arg(long)]
    no_cover: bool,

    /// Book title (default: PDF metadata, else the file name).
    #[arg(long)]
    title: Option<String>,

    /// Book author (default: PDF metadata).
    #[arg(long)]
    author: Option<String>,

    /// Round-trip the EPUB through an external converter for Kindle.
    #[arg(long)]
    kindle: bool,

    /// Converter invoked as `<tool> <input> <output>`.
    #[arg(long, env = "PDF2EPUB_CONVERTER", default_value = "ebook-convert")]
    converter: String,

    /// Intermediate format for the round-trip.
    #[arg(long, default_value = "azw3")]
    intermediate_format: String,

    /// Deadline per converter run, in seconds.
    #[arg(long, default_value_t = 300)]
    converter_timeout: u64,

    /// Keep the EPUB written before the round-trip.
    #[arg(long)]
    keep_unpolished: bool,

    /// Keep the intermediate text file next to the output.
    #[arg(long)]
    keep_working_files: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "PDF2EPUB_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2EPUB_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2EPUB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2EPUB_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FormatArg {
    Epub,
    Pdf,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Epub => OutputFormat::Epub,
            FormatArg::Pdf => OutputFormat::Pdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // With `bundled` the library was embedded at compile time and only needs
    // extracting. Otherwise the first run downloads it (~30 MB) into the
    // pdfium-auto cache; later runs only check the path.
    #[cfg(feature = "bundled")]
    {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let jobs: Vec<_> = cli.inputs.iter().map(|p| config.job_for(p)).collect();

    // ── Ctrl-C stops after the current file / unit ───────────────────────
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", cyan("Stopping after the current step…"));
                cancel.cancel();
            }
        });
    }

    // ── Run the batch ────────────────────────────────────────────────────
    let batch = convert_batch(&jobs, &config, &cancel).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&batch).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        // The progress callback already printed per-file lines.
        for job in &batch.jobs {
            let mark = if job.succeeded() { green("✓") } else { red("✗") };
            eprintln!("{mark} {}: {}", job.input.display(), job.status_line());
            for note in &job.notes {
                eprintln!("    {}", dim(note));
            }
        }
        eprintln!("{}", batch.status_line());
    }

    if !batch.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .format(cli.format.clone().into())
        .source_language(cli.source_lang.as_str())
        .translate(!cli.no_translate)
        .translators(cli.translator.clone())
        .libre_url(cli.libre_url.as_str())
        .unit_timeout_secs(cli.unit_timeout)
        .max_retries(cli.max_retries)
        .extract_cover(!cli.no_cover)
        .round_trip(cli.kindle)
        .converter_tool(cli.converter.as_str())
        .intermediate_format(cli.intermediate_format.as_str())
        .converter_timeout_secs(cli.converter_timeout)
        .keep_unpolished(cli.keep_unpolished)
        .keep_working_files(cli.keep_working_files);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref lang) = cli.lang {
        builder = builder.target_language(lang.as_str());
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.as_str());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref key) = cli.libre_api_key {
        builder = builder.libre_api_key(key.as_str());
    }
    if let Some(ref cover) = cli.cover {
        builder = builder.cover_image(cover);
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.as_str());
    }
    if let Some(ref author) = cli.author {
        builder = builder.author(author.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
