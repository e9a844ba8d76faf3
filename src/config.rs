//! Configuration types for PDF-to-EPUB conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The config is created once by the
//! caller and passed explicitly to every stage; no stage reads settings from
//! anywhere else (the LLM provider resolution, which consults the usual
//! provider env vars, is the one exception).
//!
//! # Design choice: builder over constructor
//! A thirty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::Pdf2EpubError;
use crate::output::ConversionJob;
use crate::pipeline::layout::LayoutOptions;
use crate::progress::ProgressCallback;
use crate::translator::{Translator, TranslatorKind};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a batch of PDF conversions.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2epub::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .target_language("fr")
///     .format(OutputFormat::Epub)
///     .round_trip(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Output container. Default: [`OutputFormat::Epub`].
    pub format: OutputFormat,

    /// Directory for outputs. Default: `None` (next to each input).
    pub output_dir: Option<PathBuf>,

    // ── Translation ──────────────────────────────────────────────────────
    /// Language to translate into (ISO 639-1). Default: `None` (no translation).
    pub target_language: Option<String>,

    /// Source language hint. Default: `"auto"`.
    pub source_language: String,

    /// Master switch; `false` disables translation even with a target
    /// language set. Default: true.
    pub translate: bool,

    /// Translation backends, tried in order. Default: `[Google, Libre]`.
    pub translators: Vec<TranslatorKind>,

    /// Pre-constructed translator. Takes precedence over `translators`.
    pub translator: Option<Arc<dyn Translator>>,

    /// Pre-constructed LLM provider for [`TranslatorKind::Llm`].
    /// Takes precedence over `provider_name`.
    pub llm_provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `llm_provider`, the provider is auto-detected
    /// from the environment.
    pub provider_name: Option<String>,

    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Custom LLM system prompt with `{target}` / `{source}` placeholders.
    /// If None, uses [`crate::prompts::DEFAULT_TRANSLATION_PROMPT`].
    pub system_prompt: Option<String>,

    /// LLM sampling temperature. Default: 0.1.
    ///
    /// Translation wants faithfulness, not creativity.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per unit. Default: 2048.
    pub max_tokens: usize,

    /// LibreTranslate base URL. Default: `https://libretranslate.com`.
    pub libre_url: String,

    /// LibreTranslate API key, if the instance requires one.
    pub libre_api_key: Option<String>,

    /// Maximum retry attempts on a transient LLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Deadline for one translation unit, across all providers. Default: 60.
    ///
    /// A unit that misses it keeps its source text.
    pub unit_timeout_secs: u64,

    // ── Rendering ────────────────────────────────────────────────────────
    /// Look for a cover image in the first pages of the PDF. Default: true.
    pub extract_cover: bool,

    /// User-supplied cover image. Takes precedence over the extracted one.
    pub cover_image: Option<PathBuf>,

    /// Title override. Default: PDF metadata title, else the file stem.
    pub title: Option<String>,

    /// Author override. Default: PDF metadata author.
    pub author: Option<String>,

    // ── Round-trip ───────────────────────────────────────────────────────
    /// Pass the EPUB through an external converter and back. Default: false.
    pub round_trip: bool,

    /// Converter executable, invoked as `<tool> <input> <output>`.
    /// Default: `ebook-convert`.
    pub converter_tool: String,

    /// Intermediate format extension for the round-trip. Default: `azw3`.
    pub intermediate_format: String,

    /// Per-invocation converter deadline. Default: 300.
    pub converter_timeout_secs: u64,

    /// Keep the pre-round-trip EPUB next to the polished one. Default: false.
    pub keep_unpolished: bool,

    /// Keep the flattened-text working file after rendering. Default: false.
    pub keep_working_files: bool,

    /// Layout reconstruction tunables.
    pub layout: LayoutOptions,

    /// Optional progress callback for batch/job/unit events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            output_dir: None,
            target_language: None,
            source_language: "auto".to_string(),
            translate: true,
            translators: vec![TranslatorKind::Google, TranslatorKind::Libre],
            translator: None,
            llm_provider: None,
            provider_name: None,
            model: None,
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 2048,
            libre_url: "https://libretranslate.com".to_string(),
            libre_api_key: None,
            max_retries: 3,
            retry_backoff_ms: 500,
            unit_timeout_secs: 60,
            extract_cover: true,
            cover_image: None,
            title: None,
            author: None,
            round_trip: false,
            converter_tool: "ebook-convert".to_string(),
            intermediate_format: "azw3".to_string(),
            converter_timeout_secs: 300,
            keep_unpolished: false,
            keep_working_files: false,
            layout: LayoutOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("format", &self.format)
            .field("output_dir", &self.output_dir)
            .field("target_language", &self.target_language)
            .field("source_language", &self.source_language)
            .field("translate", &self.translate)
            .field("translators", &self.translators)
            .field("translator", &self.translator.as_ref().map(|t| t.name().to_string()))
            .field("llm_provider", &self.llm_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("libre_url", &self.libre_url)
            .field("libre_api_key", &self.libre_api_key.as_ref().map(|_| "<redacted>"))
            .field("unit_timeout_secs", &self.unit_timeout_secs)
            .field("extract_cover", &self.extract_cover)
            .field("cover_image", &self.cover_image)
            .field("round_trip", &self.round_trip)
            .field("converter_tool", &self.converter_tool)
            .field("intermediate_format", &self.intermediate_format)
            .field("layout", &self.layout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// A job for `input` carrying this config's language, format and
    /// output directory.
    pub fn job_for(&self, input: impl AsRef<Path>) -> ConversionJob {
        let mut job = ConversionJob::new(input.as_ref()).with_format(self.format);
        if let Some(ref lang) = self.target_language {
            job = job.with_language(lang.as_str());
        }
        job.translate = job.translate && self.translate;
        job.output_dir = self.output_dir.clone();
        job
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = Some(lang.into());
        self
    }

    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.config.source_language = lang.into();
        self
    }

    pub fn translate(mut self, v: bool) -> Self {
        self.config.translate = v;
        self
    }

    pub fn translators(mut self, kinds: Vec<TranslatorKind>) -> Self {
        self.config.translators = kinds;
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.config.translator = Some(translator);
        self
    }

    pub fn llm_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.llm_provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn libre_url(mut self, url: impl Into<String>) -> Self {
        self.config.libre_url = url.into();
        self
    }

    pub fn libre_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.libre_api_key = Some(key.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn unit_timeout_secs(mut self, secs: u64) -> Self {
        self.config.unit_timeout_secs = secs;
        self
    }

    pub fn extract_cover(mut self, v: bool) -> Self {
        self.config.extract_cover = v;
        self
    }

    pub fn cover_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cover_image = Some(path.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = Some(author.into());
        self
    }

    pub fn round_trip(mut self, v: bool) -> Self {
        self.config.round_trip = v;
        self
    }

    pub fn converter_tool(mut self, tool: impl Into<String>) -> Self {
        self.config.converter_tool = tool.into();
        self
    }

    pub fn intermediate_format(mut self, ext: impl Into<String>) -> Self {
        self.config.intermediate_format = ext.into();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn keep_unpolished(mut self, v: bool) -> Self {
        self.config.keep_unpolished = v;
        self
    }

    pub fn keep_working_files(mut self, v: bool) -> Self {
        self.config.keep_working_files = v;
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2EpubError> {
        let c = &self.config;
        if let Some(ref lang) = c.target_language {
            if lang.trim().is_empty() {
                return Err(Pdf2EpubError::InvalidConfig(
                    "Target language must not be empty".into(),
                ));
            }
        }
        if c.unit_timeout_secs == 0 {
            return Err(Pdf2EpubError::InvalidConfig(
                "Unit timeout must be ≥ 1 second".into(),
            ));
        }
        if c.round_trip && c.converter_tool.trim().is_empty() {
            return Err(Pdf2EpubError::InvalidConfig(
                "Round-trip needs a converter tool".into(),
            ));
        }
        let ext = c.intermediate_format.trim_start_matches('.');
        if ext.is_empty() || !ext.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(Pdf2EpubError::InvalidConfig(format!(
                "Intermediate format must be a plain extension, got '{}'",
                c.intermediate_format
            )));
        }
        if ext.eq_ignore_ascii_case("epub") {
            return Err(Pdf2EpubError::InvalidConfig(
                "Intermediate format must differ from epub".into(),
            ));
        }
        let l = &c.layout;
        if l.bucket_size <= 0.0 || l.heading_ratio <= 0.0 || l.gap_ratio <= 0.0 {
            return Err(Pdf2EpubError::InvalidConfig(
                "Layout bucket size and ratios must be positive".into(),
            ));
        }
        let mut config = self.config;
        config.intermediate_format = config
            .intermediate_format
            .trim_start_matches('.')
            .to_ascii_lowercase();
        Ok(config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output container for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Reflowable EPUB 3 with chapters from headings (default).
    #[default]
    Epub,
    /// Paginated A4 PDF.
    Pdf,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epub" => Ok(OutputFormat::Epub),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unknown format '{other}' (expected epub or pdf)")),
        }
    }
}
