//! Translation backends.
//!
//! Every backend implements [`Translator`]: one call, one piece of text,
//! `Ok(translated)` or a [`TranslateError`]. Backends know nothing about
//! blocks, progress or timeouts; [`crate::pipeline::translate`] owns those.
//!
//! ## Fallback chain
//!
//! [`FallbackTranslator`] holds an ordered list of backends and tries each
//! in turn until one succeeds. If all of them fail, the **last** error is
//! returned. The order comes straight from
//! [`crate::config::ConversionConfig::translators`], so the policy is visible
//! in configuration instead of hidden inside a client.
//!
//! ```text
//! google ──✗──▶ libre ──✗──▶ llm ──✓──▶ "Bonjour"
//! ```

pub mod google;
pub mod libre;
pub mod llm;

pub use google::GoogleWebTranslator;
pub use libre::LibreTranslateTranslator;
pub use llm::LlmTranslator;

use crate::config::ConversionConfig;
use crate::error::{Pdf2EpubError, TranslateError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single translation backend.
///
/// `source` is an ISO 639-1 code or `"auto"`.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslateError>;
}

/// Tries each backend in order; returns the first success or the last error.
pub struct FallbackTranslator {
    providers: Vec<Arc<dyn Translator>>,
}

impl FallbackTranslator {
    pub fn new(providers: Vec<Arc<dyn Translator>>) -> Self {
        Self { providers }
    }

    /// Provider names in try order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

impl fmt::Debug for FallbackTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackTranslator")
            .field("providers", &self.provider_names())
            .finish()
    }
}

#[async_trait]
impl Translator for FallbackTranslator {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslateError> {
        let mut last_err = TranslateError::NoProviders;
        for provider in &self.providers {
            match provider.translate(text, target, source).await {
                Ok(translated) => {
                    debug!("{}: translated {} chars", provider.name(), text.len());
                    return Ok(translated);
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {}", provider.name(), e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

/// Which backend to put in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorKind {
    Google,
    Libre,
    Llm,
}

impl TranslatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TranslatorKind::Google => "google",
            TranslatorKind::Libre => "libre",
            TranslatorKind::Llm => "llm",
        }
    }
}

impl fmt::Display for TranslatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(TranslatorKind::Google),
            "libre" | "libretranslate" => Ok(TranslatorKind::Libre),
            "llm" | "ai" => Ok(TranslatorKind::Llm),
            other => Err(format!(
                "unknown translator '{other}' (expected google, libre or llm)"
            )),
        }
    }
}

/// Build the translator a job should use.
///
/// A pre-built [`ConversionConfig::translator`] wins. Otherwise one backend
/// per entry of [`ConversionConfig::translators`], wrapped in a
/// [`FallbackTranslator`].
pub async fn build_translator(
    config: &ConversionConfig,
) -> Result<Arc<dyn Translator>, Pdf2EpubError> {
    if let Some(ref translator) = config.translator {
        return Ok(Arc::clone(translator));
    }

    if config.translators.is_empty() {
        return Err(Pdf2EpubError::TranslatorNotConfigured {
            provider: "none".to_string(),
            hint: "Select at least one translator (google, libre, llm).".to_string(),
        });
    }

    let mut providers: Vec<Arc<dyn Translator>> = Vec::with_capacity(config.translators.len());
    for kind in &config.translators {
        let provider: Arc<dyn Translator> = match kind {
            TranslatorKind::Google => {
                Arc::new(GoogleWebTranslator::new(config.unit_timeout_secs)?)
            }
            TranslatorKind::Libre => Arc::new(LibreTranslateTranslator::new(
                &config.libre_url,
                config.libre_api_key.clone(),
                config.unit_timeout_secs,
            )?),
            TranslatorKind::Llm => Arc::new(LlmTranslator::from_config(config).await?),
        };
        debug!("Translator chain: + {}", provider.name());
        providers.push(provider);
    }

    if providers.len() == 1 {
        return Ok(providers.remove(0));
    }
    Ok(Arc::new(FallbackTranslator::new(providers)))
}

/// Build the shared HTTP client for the web backends.
pub(crate) fn http_client(
    provider: &str,
    timeout_secs: u64,
) -> Result<reqwest::Client, Pdf2EpubError> {
    reqwest::Client::builder()
        .user_agent(concat!("pdf2epub/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| Pdf2EpubError::TranslatorNotConfigured {
            provider: provider.to_string(),
            hint: format!("HTTP client could not be created: {e}"),
        })
}

/// Map a transport error to a [`TranslateError`].
pub(crate) fn network_error(
    provider: &str,
    timeout_secs: u64,
    e: reqwest::Error,
) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Timeout {
            provider: provider.to_string(),
            secs: timeout_secs,
        }
    } else {
        TranslateError::Network {
            provider: provider.to_string(),
            detail: e.to_string(),
        }
    }
}

/// Map a non-success HTTP status to a [`TranslateError`].
pub(crate) fn status_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> TranslateError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return TranslateError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs: retry_after,
        };
    }
    if status.is_server_error() {
        return TranslateError::Network {
            provider: provider.to_string(),
            detail: format!("HTTP {status}"),
        };
    }
    let body = body.trim();
    TranslateError::Provider {
        provider: provider.to_string(),
        message: if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", truncate(body, 200))
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
