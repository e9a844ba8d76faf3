//! LLM translation through `edgequake-llm`.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) spaces the attempts out: with a 500 ms
//! base and 3 retries the waits are 500 ms → 1 s → 2 s.
//!
//! The per-unit deadline in [`crate::pipeline::translate`] still applies on
//! top of this; a unit that spends too long retrying is abandoned and keeps
//! its source text.

use super::Translator;
use crate::config::ConversionConfig;
use crate::error::{Pdf2EpubError, TranslateError};
use crate::prompts::{clean_model_output, translation_system_prompt, DEFAULT_TRANSLATION_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

const NAME: &str = "llm";
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

pub struct LlmTranslator {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmTranslator {
    /// Wrap an already-configured provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_TRANSLATION_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve a provider from config/environment and wrap it.
    pub async fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2EpubError> {
        let provider = resolve_provider(config).await?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslateError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(translation_system_prompt(&self.system_prompt, target, source)),
            ChatMessage::user(text),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "LLM translation: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "LLM translation: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let cleaned = clean_model_output(&response.content);
                    if cleaned.is_empty() {
                        return Err(TranslateError::EmptyResponse {
                            provider: NAME.to_string(),
                        });
                    }
                    return Ok(cleaned);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("LLM translation: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(TranslateError::Provider {
            provider: NAME.to_string(),
            message: format!(
                "failed after {} retries: {}",
                self.max_retries,
                last_err.unwrap_or_else(|| "Unknown error".to_string())
            ),
        })
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2EpubError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2EpubError::TranslatorNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.llm_provider`) used as-is
/// 2. **Named provider + model** (`config.provider_name`), API key read from
///    the provider's usual env var by [`ProviderFactory::create_llm_provider`]
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 4. **Auto-detection**: OpenAI when `OPENAI_API_KEY` is set, otherwise
///    whatever [`ProviderFactory::from_env`] finds
async fn resolve_provider(
    config: &ConversionConfig,
) -> Result<Arc<dyn LLMProvider>, Pdf2EpubError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.llm_provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    // 3) EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL when both set
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // 4) Prefer OpenAI when its key is present, then full auto-detection.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2EpubError::TranslatorNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn build_options_follow_config() {
        let config = ConversionConfig::builder()
            .temperature(0.3)
            .max_tokens(512)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(512));
    }
}
