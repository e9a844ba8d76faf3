//! Google Translate's public web endpoint (`translate_a/single`, `client=gtx`).
//!
//! No API key. The response is a loosely-typed nested JSON array; only the
//! first element matters: a list of `[translated, original, ...]` segments.

use super::{http_client, network_error, status_error, Translator};
use crate::error::{Pdf2EpubError, TranslateError};
use async_trait::async_trait;
use serde_json::Value;

const ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
const NAME: &str = "google";

pub struct GoogleWebTranslator {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl GoogleWebTranslator {
    pub fn new(timeout_secs: u64) -> Result<Self, Pdf2EpubError> {
        Self::with_endpoint(ENDPOINT, timeout_secs)
    }

    /// Point at a different host (proxies, tests).
    pub fn with_endpoint(endpoint: &str, timeout_secs: u64) -> Result<Self, Pdf2EpubError> {
        Ok(Self {
            client: http_client(NAME, timeout_secs)?,
            endpoint: endpoint.to_string(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl Translator for GoogleWebTranslator {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslateError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| network_error(NAME, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(TranslateError::UnsupportedLanguage {
                    provider: NAME.to_string(),
                    source_lang: source.to_string(),
                    target_lang: target.to_string(),
                });
            }
            return Err(status_error(NAME, status, None, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| TranslateError::EmptyResponse {
                provider: NAME.to_string(),
            })?;
        parse_response(&body).ok_or_else(|| TranslateError::EmptyResponse {
            provider: NAME.to_string(),
        })
    }
}

/// Concatenate the translated segments of a `translate_a/single` response.
pub fn parse_response(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let translated: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();
    if translated.trim().is_empty() {
        None
    } else {
        Some(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_multi_segment_response() {
        let body = json!([
            [
                ["Bonjour. ", "Hello. ", null, null, 10],
                ["Comment ça va ?", "How are you?", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(
            parse_response(&body).as_deref(),
            Some("Bonjour. Comment ça va ?")
        );
    }

    #[test]
    fn rejects_empty_or_malformed() {
        assert_eq!(parse_response(&json!([[], null, "en"])), None);
        assert_eq!(parse_response(&json!({"error": "x"})), None);
        assert_eq!(parse_response(&json!([[[null, "Hello"]]])), None);
    }
}
