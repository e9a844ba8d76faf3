//! LibreTranslate (`POST /translate`), self-hosted or public instance.

use super::{http_client, network_error, status_error, Translator};
use crate::error::{Pdf2EpubError, TranslateError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const NAME: &str = "libretranslate";

pub struct LibreTranslateTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

impl LibreTranslateTranslator {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, Pdf2EpubError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Pdf2EpubError::TranslatorNotConfigured {
                provider: NAME.to_string(),
                hint: "Set --libre-url (or LIBRETRANSLATE_URL) to a LibreTranslate instance."
                    .to_string(),
            });
        }
        Ok(Self {
            client: http_client(NAME, timeout_secs)?,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/translate", self.base_url)
    }
}

#[async_trait]
impl Translator for LibreTranslateTranslator {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: &str,
    ) -> Result<String, TranslateError> {
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error(NAME, self.timeout_secs, e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| network_error(NAME, self.timeout_secs, e))?;

        if !status.is_success() {
            if status == reqwest::StatusCode::BAD_REQUEST {
                if let Some(message) = parse_body(&body).and_then(|r| r.error) {
                    if is_language_error(&message) {
                        return Err(TranslateError::UnsupportedLanguage {
                            provider: NAME.to_string(),
                            source_lang: source.to_string(),
                            target_lang: target.to_string(),
                        });
                    }
                }
            }
            return Err(status_error(NAME, status, retry_after, &body));
        }

        parse_body(&body)
            .and_then(|r| r.translated_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TranslateError::EmptyResponse {
                provider: NAME.to_string(),
            })
    }
}

fn parse_body(body: &str) -> Option<TranslateResponse> {
    serde_json::from_str(body).ok()
}

fn is_language_error(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("not supported") || m.contains("language")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_key() {
        let req = TranslateRequest {
            q: "hi",
            source: "auto",
            target: "de",
            format: "text",
            api_key: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("api_key"));
        assert!(json.contains(r#""target":"de""#));
    }

    #[test]
    fn parses_success_and_error_bodies() {
        let ok = parse_body(r#"{"translatedText":"Hallo"}"#).unwrap();
        assert_eq!(ok.translated_text.as_deref(), Some("Hallo"));

        let err = parse_body(r#"{"error":"xx is not supported"}"#).unwrap();
        assert!(is_language_error(err.error.as_deref().unwrap()));
    }

    #[test]
    fn blank_url_is_rejected() {
        assert!(LibreTranslateTranslator::new("  ", None, 30).is_err());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let t = LibreTranslateTranslator::new("http://localhost:5000/", Some(String::new()), 30)
            .unwrap();
        assert_eq!(t.endpoint(), "http://localhost:5000/translate");
        assert!(t.api_key.is_none());
    }
}
