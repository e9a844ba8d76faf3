//! Prompts for LLM-backed paragraph translation.
//!
//! Kept in one place so unit tests can inspect them without a live model,
//! and so the wording can change without touching retry or error handling.
//!
//! Callers can override the system prompt via
//! [`crate::config::ConversionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for translating one paragraph or heading.
///
/// `{target}` and `{source}` are substituted by [`translation_system_prompt`].
pub const DEFAULT_TRANSLATION_PROMPT: &str = r#"You are a professional literary translator. Translate the user's text from {source} into {target}.

Follow these rules precisely:

1. FIDELITY
   - Translate the complete text; never summarise, skip or add sentences
   - Keep proper nouns, numbers and units as they are unless a standard
     translation exists

2. MARKUP
   - Keep **bold**, *italic*, __bold__ and _italic_ markers around the
     corresponding translated words
   - Do not add Markdown, quotes or code fences that were not in the input

3. OUTPUT FORMAT
   - Output ONLY the translated text, on a single paragraph
   - Do NOT add commentary, notes, or the original text
   - If the text is already in {target}, return it unchanged"#;

/// Build the system prompt for one unit.
///
/// `source` of `"auto"` becomes "the source language" so the model detects it.
pub fn translation_system_prompt(template: &str, target: &str, source: &str) -> String {
    let source = if source.eq_ignore_ascii_case("auto") || source.is_empty() {
        "the source language"
    } else {
        source
    };
    template
        .replace("{target}", target)
        .replace("{source}", source)
}

/// Strip wrappers models sometimes add despite the prompt: code fences and
/// a single pair of enclosing quotes.
pub fn clean_model_output(raw: &str) -> String {
    let mut s = raw.trim();
    if s.starts_with("```") {
        s = s.trim_start_matches('`');
        // Drop an info string such as "text" on the fence line.
        s = match s.find('\n') {
            Some(i) => &s[i + 1..],
            None => s,
        };
        s = s.trim_end().trim_end_matches('`').trim();
    }
    for (open, close) in [('"', '"'), ('“', '”'), ('«', '»')] {
        if s.len() > 1 && s.starts_with(open) && s.ends_with(close) {
            let inner = &s[open.len_utf8()..s.len() - close.len_utf8()];
            if !inner.contains(open) && !inner.contains(close) {
                s = inner.trim();
            }
            break;
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_substitutes_languages() {
        let p = translation_system_prompt(DEFAULT_TRANSLATION_PROMPT, "French", "auto");
        assert!(p.contains("into French"));
        assert!(p.contains("from the source language"));
        assert!(!p.contains("{target}"));
    }

    #[test]
    fn explicit_source_is_named() {
        let p = translation_system_prompt(DEFAULT_TRANSLATION_PROMPT, "de", "en");
        assert!(p.contains("from en into de"));
    }

    #[test]
    fn clean_strips_fences_and_quotes() {
        assert_eq!(clean_model_output("```text\nHallo Welt\n```"), "Hallo Welt");
        assert_eq!(clean_model_output("\"Bonjour\""), "Bonjour");
        assert_eq!(clean_model_output("« Salut »"), "Salut");
        assert_eq!(
            clean_model_output("\"a\" and \"b\""),
            "\"a\" and \"b\"",
            "inner quotes mean the outer pair is content"
        );
    }
}
