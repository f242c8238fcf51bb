use std::sync::Arc;

use crate::llm::system_prompt::SystemPromptManager;
use crate::llm::{GenerateOptions, LlmModelTrait};

/// Spelling/grammar repair for the raw request text.
///
/// Best effort by contract: any failure of the underlying model, and any
/// output that fails the acceptance checks, falls back to the original text.
/// A correction must never change what is being asked.
pub struct Corrector {
    llm: Arc<dyn LlmModelTrait>,
    prompts: SystemPromptManager,
}

impl Corrector {
    pub fn new(llm: Arc<dyn LlmModelTrait>, prompts: SystemPromptManager) -> Self {
        Self { llm, prompts }
    }

    pub async fn correct(&self, text: &str) -> String {
        let mut options = GenerateOptions::default();
        options.messages = self.prompts.build_corrector_messages(text);
        options.max_tokens = 200;

        match self.llm.generate_with_options(options).await {
            Ok(output) => {
                let candidate = unquote(output.trim());
                if accept(text, candidate) {
                    if candidate != text {
                        tracing::info!("corrected '{}' -> '{}'", text, candidate);
                    }
                    candidate.to_string()
                } else {
                    tracing::warn!(
                        "rejected correction '{}' for '{}', keeping original",
                        candidate,
                        text
                    );
                    text.to_string()
                }
            }
            Err(e) => {
                tracing::warn!("correction unavailable ({}), keeping original text", e);
                text.to_string()
            }
        }
    }
}

/// Models like to wrap the corrected sentence in quotes.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

/// Acceptance checks: non-empty, same digit runs in the same order (so
/// quantities and comparand values survive verbatim), and no runaway length.
fn accept(original: &str, corrected: &str) -> bool {
    if corrected.is_empty() {
        return false;
    }
    if corrected.len() > original.len() * 3 + 40 {
        return false;
    }
    digit_runs(original) == digit_runs(corrected)
}

fn digit_runs(s: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubLlm;

    fn corrector(llm: StubLlm) -> Corrector {
        Corrector::new(Arc::new(llm), SystemPromptManager::new())
    }

    #[tokio::test]
    async fn good_correction_is_accepted() {
        let c = corrector(StubLlm::scripted(vec![
            "2 bedroom apartments in Dubai Marina under 3 million AED",
        ]));
        let out = c
            .correct("2 bedrom apartmants in Dubai Marina under 3 milion AED")
            .await;
        assert_eq!(out, "2 bedroom apartments in Dubai Marina under 3 million AED");
    }

    #[tokio::test]
    async fn model_failure_returns_original() {
        let c = corrector(StubLlm::failing());
        let out = c.correct("vilas in palm jumeirah").await;
        assert_eq!(out, "vilas in palm jumeirah");
    }

    #[tokio::test]
    async fn digit_mutation_is_rejected() {
        // The model "fixed" 3 million into 2 million; the original wins.
        let c = corrector(StubLlm::scripted(vec![
            "2 bedroom apartments under 2 million AED",
        ]));
        let out = c.correct("2 bedroom apartments under 3 million AED").await;
        assert_eq!(out, "2 bedroom apartments under 3 million AED");
    }

    #[tokio::test]
    async fn empty_output_is_rejected() {
        let c = corrector(StubLlm::scripted(vec!["  "]));
        let out = c.correct("villas in JVC").await;
        assert_eq!(out, "villas in JVC");
    }

    #[tokio::test]
    async fn quoted_output_is_unwrapped() {
        let c = corrector(StubLlm::scripted(vec!["\"villas in Palm Jumeirah\""]));
        let out = c.correct("vilas in palm jumeira").await;
        assert_eq!(out, "villas in Palm Jumeirah");
    }

    #[test]
    fn digit_runs_preserve_order() {
        assert_eq!(digit_runs("2 bed under 3,000,000"), vec!["2", "3", "000", "000"]);
    }
}
