//! Output checks that keep an answer grounded.
//!
//! [`GroundingPolicy::apply`] runs the model output through a fixed sequence
//! of pure steps, each of which can end in the fallback answer:
//!
//! 1. sanitize: strip refusal boilerplate and everything after it, collapse
//!    whitespace, trim
//! 2. empty check
//! 3. fallback echo: the model answered with the fallback sentence itself
//! 4. context-leak check
//! 5. sentence cap

use regex::Regex;
use tracing::debug;

use rag_core::{Answer, FallbackReason, GroundingConfig, RagError, Result};

/// Compiled grounding rules.
#[derive(Debug, Clone)]
pub struct GroundingPolicy {
    fallback: String,

    /// Matches the first refusal phrase and the rest of the text.
    refusal: Option<Regex>,

    /// Lowercased leak phrases.
    leak_phrases: Vec<String>,

    max_sentences: usize,
}

impl GroundingPolicy {
    pub fn from_config(config: &GroundingConfig) -> Result<Self> {
        if config.fallback.trim().is_empty() {
            return Err(RagError::config("grounding.fallback must not be empty"));
        }
        if config.max_sentences == 0 {
            return Err(RagError::config("grounding.max_sentences must be at least 1"));
        }

        let patterns: Vec<String> = config
            .refusal_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();

        let refusal = if patterns.is_empty() {
            None
        } else {
            let source = format!(r"(?is)\b(?:{})\b.*", patterns.join("|"));
            let regex = Regex::new(&source).map_err(|e| {
                RagError::config(format!("Invalid refusal pattern: {}", e))
            })?;
            Some(regex)
        };

        let leak_phrases = config
            .leak_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            fallback: config.fallback.clone(),
            refusal,
            leak_phrases,
            max_sentences: config.max_sentences,
        })
    }

    /// The configured fallback sentence.
    pub fn fallback_text(&self) -> &str {
        &self.fallback
    }

    /// The fallback answer for `reason`.
    pub fn fallback(&self, reason: FallbackReason) -> Answer {
        debug!(%reason, "Answering with fallback");
        Answer::Fallback {
            reason,
            text: self.fallback.clone(),
        }
    }

    /// Strip refusal boilerplate, collapse whitespace runs and trim.
    pub fn sanitize(&self, raw: &str) -> String {
        let stripped = match &self.refusal {
            Some(regex) => regex.replace(raw.trim(), ""),
            None => raw.trim().into(),
        };
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Whether `answer` talks about the context instead of answering from it.
    ///
    /// The fallback sentence itself never counts as a leak.
    pub fn leaks_context(&self, answer: &str) -> bool {
        if answer.trim() == self.fallback {
            return false;
        }
        let lower = answer.to_lowercase();
        self.leak_phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Keep at most the configured number of sentences, joined by single spaces.
    pub fn cap_sentences(&self, answer: &str) -> String {
        let sentences = split_sentences(answer);
        if sentences.len() <= self.max_sentences {
            return answer.to_string();
        }
        debug!(
            sentences = sentences.len(),
            kept = self.max_sentences,
            "Capping answer length"
        );
        sentences[..self.max_sentences].join(" ").trim().to_string()
    }

    /// Turn raw model output into an answer.
    pub fn apply(&self, raw: &str) -> Answer {
        let answer = self.sanitize(raw);

        if answer.is_empty() {
            return self.fallback(FallbackReason::EmptyAfterSanitize);
        }
        if answer == self.fallback {
            return self.fallback(FallbackReason::NotFound);
        }
        if self.leaks_context(&answer) {
            return self.fallback(FallbackReason::ContextLeak);
        }

        Answer::Grounded(self.cap_sentences(&answer))
    }
}

/// Split on whitespace runs that follow `.`, `!` or `?`.
///
/// The punctuation stays with its sentence and the whitespace is dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            sentences.push(&text[start..i]);

            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = j + next.len_utf8();
                chars.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(c);
    }

    if start < text.len() || sentences.is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "The provided context does not specify this.";

    fn policy() -> GroundingPolicy {
        GroundingPolicy::from_config(&GroundingConfig::default()).unwrap()
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(
            policy().sanitize("  The device\n\nuses   5V.\t "),
            "The device uses 5V."
        );
    }

    #[test]
    fn test_sanitize_strips_refusal_tail() {
        let policy = policy();
        assert_eq!(
            policy.sanitize("It uses 5V. As an AI language model, I cannot verify this."),
            "It uses 5V."
        );
        assert_eq!(policy.sanitize("I'm unable to help\nwith that."), "");
        assert_eq!(policy.sanitize("I can't say."), "");
    }

    #[test]
    fn test_refusal_drops_following_lines() {
        let policy = policy();
        assert_eq!(
            policy.sanitize("The device uses 5V.\nI cannot verify more.\nIt draws 200mA."),
            "The device uses 5V."
        );
        assert_eq!(
            policy.sanitize("The device uses 5V.\nIt draws 200mA."),
            "The device uses 5V. It draws 200mA."
        );
    }

    #[test]
    fn test_refusal_needs_word_boundary() {
        assert_eq!(policy().sanitize("Wii cannot run this."), "Wii cannot run this.");
    }

    #[test]
    fn test_empty_after_sanitize() {
        let answer = policy().apply("  As an AI language model I have no opinion. ");
        assert_eq!(answer.text(), FALLBACK);
        assert_eq!(
            answer.fallback_reason(),
            Some(FallbackReason::EmptyAfterSanitize)
        );
    }

    #[test]
    fn test_leak_replaced_by_fallback() {
        let answer = policy().apply("The provided context states the device uses 5V.");
        assert_eq!(answer.text(), FALLBACK);
        assert_eq!(answer.fallback_reason(), Some(FallbackReason::ContextLeak));

        let answer = policy().apply("Per the PROVIDED CONTEXT, it is 5V.");
        assert_eq!(answer.fallback_reason(), Some(FallbackReason::ContextLeak));
    }

    #[test]
    fn test_fallback_echo_is_not_a_leak() {
        let policy = policy();
        assert!(!policy.leaks_context(FALLBACK));

        let answer = policy.apply(&format!("  {}  ", FALLBACK));
        assert_eq!(answer.text(), FALLBACK);
        assert_eq!(answer.fallback_reason(), Some(FallbackReason::NotFound));
    }

    #[test]
    fn test_seven_sentences_capped_to_five() {
        let raw = "One. Two! Three? Four. Five. Six. Seven.";
        let answer = policy().apply(raw);
        assert_eq!(answer, Answer::Grounded("One. Two! Three? Four. Five.".to_string()));
    }

    #[test]
    fn test_short_answer_untouched() {
        let answer = policy().apply("The device operates at 5V. It draws 200mA.");
        assert_eq!(
            answer,
            Answer::Grounded("The device operates at 5V. It draws 200mA.".to_string())
        );
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("A b.  C d!\nE?F. G"),
            vec!["A b.", "C d!", "E?F.", "G"]
        );
        assert_eq!(split_sentences("No boundary"), vec!["No boundary"]);
        assert_eq!(split_sentences("Version 2.5 is out."), vec!["Version 2.5 is out."]);
    }

    #[test]
    fn test_custom_rules() {
        let config = GroundingConfig {
            fallback: "Not in the manual.".to_string(),
            refusal_patterns: Vec::new(),
            leak_phrases: vec!["Source Text".to_string()],
            max_sentences: 1,
        };
        let policy = GroundingPolicy::from_config(&config).unwrap();

        assert_eq!(policy.sanitize("I cannot say."), "I cannot say.");
        assert_eq!(policy.apply("The source text says 5V.").text(), "Not in the manual.");
        assert_eq!(policy.apply("It is 5V. It is small.").text(), "It is 5V.");
    }

    #[test]
    fn test_rejects_empty_fallback() {
        let config = GroundingConfig {
            fallback: "  ".to_string(),
            ..GroundingConfig::default()
        };
        assert!(GroundingPolicy::from_config(&config).is_err());
    }
}
