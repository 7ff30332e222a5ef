//! Rule classification capability.
//!
//! The pipeline only depends on the [`Classifier`] trait; what sits
//! behind it (a keyword heuristic, an external model, a remote service)
//! is the implementation's business, including any I/O and timeouts.

use serde::Serialize;

use crate::error::Result;

/// One chunk as presented to a classifier.
#[derive(Debug, Clone)]
pub struct ClassifierInput<'a> {
    pub content: &'a str,
    pub order: u64,
    pub associated_words: &'a [String],
}

/// A classifier's verdict on a single chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub is_rule: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub rule_name: String,
    pub rule_type: String,
    pub reasoning: String,
}

/// Scores a chunk for "is this a game rule".
pub trait Classifier {
    fn classify(&self, input: &ClassifierInput<'_>) -> Result<Classification>;

    /// Human-readable name for logging and status output.
    fn name(&self) -> &'static str;
}

/// Terms whose presence marks a chunk as likely rule text.
pub const RULE_KEYWORDS: &[&str] = &[
    "rule",
    "dice",
    "roll",
    "difficulty",
    "success",
    "failure",
    "check",
    "test",
    "mechanic",
];

/// Deterministic keyword heuristic: a chunk containing any rule keyword
/// is a probable rule at 0.6 confidence, anything else 0.3.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn classify(&self, input: &ClassifierInput<'_>) -> Result<Classification> {
        let text = input.content.to_lowercase();
        let has_keywords =
            RULE_KEYWORDS.iter().any(|k| text.contains(k));

        Ok(Classification {
            is_rule: has_keywords,
            confidence: if has_keywords { 0.6 } else { 0.3 },
            rule_name: if has_keywords {
                "Detected Rule".to_string()
            } else {
                "Not a Rule".to_string()
            },
            rule_type: "general".to_string(),
            reasoning: "keyword-based analysis".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Minimal conforming fallback: never a rule, zero confidence.
#[derive(Debug, Default)]
pub struct NoopClassifier;

impl Classifier for NoopClassifier {
    fn classify(&self, _input: &ClassifierInput<'_>) -> Result<Classification> {
        Ok(Classification {
            is_rule: false,
            confidence: 0.0,
            rule_name: String::new(),
            rule_type: String::new(),
            reasoning: "classification disabled".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(content: &str) -> ClassifierInput<'_> {
        ClassifierInput {
            content,
            order: 0,
            associated_words: &[],
        }
    }

    #[test]
    fn keyword_classifier_detects_rule_text() {
        let classifier = KeywordClassifier;
        let verdict = classifier
            .classify(&input("Roll the dice against difficulty 6."))
            .unwrap();
        assert!(verdict.is_rule);
        assert_eq!(verdict.confidence, 0.6);
    }

    #[test]
    fn keyword_classifier_rejects_flavor_text() {
        let classifier = KeywordClassifier;
        let verdict = classifier
            .classify(&input("The city slept beneath a velvet sky."))
            .unwrap();
        assert!(!verdict.is_rule);
        assert_eq!(verdict.confidence, 0.3);
    }

    #[test]
    fn keyword_classifier_is_case_insensitive() {
        let classifier = KeywordClassifier;
        let verdict =
            classifier.classify(&input("DIFFICULTY ratings")).unwrap();
        assert!(verdict.is_rule);
    }

    #[test]
    fn noop_classifier_never_accepts() {
        let classifier = NoopClassifier;
        let verdict = classifier
            .classify(&input("Roll the dice against difficulty 6."))
            .unwrap();
        assert!(!verdict.is_rule);
        assert_eq!(verdict.confidence, 0.0);
    }
}
