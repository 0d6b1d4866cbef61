//! Free-text sentiment classification.

use crate::types::Sentiment;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classifier output with intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentGrade {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

impl SentimentGrade {
    pub fn sentiment(self) -> Sentiment {
        match self {
            Self::VeryPositive | Self::Positive => Sentiment::Positive,
            Self::Neutral => Sentiment::Neutral,
            Self::Negative | Self::VeryNegative => Sentiment::Negative,
        }
    }

    pub fn is_intense(self) -> bool {
        matches!(self, Self::VeryPositive | Self::VeryNegative)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryPositive => "very_positive",
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::VeryNegative => "very_negative",
        }
    }
}

impl From<Sentiment> for SentimentGrade {
    fn from(sentiment: Sentiment) -> Self {
        match sentiment {
            Sentiment::Positive => Self::Positive,
            Sentiment::Negative => Self::Negative,
            Sentiment::Neutral => Self::Neutral,
        }
    }
}

impl fmt::Display for SentimentGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Sentiment classifier unavailable: {0}")]
    Unavailable(String),
}

pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<SentimentGrade, ClassifierError>;
}

const VERY_POSITIVE: &[&str] = &[
    "perfect",
    "excellent",
    "amazing",
    "fantastic",
    "exactly",
    "love",
    "incredible",
    "best",
    "ideal",
    "wonderful",
];

const VERY_NEGATIVE: &[&str] = &[
    "terrible",
    "awful",
    "horrible",
    "worst",
    "waste",
    "completely wrong",
    "disaster",
    "never",
    "hate",
];

const NEGATIVE: &[&str] = &[
    "not great",
    "could be better",
    "mismatch",
    "wrong",
    "not interested",
    "not quite",
    "disappointing",
    "poor",
];

const POSITIVE: &[&str] = &[
    "good",
    "great",
    "helpful",
    "nice",
    "useful",
    "interested",
    "relevant",
    "valuable",
    "like",
];

/// Keyword lists matched on word boundaries, case-insensitively.
///
/// Checked in order: very positive, very negative, negative, positive.
/// Negative phrases go before positive ones so "not great" is not read
/// as "great".
pub struct KeywordClassifier {
    rules: Vec<(SentimentGrade, Regex)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let rules = [
            (SentimentGrade::VeryPositive, VERY_POSITIVE),
            (SentimentGrade::VeryNegative, VERY_NEGATIVE),
            (SentimentGrade::Negative, NEGATIVE),
            (SentimentGrade::Positive, POSITIVE),
        ]
        .into_iter()
        .filter_map(|(grade, words)| keyword_pattern(words).map(|re| (grade, re)))
        .collect();
        Self { rules }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn keyword_pattern(words: &[&str]) -> Option<Regex> {
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}

impl SentimentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Result<SentimentGrade, ClassifierError> {
        Ok(self
            .rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(grade, _)| *grade)
            .unwrap_or(SentimentGrade::Neutral))
    }
}
