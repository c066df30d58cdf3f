//! Prompt complexity scoring and tier selection
//!
//! A cheap lexical heuristic: word and sentence counts, code, question
//! words, multi-request conjunctions and technical vocabulary each add to a
//! raw score, which is bucketed into one of three tiers.

use crate::types::ModelTier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Raw score at or below which a prompt is simple
pub const SIMPLE_MAX_SCORE: u32 = 4;
/// Raw score at or below which a prompt is medium
pub const MEDIUM_MAX_SCORE: u32 = 8;

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").unwrap())
}

fn inline_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]+`").unwrap())
}

fn question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(why|how|explain|analyze|compare|evaluate|what if|describe|discuss)\b")
            .unwrap()
    })
}

fn conjunction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(additionally|also|furthermore|moreover|as well as|and then)\b").unwrap()
    })
}

fn technical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(algorithm|architecture|database|api|function|implementation|performance|optimization|security|infrastructure)\b",
        )
        .unwrap()
    })
}

/// Complexity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Medium,
    Complex,
}

impl ComplexityLevel {
    /// Bucket a raw score
    pub fn from_score(raw_score: u32) -> Self {
        if raw_score <= SIMPLE_MAX_SCORE {
            Self::Simple
        } else if raw_score <= MEDIUM_MAX_SCORE {
            Self::Medium
        } else {
            Self::Complex
        }
    }

    pub fn tier(&self) -> ModelTier {
        match self {
            Self::Simple => ModelTier::UltraFast,
            Self::Medium => ModelTier::General,
            Self::Complex => ModelTier::FastThinking,
        }
    }

    /// Score reported on routing decisions
    pub fn score(&self) -> u8 {
        match self {
            Self::Simple => 3,
            Self::Medium => 6,
            Self::Complex => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Result of [`analyze_complexity`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityAnalysis {
    pub raw_score: u32,
    pub level: ComplexityLevel,
    pub tier: ModelTier,
    pub word_count: usize,
    pub sentence_count: usize,
    /// Names of the signals that contributed beyond the word-count base
    pub factors: Vec<String>,
}

impl ComplexityAnalysis {
    pub fn score(&self) -> u8 {
        self.level.score()
    }
}

/// Score `prompt` and pick a tier
pub fn analyze_complexity(prompt: &str) -> ComplexityAnalysis {
    let word_count = prompt.split_whitespace().count();
    let sentence_count = sentence_regex()
        .split(prompt)
        .filter(|s| !s.trim().is_empty())
        .count();

    let mut factors = Vec::new();
    let mut raw_score = match word_count {
        0..=19 => 1,
        20..=99 => 3,
        100..=299 => 5,
        _ => 7,
    };

    let avg_words = word_count as f64 / sentence_count.max(1) as f64;
    if avg_words > 15.0 {
        raw_score += 2;
        factors.push("long-sentences".to_string());
    }
    if sentence_count > 5 {
        raw_score += 2;
        factors.push("many-sentences".to_string());
    }
    if prompt.contains("```") || inline_code_regex().is_match(prompt) {
        raw_score += 3;
        factors.push("code".to_string());
    }
    if question_regex().is_match(prompt) {
        raw_score += 2;
        factors.push("analytical-question".to_string());
    }
    if conjunction_regex().is_match(prompt) {
        raw_score += 2;
        factors.push("multi-request".to_string());
    }
    if technical_regex().is_match(prompt) {
        raw_score += 1;
        factors.push("technical-terms".to_string());
    }

    let level = ComplexityLevel::from_score(raw_score);
    ComplexityAnalysis {
        raw_score,
        level,
        tier: level.tier(),
        word_count,
        sentence_count,
        factors,
    }
}
