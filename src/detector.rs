//! PII detection interface and a bundled regex detector
//!
//! The pipeline treats detection as a black box behind [`PiiDetector`].
//! [`RegexDetector`] is a fast, high-precision default suitable for tests
//! and single-process deployments; production setups usually plug in a
//! richer detector service.

use crate::error::{PipelineError, Result};
use crate::types::{PiiMatch, Severity};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Detection thresholds passed to a detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    /// Drop matches below this confidence
    pub min_confidence: f64,
    /// Return at most this many matches
    pub max_matches: usize,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            max_matches: 100,
        }
    }
}

/// Detector output
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub matches: Vec<PiiMatch>,
    pub processing_time_ms: u64,
    pub patterns_checked: usize,
}

impl DetectionResult {
    pub fn has_showstoppers(&self) -> bool {
        self.matches.iter().any(PiiMatch::is_showstopper)
    }
}

/// Pluggable PII detector
#[async_trait]
pub trait PiiDetector: Send + Sync {
    /// Detect PII spans in `text`
    async fn detect(&self, text: &str, options: DetectionOptions) -> Result<DetectionResult>;

    /// Detector name (used in logs)
    fn name(&self) -> &str;
}

/// A named detection pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPattern {
    pub name: String,
    pub data_type: String,
    pub pattern: String,
    pub severity: Severity,
    pub confidence: f64,
}

/// Regex-based detector
pub struct RegexDetector {
    patterns: Vec<(DetectionPattern, Regex)>,
}

impl RegexDetector {
    /// Compile the given patterns
    pub fn new(patterns: Vec<DetectionPattern>) -> Result<Self> {
        let compiled = patterns
            .into_iter()
            .map(|p| -> Result<(DetectionPattern, Regex)> {
                let regex = Regex::new(&p.pattern).map_err(|e| {
                    PipelineError::Config(format!("Invalid detection pattern {}: {}", p.name, e))
                })?;
                Ok((p, regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns: compiled })
    }

    /// Detector with [`default_detection_patterns`]
    pub fn with_defaults() -> Result<Self> {
        Self::new(default_detection_patterns())
    }

    /// Synchronous detection, shared by the async trait impl
    pub fn scan(&self, text: &str, options: DetectionOptions) -> DetectionResult {
        let started = Instant::now();
        let mut matches = Vec::new();

        for (pattern, regex) in &self.patterns {
            if pattern.confidence < options.min_confidence {
                continue;
            }
            for mat in regex.find_iter(text) {
                matches.push(
                    PiiMatch::new(
                        mat.as_str(),
                        pattern.data_type.clone(),
                        pattern.severity,
                        mat.start(),
                        mat.end(),
                    )
                    .with_confidence(pattern.confidence)
                    .with_pattern(pattern.name.clone()),
                );
            }
        }

        matches.sort_by_key(|m| (m.start_index, std::cmp::Reverse(m.end_index)));
        let matches = drop_overlapping(matches);
        let matches: Vec<PiiMatch> = matches.into_iter().take(options.max_matches).collect();

        DetectionResult {
            matches,
            processing_time_ms: started.elapsed().as_millis() as u64,
            patterns_checked: self.patterns.len(),
        }
    }
}

/// Keep the first (longest at equal start) of any overlapping spans.
/// Input must be sorted by start ascending.
fn drop_overlapping(matches: Vec<PiiMatch>) -> Vec<PiiMatch> {
    let mut kept: Vec<PiiMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        match kept.last() {
            Some(last) if m.start_index < last.end_index => continue,
            _ => kept.push(m),
        }
    }
    kept
}

#[async_trait]
impl PiiDetector for RegexDetector {
    async fn detect(&self, text: &str, options: DetectionOptions) -> Result<DetectionResult> {
        Ok(self.scan(text, options))
    }

    fn name(&self) -> &str {
        "regex"
    }
}

/// Default detection patterns
pub fn default_detection_patterns() -> Vec<DetectionPattern> {
    let pattern = |name: &str, data_type: &str, regex: &str, severity, confidence| DetectionPattern {
        name: name.to_string(),
        data_type: data_type.to_string(),
        pattern: regex.to_string(),
        severity,
        confidence,
    };

    vec![
        pattern(
            "ssn",
            "ssn",
            r"\b\d{3}-\d{2}-\d{4}\b",
            Severity::Showstopper,
            0.95,
        ),
        pattern(
            "credit_card",
            "credit_card",
            r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
            Severity::Showstopper,
            0.9,
        ),
        pattern(
            "email",
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9._-]+\.[A-Za-z]{2,}\b",
            Severity::Warning,
            0.95,
        ),
        pattern(
            "phone_us",
            "phone",
            r"\b\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            Severity::Warning,
            0.85,
        ),
        pattern(
            "ipv4",
            "ip_address",
            r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            Severity::Info,
            0.8,
        ),
        pattern(
            "api_key",
            "api_key",
            r"\b(?:sk|pk|api|key)[-_][A-Za-z0-9_-]{20,}\b",
            Severity::Showstopper,
            0.9,
        ),
    ]
}
