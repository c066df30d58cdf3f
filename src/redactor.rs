//! Pattern redaction
//!
//! Replaces detector-reported PII spans with numbered placeholders that can
//! be swapped back after the provider responds.
//!
//! Spans are applied from the end of the text backward and the output is
//! assembled in a fresh buffer, so no offset is ever re-indexed after an
//! edit. The per-type counter runs in that same backward order: in
//! `"a@x.io b@x.io"` the second address becomes `[EMAIL_REDACTED]` and the
//! first `[EMAIL_REDACTED]_2`.

use crate::detector::{DetectionOptions, PiiDetector};
use crate::error::Result;
use crate::store::ReplacementStore;
use crate::types::{PatternRedactionMapping, PiiMatch, RedactionResult, ReversalResult};
use regex::{NoExpand, Regex};
use std::collections::HashMap;
use std::sync::Arc;

/// Options for [`PatternRedactor::redact`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedactionOptions {
    pub min_confidence: f64,
    pub max_matches: usize,
    /// Leave showstopper spans untouched (they are blocked upstream instead)
    pub exclude_showstoppers: bool,
}

impl Default for RedactionOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            max_matches: 100,
            exclude_showstoppers: false,
        }
    }
}

impl RedactionOptions {
    fn detection(&self) -> DetectionOptions {
        DetectionOptions {
            min_confidence: self.min_confidence,
            max_matches: self.max_matches,
        }
    }
}

/// Default placeholder for a data type: `[EMAIL_REDACTED]`
pub fn default_placeholder(data_type: &str) -> String {
    format!("[{}_REDACTED]", data_type.to_uppercase())
}

/// Detector-driven redactor
pub struct PatternRedactor {
    detector: Arc<dyn PiiDetector>,
    replacements: Arc<dyn ReplacementStore>,
}

impl PatternRedactor {
    pub fn new(detector: Arc<dyn PiiDetector>, replacements: Arc<dyn ReplacementStore>) -> Self {
        Self {
            detector,
            replacements,
        }
    }

    /// Detect and redact PII spans in `text`
    ///
    /// Detection errors propagate. A replacement-table failure only changes
    /// placeholder text: defaults are used instead.
    pub async fn redact(&self, text: &str, options: RedactionOptions) -> Result<RedactionResult> {
        let detection = self.detector.detect(text, options.detection()).await?;

        let mut matches = detection.matches;
        if options.exclude_showstoppers {
            matches.retain(|m| !m.is_showstopper());
        }
        if matches.is_empty() {
            return Ok(RedactionResult {
                redacted_text: text.to_string(),
                mappings: Vec::new(),
                redaction_count: 0,
            });
        }

        let table = self.load_replacements().await;
        let result = redact_matches(text, &matches, &table);

        tracing::debug!(
            detector = self.detector.name(),
            redactions = result.redaction_count,
            "Pattern redaction applied"
        );
        Ok(result)
    }

    /// Restore placeholders to their original values
    pub fn reverse(&self, text: &str, mappings: &[PatternRedactionMapping]) -> ReversalResult {
        reverse_redactions(text, mappings)
    }

    async fn load_replacements(&self) -> HashMap<String, String> {
        match self.replacements.fetch_replacements().await {
            Ok(rows) => rows
                .into_iter()
                .filter(|r| r.is_active)
                .map(|r| (r.data_type, r.replacement))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Replacement table unavailable, using default placeholders"
                );
                HashMap::new()
            }
        }
    }
}

/// Replace `matches` in `text` using `table` (data type → placeholder)
///
/// Spans that are out of bounds, split a UTF-8 character, or overlap a span
/// already replaced are skipped.
pub fn redact_matches(
    text: &str,
    matches: &[PiiMatch],
    table: &HashMap<String, String>,
) -> RedactionResult {
    let mut ordered: Vec<&PiiMatch> = matches.iter().collect();
    ordered.sort_by(|a, b| b.start_index.cmp(&a.start_index));

    let mut counters: HashMap<&str, usize> = HashMap::new();
    let mut mappings: Vec<PatternRedactionMapping> = Vec::with_capacity(ordered.len());
    let mut lowest_start = text.len();

    for m in ordered {
        let valid = m.start_index < m.end_index
            && m.end_index <= text.len()
            && text.is_char_boundary(m.start_index)
            && text.is_char_boundary(m.end_index);
        if !valid || m.end_index > lowest_start {
            tracing::warn!(
                data_type = %m.data_type,
                start = m.start_index,
                end = m.end_index,
                "Skipping unusable redaction span"
            );
            continue;
        }

        let count = counters.entry(m.data_type.as_str()).or_insert(0);
        *count += 1;

        let base = table
            .get(&m.data_type)
            .cloned()
            .unwrap_or_else(|| default_placeholder(&m.data_type));
        let redacted_value = if *count > 1 {
            format!("{}_{}", base, count)
        } else {
            base
        };

        mappings.push(PatternRedactionMapping {
            original_value: text[m.start_index..m.end_index].to_string(),
            redacted_value,
            data_type: m.data_type.clone(),
            start_index: m.start_index,
            end_index: m.end_index,
            pattern_name: m.pattern_name.clone(),
        });
        lowest_start = m.start_index;
    }

    mappings.reverse();

    let mut redacted_text = String::with_capacity(text.len());
    let mut cursor = 0;
    for mapping in &mappings {
        redacted_text.push_str(&text[cursor..mapping.start_index]);
        redacted_text.push_str(&mapping.redacted_value);
        cursor = mapping.end_index;
    }
    redacted_text.push_str(&text[cursor..]);

    RedactionResult {
        redacted_text,
        redaction_count: mappings.len(),
        mappings,
    }
}

/// Swap placeholders back, longest placeholder first
///
/// `[EMAIL_REDACTED]_10` must be restored before `[EMAIL_REDACTED]_1` can
/// match its prefix.
pub fn reverse_redactions(text: &str, mappings: &[PatternRedactionMapping]) -> ReversalResult {
    let mut ordered: Vec<&PatternRedactionMapping> = mappings.iter().collect();
    ordered.sort_by(|a, b| b.redacted_value.len().cmp(&a.redacted_value.len()));

    let mut current = text.to_string();
    let mut reversal_count = 0;

    for mapping in ordered {
        if mapping.redacted_value.is_empty() {
            continue;
        }
        let regex = match Regex::new(&regex::escape(&mapping.redacted_value)) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(
                    data_type = %mapping.data_type,
                    error = %e,
                    "Skipping placeholder that cannot be matched"
                );
                continue;
            }
        };

        let found = regex.find_iter(&current).count();
        if found == 0 {
            continue;
        }
        current = regex
            .replace_all(&current, NoExpand(&mapping.original_value))
            .into_owned();
        reversal_count += found;
    }

    ReversalResult {
        original_text: current,
        reversal_count,
    }
}
