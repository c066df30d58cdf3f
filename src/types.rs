//! Core data model for the privacy pipeline
//!
//! All types use camelCase JSON serialization for wire compatibility with
//! the API layer that carries them to callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Current version of [`PiiProcessingMetadata`]
pub const METADATA_VERSION: u32 = 1;

/// Severity assigned to a detected PII span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must block the request (or force local routing) rather than be masked
    Showstopper,
    /// Sensitive; masked before leaving the process
    Warning,
    /// Low risk; masked when detected with enough confidence
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Showstopper => write!(f, "showstopper"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single PII span reported by a detector
///
/// `start_index`/`end_index` are UTF-8 byte offsets into the detected text,
/// half-open (`[start, end)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiMatch {
    /// Matched text
    pub value: String,
    /// Data type label (e.g. "email", "phone", "ssn")
    pub data_type: String,
    pub severity: Severity,
    /// Detector confidence, 0.0 to 1.0
    pub confidence: f64,
    pub start_index: usize,
    pub end_index: usize,
    /// Name of the pattern that produced the match
    pub pattern_name: String,
}

impl PiiMatch {
    /// Create a match with full confidence, named after its data type
    pub fn new(
        value: impl Into<String>,
        data_type: impl Into<String>,
        severity: Severity,
        start_index: usize,
        end_index: usize,
    ) -> Self {
        let data_type = data_type.into();
        Self {
            value: value.into(),
            pattern_name: data_type.clone(),
            data_type,
            severity,
            confidence: 1.0,
            start_index,
            end_index,
        }
    }

    /// Set the detector confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the originating pattern name
    pub fn with_pattern(mut self, pattern_name: impl Into<String>) -> Self {
        self.pattern_name = pattern_name.into();
        self
    }

    pub fn is_showstopper(&self) -> bool {
        self.severity == Severity::Showstopper
    }
}

/// A dictionary entry that matched the text at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryPseudonymMapping {
    /// Canonical value as stored in the dictionary
    pub original_value: String,
    pub pseudonym: String,
    pub data_type: String,
    pub category: String,
    /// Surface forms actually replaced, in text order
    ///
    /// Lets reversal of unmodified text restore the caller's original casing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<String>,
}

/// A detected span replaced by a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRedactionMapping {
    pub original_value: String,
    /// Placeholder, unique within one redaction call
    pub redacted_value: String,
    pub data_type: String,
    pub start_index: usize,
    pub end_index: usize,
    pub pattern_name: String,
}

/// Output of dictionary pseudonymization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PseudonymizationResult {
    pub pseudonymized_text: String,
    pub mappings: Vec<DictionaryPseudonymMapping>,
}

/// Output of pattern redaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
    pub redacted_text: String,
    pub mappings: Vec<PatternRedactionMapping>,
    pub redaction_count: usize,
}

/// Output of either reversal operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalResult {
    pub original_text: String,
    /// Total placeholder/pseudonym occurrences restored
    pub reversal_count: usize,
}

/// Named bucket of model capability/latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTier {
    UltraFast,
    General,
    FastThinking,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UltraFast => "ultra-fast",
            Self::General => "general",
            Self::FastThinking => "fast-thinking",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of the routing state machine that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// Caller's explicit provider/model, validated against policy
    Explicit,
    /// Local model chosen for the tier
    Local,
    /// Showstopper PII forced onto a local model
    LocalBypass,
    /// No local model; configured external fallback used
    ExternalFallback,
    /// Routing feature flag off
    Legacy,
    /// Refused to serve
    Blocked,
    /// Could not serve under the active policy
    Error,
}

/// Why a request was not routed to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    #[serde(rename = "showstopper-pii-detected")]
    ShowstopperPii,
    #[serde(rename = "no-local-models-available")]
    NoLocalModelsAvailable,
}

impl BlockingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShowstopperPii => "showstopper-pii-detected",
            Self::NoLocalModelsAvailable => "no-local-models-available",
        }
    }
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the routing policy engine for one request
///
/// Immutable once returned. Blocked and error outcomes are values, not
/// errors: `route_to_agent` is false and `blocking_reason` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub provider: String,
    pub model: String,
    pub is_local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_tier: Option<ModelTier>,
    pub fallback_used: bool,
    /// Tier score: 3 (simple), 6 (medium) or 9 (complex)
    pub complexity_score: u8,
    /// Human-readable trace of the state machine steps taken
    pub reasoning_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sovereign_mode_enforced: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sovereign_mode_violation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_metadata: Option<PiiProcessingMetadata>,
    pub route_to_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<BlockingReason>,
    pub route: RouteKind,
    /// Policy violations observed while routing
    #[serde(default)]
    pub violations: Vec<String>,
    /// Non-fatal policy warnings
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RoutingDecision {
    /// Whether the request was refused or could not be served
    pub fn is_blocked(&self) -> bool {
        !self.route_to_agent
    }
}

/// Aggregate of what the detector found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub total_matches: usize,
    pub showstopper_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    /// Distinct data types, sorted
    pub data_types: Vec<String>,
    pub processing_time_ms: u64,
    pub patterns_checked: usize,
}

impl DetectionSummary {
    /// Summarize detector output without retaining matched values
    pub fn from_matches(matches: &[PiiMatch], processing_time_ms: u64, patterns_checked: usize) -> Self {
        let count = |severity: Severity| matches.iter().filter(|m| m.severity == severity).count();
        let data_types: BTreeSet<&str> = matches.iter().map(|m| m.data_type.as_str()).collect();

        Self {
            total_matches: matches.len(),
            showstopper_count: count(Severity::Showstopper),
            warning_count: count(Severity::Warning),
            info_count: count(Severity::Info),
            data_types: data_types.into_iter().map(String::from).collect(),
            processing_time_ms,
            patterns_checked,
        }
    }

    pub fn has_showstoppers(&self) -> bool {
        self.showstopper_count > 0
    }
}

/// Policy outcome recorded alongside the detection summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecisionRecord {
    /// Whether the request may proceed to a model at all
    pub allowed: bool,
    /// Whether the request must stay on a local provider
    pub requires_local: bool,
    pub sovereign_mode: bool,
    pub reason: String,
}

/// Dictionary pseudonymization instructions and results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PseudonymizationRecord {
    pub mappings: Vec<DictionaryPseudonymMapping>,
    /// Total occurrences substituted across all mappings
    pub occurrences_replaced: usize,
}

/// Pattern redaction results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionRecord {
    pub mappings: Vec<PatternRedactionMapping>,
    pub redaction_count: usize,
}

/// Reversal results, filled in after the provider responds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalRecord {
    pub pattern_reversals: usize,
    pub dictionary_reversals: usize,
}

/// Message a caller can show the end user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub message: String,
    pub protected_items: usize,
    pub data_types: Vec<String>,
}

/// How a request's PII was handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ProcessingFlow {
    /// Refused because of showstopper PII
    ShowstopperBlocked { data_types: Vec<String> },
    /// Refused by routing policy
    PolicyBlocked { reason: String },
    /// Sent externally after reversible transformation
    Pseudonymized {
        dictionary_mappings: usize,
        pattern_redactions: usize,
    },
    /// Sent unchanged (local provider or quick bypass)
    AllowedLocal,
}

impl ProcessingFlow {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::ShowstopperBlocked { .. } | Self::PolicyBlocked { .. })
    }
}

/// Versioned record carried alongside a request through its lifecycle
///
/// Created by the routing step, updated as each protection stage completes,
/// and returned to the caller with the response. Never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiProcessingMetadata {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDecisionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudonymization: Option<PseudonymizationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_redaction: Option<RedactionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal: Option<ReversalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_summary: Option<UserSummary>,
    pub processing_flow: ProcessingFlow,
}

impl PiiProcessingMetadata {
    pub fn new(processing_flow: ProcessingFlow) -> Self {
        Self {
            version: METADATA_VERSION,
            detection: None,
            policy: None,
            pseudonymization: None,
            pattern_redaction: None,
            reversal: None,
            user_summary: None,
            processing_flow,
        }
    }

    /// Total values replaced by both protection stages
    pub fn protected_items(&self) -> usize {
        let dictionary = self
            .pseudonymization
            .as_ref()
            .map(|p| p.mappings.len())
            .unwrap_or(0);
        let patterns = self
            .pattern_redaction
            .as_ref()
            .map(|r| r.redaction_count)
            .unwrap_or(0);
        dictionary + patterns
    }
}
