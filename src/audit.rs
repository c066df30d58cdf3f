//! Routing audit trail
//!
//! Every routing decision produces an [`AuditRecord`] unless the policy's
//! audit level is `none`. Records identify the prompt by a truncated
//! SHA-256 hash and never contain the prompt itself. Policy violations and
//! warnings are also logged through `tracing` regardless of level.
//!
//! Auditing is best-effort: sink failures are logged and dropped.

use crate::config::{AuditLevel, PolicyConfig};
use crate::context::RequestContext;
use crate::error::{PipelineError, Result};
use crate::types::{BlockingReason, DetectionSummary, ModelTier, RouteKind, RoutingDecision};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Hex characters of the prompt hash kept in records
pub const PROMPT_HASH_LEN: usize = 16;

/// First 16 hex characters of the SHA-256 of `prompt`
pub fn prompt_hash(prompt: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(prompt.as_bytes()));
    hex.truncate(PROMPT_HASH_LEN);
    hex
}

/// Decision fields copied into an audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDecision {
    pub provider: String,
    pub model: String,
    pub is_local: bool,
    pub route: RouteKind,
    pub route_to_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<BlockingReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_tier: Option<ModelTier>,
    pub fallback_used: bool,
    pub complexity_score: u8,
}

impl From<&RoutingDecision> for AuditDecision {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            is_local: decision.is_local,
            route: decision.route,
            route_to_agent: decision.route_to_agent,
            blocking_reason: decision.blocking_reason,
            model_tier: decision.model_tier,
            fallback_used: decision.fallback_used,
            complexity_score: decision.complexity_score,
        }
    }
}

/// A single audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub level: AuditLevel,
    pub prompt_hash: String,
    pub word_count: usize,
    pub char_count: usize,
    pub sovereign_mode_enforced: bool,
    pub sovereign_mode_violation: bool,
    pub decision: AuditDecision,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    /// Present at `full` level only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_path: Option<Vec<String>>,
    /// Present at `full` level only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionSummary>,
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Emits records as JSON on the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| PipelineError::Audit(format!("Failed to serialize record: {}", e)))?;
        tracing::info!(
            target: "audit",
            id = %record.id,
            request_id = %record.request_id,
            prompt_hash = %record.prompt_hash,
            record = %json,
            "Routing decision"
        );
        Ok(())
    }
}

/// Bounded in-memory sink, oldest records evicted first
#[derive(Debug)]
pub struct MemoryAuditSink {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    failing: AtomicBool,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            failing: AtomicBool::new(false),
        }
    }

    /// Snapshot of retained records, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject every write while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::Audit("memory sink rejecting writes".to_string()));
        }
        if self.capacity == 0 {
            return Ok(());
        }
        let mut records = self
            .records
            .lock()
            .map_err(|e| PipelineError::Audit(format!("Failed to acquire sink lock: {}", e)))?;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

/// Builds audit records and hands them to a sink
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Build the record for `decision` at `level`; `None` at level `none`
    pub fn build_record(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        decision: &RoutingDecision,
        level: AuditLevel,
    ) -> Option<AuditRecord> {
        if level == AuditLevel::None {
            return None;
        }
        let full = level == AuditLevel::Full;

        Some(AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            request_id: ctx.request_id.clone(),
            user_id: ctx.user_id.clone(),
            level,
            prompt_hash: prompt_hash(prompt),
            word_count: prompt.split_whitespace().count(),
            char_count: prompt.chars().count(),
            sovereign_mode_enforced: decision.sovereign_mode_enforced.unwrap_or(false),
            sovereign_mode_violation: decision.sovereign_mode_violation.unwrap_or(false),
            decision: AuditDecision::from(decision),
            violations: decision.violations.clone(),
            warnings: decision.warnings.clone(),
            reasoning_path: full.then(|| decision.reasoning_path.clone()),
            detection: if full {
                decision
                    .pii_metadata
                    .as_ref()
                    .and_then(|m| m.detection.clone())
            } else {
                None
            },
        })
    }

    /// Audit one routing decision; never fails
    ///
    /// A cancelled request writes nothing.
    pub async fn log_decision(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        decision: &RoutingDecision,
        policy: &PolicyConfig,
    ) {
        if ctx.is_cancelled() {
            return;
        }

        for violation in &decision.violations {
            tracing::warn!(
                request_id = %ctx.request_id,
                violation = %violation,
                "Routing policy violation"
            );
        }
        for warning in &decision.warnings {
            tracing::warn!(request_id = %ctx.request_id, warning = %warning, "Routing warning");
        }

        let Some(record) = self.build_record(ctx, prompt, decision, policy.audit_level) else {
            return;
        };

        if let Err(e) = self.sink.record(&record).await {
            tracing::warn!(
                request_id = %ctx.request_id,
                error = %e,
                "Failed to write audit record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PiiProcessingMetadata, ProcessingFlow};

    fn decision() -> RoutingDecision {
        let mut metadata = PiiProcessingMetadata::new(ProcessingFlow::AllowedLocal);
        metadata.detection = Some(DetectionSummary::default());
        RoutingDecision {
            provider: "ollama".into(),
            model: "llama3.2:3b".into(),
            is_local: true,
            model_tier: Some(ModelTier::UltraFast),
            fallback_used: false,
            complexity_score: 3,
            reasoning_path: vec!["complexity: simple".into()],
            sovereign_mode_enforced: Some(true),
            sovereign_mode_violation: Some(true),
            pii_metadata: Some(metadata),
            route_to_agent: true,
            blocking_reason: None,
            route: RouteKind::Local,
            violations: vec!["sovereign mode forbids external provider 'openai'".into()],
            warnings: Vec::new(),
        }
    }

    fn policy(level: AuditLevel) -> PolicyConfig {
        PolicyConfig {
            audit_level: level,
            ..Default::default()
        }
    }

    #[test]
    fn test_prompt_hash() {
        let hash = prompt_hash("hello");
        assert_eq!(hash.len(), PROMPT_HASH_LEN);
        assert_eq!(hash, "2cf24dba5fb0a30e");
        assert_eq!(prompt_hash(""), "e3b0c44298fc1c14");
    }

    #[tokio::test]
    async fn test_basic_record_has_no_prompt_or_trace() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = AuditLogger::new(sink.clone());
        let prompt = "my secret plan is here";

        logger
            .log_decision(&RequestContext::new(), prompt, &decision(), &policy(AuditLevel::Basic))
            .await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.prompt_hash, prompt_hash(prompt));
        assert_eq!(record.word_count, 5);
        assert_eq!(record.char_count, prompt.len());
        assert!(record.sovereign_mode_violation);
        assert!(record.reasoning_path.is_none());
        assert!(record.detection.is_none());

        let json = serde_json::to_string(record).unwrap();
        assert!(!json.contains("secret plan"));
    }

    #[tokio::test]
    async fn test_full_record_includes_trace() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = AuditLogger::new(sink.clone());
        logger
            .log_decision(&RequestContext::new(), "hi", &decision(), &policy(AuditLevel::Full))
            .await;

        let record = &sink.records()[0];
        assert_eq!(record.reasoning_path.as_ref().map(Vec::len), Some(1));
        assert!(record.detection.is_some());
    }

    #[tokio::test]
    async fn test_level_none_writes_nothing() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = AuditLogger::new(sink.clone());
        logger
            .log_decision(&RequestContext::new(), "hi", &decision(), &policy(AuditLevel::None))
            .await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(MemoryAuditSink::default());
        sink.set_failing(true);
        let logger = AuditLogger::new(sink.clone());
        logger
            .log_decision(&RequestContext::new(), "hi", &decision(), &policy(AuditLevel::Basic))
            .await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_request_writes_nothing() {
        let sink = Arc::new(MemoryAuditSink::default());
        let logger = AuditLogger::new(sink.clone());
        let ctx = RequestContext::new();
        ctx.cancel();
        logger
            .log_decision(&ctx, "hi", &decision(), &policy(AuditLevel::Full))
            .await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_memory_sink_is_bounded() {
        let sink = Arc::new(MemoryAuditSink::new(2));
        let logger = AuditLogger::new(sink.clone());
        let ctx = RequestContext::new();
        for prompt in ["a", "b", "c"] {
            logger
                .log_decision(&ctx, prompt, &decision(), &policy(AuditLevel::Basic))
                .await;
        }
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prompt_hash, prompt_hash("b"));
    }

    #[tokio::test]
    async fn test_zero_capacity_sink_keeps_nothing() {
        let sink = Arc::new(MemoryAuditSink::new(0));
        let logger = AuditLogger::new(sink.clone());
        logger
            .log_decision(&RequestContext::new(), "hi", &decision(), &policy(AuditLevel::Basic))
            .await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        let logger = AuditLogger::default();
        let record = logger
            .build_record(&RequestContext::new(), "hi", &decision(), AuditLevel::Basic)
            .unwrap();
        assert!(TracingAuditSink.record(&record).await.is_ok());
    }
}
