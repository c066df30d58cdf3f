//! Ordered protection stages
//!
//! A [`ProtectionPipeline`] applies its stages first to last and undoes them
//! last to first, so redaction is always reversed before pseudonymization.

use crate::context::{RequestContext, Scope};
use crate::error::Result;
use crate::pseudonymizer::DictionaryPseudonymizer;
use crate::redactor::{PatternRedactor, RedactionOptions};
use crate::types::{
    DictionaryPseudonymMapping, PatternRedactionMapping, ReversalRecord, ReversalResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Mappings produced by one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRecord {
    Dictionary(Vec<DictionaryPseudonymMapping>),
    Pattern(Vec<PatternRedactionMapping>),
}

impl StageRecord {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Dictionary(mappings) => mappings.is_empty(),
            Self::Pattern(mappings) => mappings.is_empty(),
        }
    }
}

/// A reversible text transformation
#[async_trait]
pub trait ProtectionStage: Send + Sync {
    /// Stage name (used in logs and timeout errors)
    fn name(&self) -> &'static str;

    /// Transform `text`, returning the new text and what is needed to undo it
    async fn apply(&self, text: &str, scope: &Scope) -> Result<(String, StageRecord)>;

    /// Undo a previous [`apply`](Self::apply)
    fn reverse(&self, text: &str, record: &StageRecord) -> ReversalResult;
}

#[async_trait]
impl ProtectionStage for DictionaryPseudonymizer {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    async fn apply(&self, text: &str, scope: &Scope) -> Result<(String, StageRecord)> {
        let result = self.pseudonymize(text, scope).await?;
        Ok((
            result.pseudonymized_text,
            StageRecord::Dictionary(result.mappings),
        ))
    }

    fn reverse(&self, text: &str, record: &StageRecord) -> ReversalResult {
        match record {
            StageRecord::Dictionary(mappings) => DictionaryPseudonymizer::reverse(self, text, mappings),
            StageRecord::Pattern(_) => unchanged(text),
        }
    }
}

/// Pattern redaction with fixed options
pub struct RedactionStage {
    redactor: Arc<PatternRedactor>,
    options: RedactionOptions,
}

impl RedactionStage {
    pub fn new(redactor: Arc<PatternRedactor>, options: RedactionOptions) -> Self {
        Self { redactor, options }
    }
}

#[async_trait]
impl ProtectionStage for RedactionStage {
    fn name(&self) -> &'static str {
        "pattern-redaction"
    }

    async fn apply(&self, text: &str, _scope: &Scope) -> Result<(String, StageRecord)> {
        let result = self.redactor.redact(text, self.options).await?;
        Ok((result.redacted_text, StageRecord::Pattern(result.mappings)))
    }

    fn reverse(&self, text: &str, record: &StageRecord) -> ReversalResult {
        match record {
            StageRecord::Pattern(mappings) => self.redactor.reverse(text, mappings),
            StageRecord::Dictionary(_) => unchanged(text),
        }
    }
}

fn unchanged(text: &str) -> ReversalResult {
    ReversalResult {
        original_text: text.to_string(),
        reversal_count: 0,
    }
}

/// Text after every stage ran, plus each stage's record in application order
#[derive(Debug, Clone, Default)]
pub struct ProtectedText {
    pub text: String,
    pub records: Vec<StageRecord>,
}

impl ProtectedText {
    /// Dictionary mappings from all stages
    pub fn dictionary_mappings(&self) -> Vec<DictionaryPseudonymMapping> {
        self.records
            .iter()
            .filter_map(|r| match r {
                StageRecord::Dictionary(m) => Some(m.clone()),
                StageRecord::Pattern(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Pattern redaction mappings from all stages
    pub fn pattern_mappings(&self) -> Vec<PatternRedactionMapping> {
        self.records
            .iter()
            .filter_map(|r| match r {
                StageRecord::Pattern(m) => Some(m.clone()),
                StageRecord::Dictionary(_) => None,
            })
            .flatten()
            .collect()
    }
}

/// Text after every stage was undone
#[derive(Debug, Clone, Default)]
pub struct RestoredText {
    pub text: String,
    pub reversal: ReversalRecord,
}

/// Stages applied forward, undone in inverse order
#[derive(Clone, Default)]
pub struct ProtectionPipeline {
    stages: Vec<Arc<dyn ProtectionStage>>,
}

impl ProtectionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; it runs after every stage already added
    pub fn with_stage(mut self, stage: Arc<dyn ProtectionStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order
    ///
    /// Any stage failure (including cancellation) fails the whole call; no
    /// partially protected text is returned.
    pub async fn protect(&self, ctx: &RequestContext, text: &str) -> Result<ProtectedText> {
        let mut current = text.to_string();
        let mut records = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let (next, record) = ctx
                .run(stage.name(), stage.apply(&current, &ctx.scope))
                .await?;
            current = next;
            records.push(record);
        }

        Ok(ProtectedText {
            text: current,
            records,
        })
    }

    /// Undo `protected` on `text`, last stage first
    pub fn restore(&self, text: &str, protected: &ProtectedText) -> RestoredText {
        let mut current = text.to_string();
        let mut reversal = ReversalRecord::default();

        for (stage, record) in self.stages.iter().zip(&protected.records).rev() {
            if record.is_empty() {
                continue;
            }
            let result = stage.reverse(&current, record);
            match record {
                StageRecord::Dictionary(_) => reversal.dictionary_reversals += result.reversal_count,
                StageRecord::Pattern(_) => reversal.pattern_reversals += result.reversal_count,
            }
            current = result.original_text;
        }

        RestoredText {
            text: current,
            reversal,
        }
    }
}
