//! Generation orchestrator
//!
//! Runs one request end to end:
//!
//! 1. route the raw prompt (blocked decisions stop here)
//! 2. audit the decision
//! 3. local targets and `quick` requests are forwarded unchanged
//! 4. otherwise pseudonymize, then redact, then call the provider
//! 5. undo redaction, then pseudonymization, on a non-empty reply
//!
//! If a protection stage fails the request fails; the provider never sees
//! partially protected text.

use crate::audit::{AuditLogger, AuditSink};
use crate::config::{
    FeatureFlags, PipelineConfig, PolicyConfig, PolicyConfigProvider, StaticFeatureFlags,
    StaticPolicyProvider,
};
use crate::context::RequestContext;
use crate::detector::{DetectionOptions, PiiDetector, RegexDetector};
use crate::error::{PipelineError, Result};
use crate::provider::{GenerationParams, ModelProvider, ProviderRequest, ProviderTiming, TokenUsage};
use crate::pseudonymizer::{DictionaryCache, DictionaryPseudonymizer};
use crate::redactor::{PatternRedactor, RedactionOptions};
use crate::routing::{FallbackModelStore, LocalModelRegistry, MemoryModelRegistry, RouteOptions, RoutingEngine};
use crate::stage::{ProtectedText, ProtectionPipeline, RedactionStage};
use crate::store::{DictionaryStore, MemoryStore, ReplacementStore};
use crate::types::{
    PiiProcessingMetadata, ProcessingFlow, PseudonymizationRecord, RedactionRecord,
    ReversalRecord, RouteKind, RoutingDecision, UserSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Per-request generation options
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Skip PII processing entirely
    pub quick: bool,
    pub sovereign_mode: Option<bool>,
    pub params: GenerationParams,
}

impl GenerateOptions {
    pub fn with_target(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }

    pub fn quick(mut self) -> Self {
        self.quick = true;
        self
    }

    pub fn with_sovereign_mode(mut self, sovereign_mode: bool) -> Self {
        self.sovereign_mode = Some(sovereign_mode);
        self
    }
}

/// Where and how a response was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub is_local: bool,
    pub route: RouteKind,
    pub complexity_score: u8,
    pub fallback_used: bool,
    pub usage: TokenUsage,
    pub timing: ProviderTiming,
}

/// A served request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub content: String,
    pub metadata: ResponseMetadata,
    pub pii_metadata: PiiProcessingMetadata,
}

/// Result of [`GenerationOrchestrator::generate_response`]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed(GenerationResponse),
    /// Refused or unservable; carries the decision with its blocking reason
    Blocked(RoutingDecision),
}

impl GenerationOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    /// Response content, if the request was served
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Completed(response) => Some(&response.content),
            Self::Blocked(_) => None,
        }
    }
}

/// Sequences routing, protection, the provider call and reversal
pub struct GenerationOrchestrator {
    engine: Arc<RoutingEngine>,
    pipeline: ProtectionPipeline,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    default_provider: Option<Arc<dyn ModelProvider>>,
    audit: AuditLogger,
}

impl GenerationOrchestrator {
    pub fn new(engine: Arc<RoutingEngine>, pipeline: ProtectionPipeline, audit: AuditLogger) -> Self {
        Self {
            engine,
            pipeline,
            providers: HashMap::new(),
            default_provider: None,
            audit,
        }
    }

    /// Start a builder from configuration
    pub fn builder(config: PipelineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Register the backend serving `name`
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Backend for providers with no dedicated registration
    pub fn with_default_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.default_provider = Some(provider);
        self
    }

    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }

    /// Route, protect, generate and restore one request
    pub async fn generate_response(
        &self,
        ctx: &RequestContext,
        system_prompt: &str,
        user_message: &str,
        options: GenerateOptions,
    ) -> Result<GenerationOutcome> {
        ctx.check()?;

        let route_options = RouteOptions {
            provider: options.provider.clone(),
            model: options.model.clone(),
            sovereign_mode: options.sovereign_mode,
            pii_metadata: None,
        };
        let decision = ctx
            .run("routing", self.engine.determine_route(user_message, route_options))
            .await?;

        let policy = self.policy_for_audit().await;
        self.audit
            .log_decision(ctx, user_message, &decision, &policy)
            .await;

        if decision.is_blocked() {
            return Ok(GenerationOutcome::Blocked(decision));
        }

        let provider = self.provider_for(&decision.provider)?;
        let mut metadata = decision
            .pii_metadata
            .clone()
            .unwrap_or_else(|| PiiProcessingMetadata::new(ProcessingFlow::AllowedLocal));

        let bypass = decision.is_local || options.quick;
        let protected = if bypass {
            tracing::debug!(
                request_id = %ctx.request_id,
                provider = %decision.provider,
                quick = options.quick,
                "Skipping PII processing"
            );
            metadata.processing_flow = ProcessingFlow::AllowedLocal;
            None
        } else {
            let protected = self.pipeline.protect(ctx, user_message).await?;
            record_protection(&mut metadata, &protected);
            Some(protected)
        };

        let request = ProviderRequest {
            provider: decision.provider.clone(),
            model: decision.model.clone(),
            system_prompt: system_prompt.to_string(),
            user_message: protected
                .as_ref()
                .map(|p| p.text.clone())
                .unwrap_or_else(|| user_message.to_string()),
            params: options.params,
        };
        let response = ctx.run("provider", provider.generate(&request)).await?;

        let content = match protected {
            Some(ref protected) if !response.content.is_empty() => {
                let restored = self.pipeline.restore(&response.content, protected);
                metadata.reversal = Some(restored.reversal);
                restored.text
            }
            Some(_) => {
                metadata.reversal = Some(ReversalRecord::default());
                response.content
            }
            None => response.content,
        };

        metadata.user_summary = Some(user_summary(&metadata, &decision, bypass));

        tracing::info!(
            request_id = %ctx.request_id,
            provider = %decision.provider,
            model = %decision.model,
            protected_items = metadata.protected_items(),
            "Response generated"
        );

        Ok(GenerationOutcome::Completed(GenerationResponse {
            content,
            metadata: ResponseMetadata {
                request_id: ctx.request_id.clone(),
                provider: decision.provider,
                model: decision.model,
                is_local: decision.is_local,
                route: decision.route,
                complexity_score: decision.complexity_score,
                fallback_used: decision.fallback_used,
                usage: response.usage,
                timing: response.timing,
            },
            pii_metadata: metadata,
        }))
    }

    async fn policy_for_audit(&self) -> PolicyConfig {
        match self.engine.current_policy().await {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(error = %e, "Policy unavailable for audit, using defaults");
                PolicyConfig::default()
            }
        }
    }

    fn provider_for(&self, name: &str) -> Result<Arc<dyn ModelProvider>> {
        self.providers
            .get(name)
            .or(self.default_provider.as_ref())
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedProvider(name.to_string()))
    }
}

fn record_protection(metadata: &mut PiiProcessingMetadata, protected: &ProtectedText) {
    let dictionary = protected.dictionary_mappings();
    let patterns = protected.pattern_mappings();

    metadata.processing_flow = ProcessingFlow::Pseudonymized {
        dictionary_mappings: dictionary.len(),
        pattern_redactions: patterns.len(),
    };
    metadata.pseudonymization = Some(PseudonymizationRecord {
        occurrences_replaced: dictionary.iter().map(|m| m.occurrences.len()).sum(),
        mappings: dictionary,
    });
    metadata.pattern_redaction = Some(RedactionRecord {
        redaction_count: patterns.len(),
        mappings: patterns,
    });
}

fn user_summary(metadata: &PiiProcessingMetadata, decision: &RoutingDecision, bypass: bool) -> UserSummary {
    let mut data_types: BTreeSet<String> = BTreeSet::new();
    if let Some(ref record) = metadata.pseudonymization {
        data_types.extend(record.mappings.iter().map(|m| m.data_type.clone()));
    }
    if let Some(ref record) = metadata.pattern_redaction {
        data_types.extend(record.mappings.iter().map(|m| m.data_type.clone()));
    }
    let protected_items = metadata.protected_items();

    let message = if decision.is_local {
        "Processed on a local model; no data left your infrastructure".to_string()
    } else if bypass {
        format!("Sent to {} without PII processing", decision.provider)
    } else if protected_items == 0 {
        format!("No sensitive data found before sending to {}", decision.provider)
    } else {
        format!(
            "Protected {} sensitive item{} before sending to {}",
            protected_items,
            if protected_items == 1 { "" } else { "s" },
            decision.provider
        )
    };

    UserSummary {
        message,
        protected_items,
        data_types: data_types.into_iter().collect(),
    }
}

/// Assembles an orchestrator from configuration and collaborators
///
/// Collaborators left unset fall back to in-memory implementations: the
/// bundled regex detector, empty dictionary and replacement tables, and an
/// empty model registry (which routes to the emergency model).
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    detector: Option<Arc<dyn PiiDetector>>,
    dictionary: Option<Arc<dyn DictionaryStore>>,
    replacements: Option<Arc<dyn ReplacementStore>>,
    registry: Option<Arc<dyn LocalModelRegistry>>,
    fallback: Option<Arc<dyn FallbackModelStore>>,
    flags: Option<Arc<dyn FeatureFlags>>,
    policy: Option<Arc<dyn PolicyConfigProvider>>,
    cache: Option<Arc<DictionaryCache>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    default_provider: Option<Arc<dyn ModelProvider>>,
}

impl OrchestratorBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            detector: None,
            dictionary: None,
            replacements: None,
            registry: None,
            fallback: None,
            flags: None,
            policy: None,
            cache: None,
            audit_sink: None,
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    pub fn detector(mut self, detector: Arc<dyn PiiDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn dictionary_store(mut self, store: Arc<dyn DictionaryStore>) -> Self {
        self.dictionary = Some(store);
        self
    }

    pub fn replacement_store(mut self, store: Arc<dyn ReplacementStore>) -> Self {
        self.replacements = Some(store);
        self
    }

    pub fn model_registry(mut self, registry: Arc<dyn LocalModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn fallback_store(mut self, store: Arc<dyn FallbackModelStore>) -> Self {
        self.fallback = Some(store);
        self
    }

    pub fn feature_flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn policy_provider(mut self, policy: Arc<dyn PolicyConfigProvider>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Share a dictionary cache across orchestrators
    pub fn dictionary_cache(mut self, cache: Arc<DictionaryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn default_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Validate configuration and wire everything together
    pub fn build(self) -> Result<GenerationOrchestrator> {
        self.config.validate()?;

        let detector: Arc<dyn PiiDetector> = match self.detector {
            Some(detector) => detector,
            None => Arc::new(RegexDetector::with_defaults()?),
        };
        let memory_store = Arc::new(MemoryStore::default());
        let dictionary: Arc<dyn DictionaryStore> =
            self.dictionary.unwrap_or_else(|| memory_store.clone() as Arc<dyn DictionaryStore>);
        let replacements: Arc<dyn ReplacementStore> =
            self.replacements.unwrap_or_else(|| memory_store.clone() as Arc<dyn ReplacementStore>);
        let memory_registry = Arc::new(MemoryModelRegistry::new());
        let registry: Arc<dyn LocalModelRegistry> =
            self.registry.unwrap_or_else(|| memory_registry.clone() as Arc<dyn LocalModelRegistry>);
        let fallback: Arc<dyn FallbackModelStore> =
            self.fallback.unwrap_or_else(|| memory_registry.clone() as Arc<dyn FallbackModelStore>);
        let flags: Arc<dyn FeatureFlags> = match self.flags {
            Some(flags) => flags,
            None => Arc::new(StaticFeatureFlags::new(self.config.flags.clone())),
        };
        let policy: Arc<dyn PolicyConfigProvider> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(StaticPolicyProvider::new(self.config.policy.clone())),
        };
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(DictionaryCache::new(Duration::from_secs(
                self.config.dictionary.cache_ttl_secs,
            )))
        });

        let engine = RoutingEngine::new(
            self.config.routing.clone(),
            detector.clone(),
            registry,
            fallback,
        )
        .with_flags(flags)
        .with_policy(policy)
        .with_detection_options(DetectionOptions {
            min_confidence: self.config.redaction.min_confidence,
            max_matches: self.config.redaction.max_matches,
        });

        let pseudonymizer = Arc::new(DictionaryPseudonymizer::new(dictionary, cache));
        let redactor = Arc::new(PatternRedactor::new(detector, replacements));
        let pipeline = ProtectionPipeline::new()
            .with_stage(pseudonymizer)
            .with_stage(Arc::new(RedactionStage::new(
                redactor,
                RedactionOptions {
                    min_confidence: self.config.redaction.min_confidence,
                    max_matches: self.config.redaction.max_matches,
                    exclude_showstoppers: true,
                },
            )));

        let audit = match self.audit_sink {
            Some(sink) => AuditLogger::new(sink),
            None => AuditLogger::default(),
        };

        tracing::info!(
            enforced = self.config.policy.enforced,
            smart_routing = self.config.flags.smart_routing,
            stages = pipeline.len(),
            "Generation orchestrator initialized"
        );

        let mut orchestrator = GenerationOrchestrator::new(Arc::new(engine), pipeline, audit);
        orchestrator.providers = self.providers;
        orchestrator.default_provider = self.default_provider;
        Ok(orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::provider::memory::MemoryProvider;
    use crate::routing::{LocalModel, ModelStatus};
    use crate::store::DictionaryEntry;
    use crate::types::{BlockingReason, ModelTier};

    struct Harness {
        orchestrator: GenerationOrchestrator,
        provider: Arc<MemoryProvider>,
        store: Arc<MemoryStore>,
        registry: Arc<MemoryModelRegistry>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness_with(config: PipelineConfig, provider: MemoryProvider) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryStore::new(
            vec![DictionaryEntry::new("Jane Roe", "PERSON_4", "person")],
            Vec::new(),
        ));
        let registry = Arc::new(MemoryModelRegistry::new().with_model(
            ModelTier::UltraFast,
            LocalModel::new("llama3.2:3b", ModelStatus::Loaded),
        ));
        let audit = Arc::new(MemoryAuditSink::default());

        let orchestrator = GenerationOrchestrator::builder(config)
            .dictionary_store(store.clone())
            .replacement_store(store.clone())
            .model_registry(registry.clone())
            .fallback_store(registry.clone())
            .audit_sink(audit.clone())
            .default_provider(provider.clone())
            .build()
            .unwrap();

        Harness {
            orchestrator,
            provider,
            store,
            registry,
            audit,
        }
    }

    fn harness() -> Harness {
        harness_with(PipelineConfig::default(), MemoryProvider::echo())
    }

    fn completed(outcome: GenerationOutcome) -> GenerationResponse {
        match outcome {
            GenerationOutcome::Completed(response) => response,
            GenerationOutcome::Blocked(decision) => panic!("unexpected block: {:?}", decision),
        }
    }

    #[tokio::test]
    async fn test_external_request_is_protected_and_restored() {
        let h = harness();
        let message = "Write to Jane Roe at jane@roe.io";

        let outcome = h
            .orchestrator
            .generate_response(
                &RequestContext::new(),
                "be brief",
                message,
                GenerateOptions::default().with_target("openai", "gpt-4o"),
            )
            .await
            .unwrap();
        let response = completed(outcome);

        let sent = h.provider.last_request().unwrap();
        assert_eq!(sent.user_message, "Write to PERSON_4 at [EMAIL_REDACTED]");
        assert_eq!(sent.system_prompt, "be brief");
        assert_eq!(response.content, message);

        let pii = &response.pii_metadata;
        assert_eq!(
            pii.processing_flow,
            ProcessingFlow::Pseudonymized {
                dictionary_mappings: 1,
                pattern_redactions: 1
            }
        );
        let reversal = pii.reversal.clone().unwrap();
        assert_eq!(reversal.dictionary_reversals, 1);
        assert_eq!(reversal.pattern_reversals, 1);
        let summary = pii.user_summary.clone().unwrap();
        assert_eq!(summary.protected_items, 2);
        assert_eq!(summary.data_types, vec!["email", "person"]);
        assert_eq!(response.metadata.provider, "openai");
        assert_eq!(h.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_local_route_forwards_raw_text() {
        let h = harness();
        let message = "Hi Jane Roe";

        let response = completed(
            h.orchestrator
                .generate_response(&RequestContext::new(), "", message, GenerateOptions::default())
                .await
                .unwrap(),
        );

        assert_eq!(h.provider.last_request().unwrap().user_message, message);
        assert!(response.metadata.is_local);
        assert_eq!(response.pii_metadata.processing_flow, ProcessingFlow::AllowedLocal);
        assert!(response.pii_metadata.pseudonymization.is_none());
    }

    #[tokio::test]
    async fn test_quick_bypasses_processing() {
        let h = harness();
        let message = "Ping Jane Roe";
        completed(
            h.orchestrator
                .generate_response(
                    &RequestContext::new(),
                    "",
                    message,
                    GenerateOptions::default().with_target("openai", "gpt-4o").quick(),
                )
                .await
                .unwrap(),
        );
        assert_eq!(h.provider.last_request().unwrap().user_message, message);
        assert_eq!(h.store.dictionary_fetches(), 0);
    }

    #[tokio::test]
    async fn test_blocked_request_never_reaches_provider() {
        let h = harness();
        let outcome = h
            .orchestrator
            .generate_response(
                &RequestContext::new(),
                "",
                "SSN 123-45-6789",
                GenerateOptions::default().with_target("openai", "gpt-4o"),
            )
            .await
            .unwrap();

        match outcome {
            GenerationOutcome::Blocked(decision) => {
                assert_eq!(decision.blocking_reason, Some(BlockingReason::ShowstopperPii));
            }
            other => panic!("expected block, got {:?}", other),
        }
        assert!(h.provider.requests().is_empty());
        assert_eq!(h.store.dictionary_fetches(), 0);
        assert_eq!(h.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_route_blocks_showstopper() {
        let config = PipelineConfig {
            flags: crate::config::FlagsConfig {
                smart_routing: false,
                sovereign_mode: false,
            },
            routing: crate::config::RoutingConfig {
                legacy: crate::config::ProviderTarget::new("openai", "gpt-4o"),
                ..Default::default()
            },
            ..Default::default()
        };
        let h = harness_with(config, MemoryProvider::echo());

        let outcome = h
            .orchestrator
            .generate_response(
                &RequestContext::new(),
                "",
                "My SSN is 123-45-6789",
                GenerateOptions::default(),
            )
            .await
            .unwrap();
        match outcome {
            GenerationOutcome::Blocked(decision) => {
                assert_eq!(decision.route, crate::types::RouteKind::Blocked);
                assert_eq!(decision.blocking_reason, Some(BlockingReason::ShowstopperPii));
            }
            other => panic!("expected block, got {:?}", other),
        }
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_sovereign_error_is_blocked_outcome() {
        let config = PipelineConfig {
            policy: PolicyConfig {
                enforced: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let h = harness_with(config, MemoryProvider::echo());
        h.registry.set_offline(true);

        let outcome = h
            .orchestrator
            .generate_response(&RequestContext::new(), "", "Hi", GenerateOptions::default())
            .await
            .unwrap();
        assert!(outcome.is_blocked());
        assert!(outcome.content().is_none());
    }

    #[tokio::test]
    async fn test_dictionary_failure_fails_request() {
        let h = harness();
        h.store.set_unavailable(true);

        let err = h
            .orchestrator
            .generate_response(
                &RequestContext::new(),
                "",
                "Hi Jane Roe",
                GenerateOptions::default().with_target("openai", "gpt-4o"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Dictionary(_)));
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_response_skips_reversal() {
        let h = harness_with(PipelineConfig::default(), MemoryProvider::reply(""));
        let response = completed(
            h.orchestrator
                .generate_response(
                    &RequestContext::new(),
                    "",
                    "Hi Jane Roe",
                    GenerateOptions::default().with_target("openai", "gpt-4o"),
                )
                .await
                .unwrap(),
        );
        assert_eq!(response.content, "");
        assert_eq!(response.pii_metadata.reversal, Some(ReversalRecord::default()));
    }

    #[tokio::test]
    async fn test_cancelled_request_does_nothing() {
        let h = harness();
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = h
            .orchestrator
            .generate_response(&ctx, "", "Hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(h.audit.is_empty());
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_provider_deadline() {
        let h = harness_with(
            PipelineConfig::default(),
            MemoryProvider::echo().with_delay(Duration::from_secs(5)),
        );
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));

        let err = h
            .orchestrator
            .generate_response(&ctx, "", "Hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_error() {
        let engine = harness().orchestrator.engine;
        let orchestrator =
            GenerationOrchestrator::new(engine, ProtectionPipeline::new(), AuditLogger::default());

        let err = orchestrator
            .generate_response(&RequestContext::new(), "", "Hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedProvider(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_by_builder() {
        let mut config = PipelineConfig::default();
        config.redaction.min_confidence = 2.0;
        assert!(GenerationOrchestrator::builder(config).build().is_err());
    }
}
