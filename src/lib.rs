//! # a3s-privacy-router
//!
//! PII-safe request pipeline for LLM calls in the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-privacy-router` sits between a caller and its model providers. Each
//! request is routed by prompt complexity and privacy policy, and anything
//! sent to an external provider is first stripped of known and detected PII
//! through reversible transformations that are undone on the response.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_privacy_router::{GenerateOptions, GenerationOrchestrator, PipelineConfig, RequestContext};
//! use a3s_privacy_router::provider::memory::MemoryProvider;
//!
//! # async fn example() -> a3s_privacy_router::Result<()> {
//! let orchestrator = GenerationOrchestrator::builder(PipelineConfig::default())
//!     .default_provider(Arc::new(MemoryProvider::echo()))
//!     .build()?;
//!
//! let outcome = orchestrator
//!     .generate_response(
//!         &RequestContext::new(),
//!         "You are a helpful assistant",
//!         "Email jane@example.com the meeting notes",
//!         GenerateOptions::default().with_target("anthropic", "claude-3-5-haiku"),
//!     )
//!     .await?;
//!
//! println!("{:?}", outcome.content());
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! - **DictionaryPseudonymizer**: scoped, case-insensitive exact-value aliases
//! - **PatternRedactor**: detector-driven numbered placeholders
//! - **RoutingEngine**: complexity tiers, sovereign mode, showstopper handling
//! - **AuditLogger**: hash-only audit trail of routing decisions
//! - **GenerationOrchestrator**: sequences the above around the provider call
//!
//! ## Architecture
//!
//! - **ProtectionStage** trait: reversible transformation, chained by
//!   `ProtectionPipeline` and undone in inverse order
//! - **PiiDetector**, **DictionaryStore**, **ReplacementStore**,
//!   **LocalModelRegistry**, **ModelProvider** traits: pluggable collaborators
//! - **RoutingDecision**: blocked outcomes are values, not errors

pub mod audit;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod pseudonymizer;
pub mod redactor;
pub mod routing;
pub mod stage;
pub mod store;
pub mod types;

// Re-export core types
pub use audit::{AuditLogger, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{
    AuditLevel, FeatureFlag, FeatureFlags, PipelineConfig, PolicyConfig, PolicyConfigProvider,
    RoutingMode, StaticFeatureFlags, StaticPolicyProvider,
};
pub use context::{RequestContext, Scope};
pub use detector::{DetectionOptions, DetectionResult, PiiDetector, RegexDetector};
pub use error::{PipelineError, Result};
pub use orchestrator::{
    GenerateOptions, GenerationOrchestrator, GenerationOutcome, GenerationResponse,
    OrchestratorBuilder,
};
pub use provider::{ModelProvider, ProviderRequest, ProviderResponse};
pub use pseudonymizer::{DictionaryCache, DictionaryPseudonymizer};
pub use redactor::{PatternRedactor, RedactionOptions};
pub use routing::{RouteOptions, RoutingEngine};
pub use stage::{ProtectionPipeline, ProtectionStage};
pub use store::{DictionaryEntry, DictionaryStore, MemoryStore, ReplacementEntry, ReplacementStore};
pub use types::{
    BlockingReason, DictionaryPseudonymMapping, ModelTier, PatternRedactionMapping, PiiMatch,
    PiiProcessingMetadata, ProcessingFlow, RouteKind, RoutingDecision, Severity,
};
