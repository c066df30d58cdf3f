//! Routing policy engine
//!
//! Decides, per request, which provider and model serve a prompt:
//!
//! 1. score complexity and pick a tier
//! 2. with smart routing disabled, use the legacy target and stop, unless
//!    showstopper PII would leave the host
//! 3. resolve sovereign mode and validate any explicit target against it
//! 4. a valid explicit target with no showstopper PII is used as-is
//! 5. showstopper PII is either bypassed to a local model or blocked
//! 6. otherwise a local model if the runtime is up, else the external
//!    fallback (or a terminal error decision under sovereign mode)

use super::complexity::{analyze_complexity, ComplexityAnalysis};
use super::registry::{select_local_model, FallbackModelStore, LocalModelRegistry, LocalSelection};
use crate::config::{
    FeatureFlag, FeatureFlags, FlagsConfig, PolicyConfig, PolicyConfigProvider, RoutingConfig,
    RoutingMode, StaticFeatureFlags, StaticPolicyProvider, LOCAL_PROVIDER,
};
use crate::detector::{DetectionOptions, PiiDetector};
use crate::error::{PipelineError, Result};
use crate::types::{
    BlockingReason, DetectionSummary, PiiProcessingMetadata, PolicyDecisionRecord,
    ProcessingFlow, RouteKind, RoutingDecision,
};
use std::sync::Arc;

/// Per-request routing inputs
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Explicit provider
    pub provider: Option<String>,
    /// Explicit model (requires `provider`)
    pub model: Option<String>,
    /// Caller's sovereign-mode request; `None` uses the policy default
    pub sovereign_mode: Option<bool>,
    /// Detection already performed upstream
    pub pii_metadata: Option<PiiProcessingMetadata>,
}

impl RouteOptions {
    pub fn with_target(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_sovereign_mode(mut self, sovereign_mode: bool) -> Self {
        self.sovereign_mode = Some(sovereign_mode);
        self
    }

    pub fn with_pii_metadata(mut self, metadata: PiiProcessingMetadata) -> Self {
        self.pii_metadata = Some(metadata);
        self
    }
}

/// Reasoning, violations and warnings gathered while walking the states
#[derive(Default)]
struct Trace {
    reasoning_path: Vec<String>,
    violations: Vec<String>,
    warnings: Vec<String>,
}

impl Trace {
    fn step(&mut self, step: impl Into<String>) {
        self.reasoning_path.push(step.into());
    }

    fn violation(&mut self, violation: String) {
        self.step(format!("violation: {}", violation));
        self.violations.push(violation);
    }

    fn warning(&mut self, warning: String) {
        self.step(format!("warning: {}", warning));
        self.warnings.push(warning);
    }
}

/// Where the decision sends the request
struct Target {
    route: RouteKind,
    provider: String,
    model: String,
    fallback_used: bool,
    blocking_reason: Option<BlockingReason>,
}

impl Target {
    fn local(route: RouteKind, selection: LocalSelection) -> Self {
        Self {
            route,
            provider: LOCAL_PROVIDER.to_string(),
            model: selection.model,
            fallback_used: selection.source.is_fallback(),
            blocking_reason: None,
        }
    }

    fn refused(route: RouteKind, provider: String, model: String, reason: BlockingReason) -> Self {
        Self {
            route,
            provider,
            model,
            fallback_used: false,
            blocking_reason: Some(reason),
        }
    }
}

/// Routing policy engine
pub struct RoutingEngine {
    config: RoutingConfig,
    detection: DetectionOptions,
    detector: Arc<dyn PiiDetector>,
    registry: Arc<dyn LocalModelRegistry>,
    fallback: Arc<dyn FallbackModelStore>,
    flags: Arc<dyn FeatureFlags>,
    policy: Arc<dyn PolicyConfigProvider>,
}

impl RoutingEngine {
    /// Create an engine with default flags and policy
    pub fn new(
        config: RoutingConfig,
        detector: Arc<dyn PiiDetector>,
        registry: Arc<dyn LocalModelRegistry>,
        fallback: Arc<dyn FallbackModelStore>,
    ) -> Self {
        Self {
            config,
            detection: DetectionOptions::default(),
            detector,
            registry,
            fallback,
            flags: Arc::new(StaticFeatureFlags::new(FlagsConfig::default())),
            policy: Arc::new(StaticPolicyProvider::new(PolicyConfig::default())),
        }
    }

    pub fn with_flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyConfigProvider>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_detection_options(mut self, detection: DetectionOptions) -> Self {
        self.detection = detection;
        self
    }

    /// Current policy from the configured provider
    pub async fn current_policy(&self) -> Result<PolicyConfig> {
        self.policy.policy().await
    }

    /// Decide where `prompt` goes
    ///
    /// Blocked and sovereign-error outcomes are returned as decisions with
    /// `route_to_agent == false`. Errors are reserved for bad configuration,
    /// collaborator failures, and a missing route outside sovereign mode.
    pub async fn determine_route(&self, prompt: &str, mut options: RouteOptions) -> Result<RoutingDecision> {
        if let Some(provider) = options.provider.as_mut() {
            provider.make_ascii_lowercase();
        }
        self.validate_target(&options)?;

        let mut trace = Trace::default();
        let complexity = analyze_complexity(prompt);
        trace.step(format!(
            "complexity: {} (raw score {})",
            complexity.level.as_str(),
            complexity.raw_score
        ));
        trace.step(format!("tier: {}", complexity.tier));

        if !self.flags.is_enabled(FeatureFlag::SmartRouting).await {
            return self.legacy_route(prompt, &complexity, options, trace).await;
        }

        let policy = self.policy.policy().await?;
        let sovereign_flag = self.flags.is_enabled(FeatureFlag::SovereignMode).await;
        let requested = options
            .sovereign_mode
            .unwrap_or(policy.default_mode == RoutingMode::Sovereign);
        let sovereign = sovereign_flag && (policy.enforced || requested);
        if requested && !sovereign_flag {
            trace.warning("sovereign mode requested but disabled by feature flag".to_string());
        }
        trace.step(format!(
            "sovereign mode: {}",
            if sovereign { "active" } else { "inactive" }
        ));

        let mut metadata = self.detection_metadata(prompt, options.pii_metadata).await?;
        let summary = metadata.detection.clone().unwrap_or_default();
        let showstopper = summary.has_showstoppers();

        // Explicit target validation
        let mut sovereign_violation = false;
        let mut explicit_external: Option<(String, String)> = None;
        let mut explicit_local: Option<Option<String>> = None;
        if let Some(provider) = options.provider.clone() {
            if provider == LOCAL_PROVIDER {
                trace.step(format!("explicit local target: {}", provider));
                explicit_local = Some(options.model.clone());
            } else if sovereign {
                sovereign_violation = true;
                trace.violation(format!(
                    "sovereign mode forbids external provider '{}'",
                    provider
                ));
            } else if !policy.allows_provider(&provider) {
                trace.violation(format!(
                    "provider '{}' is not in the allowed providers list",
                    provider
                ));
            } else {
                let model = options.model.clone().unwrap_or_default();
                trace.step(format!("explicit external target: {}/{}", provider, model));
                explicit_external = Some((provider, model));
            }
        }

        let has_explicit = explicit_external.is_some() || explicit_local.is_some();
        let target = if !showstopper && has_explicit {
            // caller target stands
            trace.step("explicit target accepted");
            match (explicit_external, explicit_local) {
                (Some((provider, model)), _) => Target {
                    route: RouteKind::Explicit,
                    provider,
                    model,
                    fallback_used: false,
                    blocking_reason: None,
                },
                (None, Some(Some(model))) => Target {
                    route: RouteKind::Explicit,
                    provider: LOCAL_PROVIDER.to_string(),
                    model,
                    fallback_used: false,
                    blocking_reason: None,
                },
                (None, _) => Target::local(RouteKind::Explicit, self.select_local(&complexity).await),
            }
        } else if showstopper {
            trace.step(format!(
                "showstopper PII detected: {}",
                summary.data_types.join(", ")
            ));
            if let Some((provider, model)) = explicit_external {
                trace.step("showstopper with explicit external provider: blocked");
                Target::refused(RouteKind::Blocked, provider, model, BlockingReason::ShowstopperPii)
            } else if let Some(Some(model)) = explicit_local {
                trace.step("showstopper: bypass to explicit local model");
                Target {
                    route: RouteKind::LocalBypass,
                    provider: LOCAL_PROVIDER.to_string(),
                    model,
                    fallback_used: false,
                    blocking_reason: None,
                }
            } else if explicit_local.is_some() || sovereign || self.local_available().await {
                trace.step("showstopper: bypass to local model");
                Target::local(RouteKind::LocalBypass, self.select_local(&complexity).await)
            } else {
                trace.step("showstopper with no local route: blocked");
                Target::refused(
                    RouteKind::Blocked,
                    String::new(),
                    String::new(),
                    BlockingReason::ShowstopperPii,
                )
            }
        } else if self.local_available().await {
            trace.step("local runtime available");
            Target::local(RouteKind::Local, self.select_local(&complexity).await)
        } else if sovereign {
            trace.step("local runtime unavailable under sovereign mode");
            Target::refused(
                RouteKind::Error,
                LOCAL_PROVIDER.to_string(),
                String::new(),
                BlockingReason::NoLocalModelsAvailable,
            )
        } else {
            trace.step("local runtime unavailable");
            match self.config.external_fallback.clone() {
                Some(fallback) if policy.allows_provider(&fallback.provider) => {
                    trace.warning(format!(
                        "using external fallback {}/{}",
                        fallback.provider, fallback.model
                    ));
                    Target {
                        route: RouteKind::ExternalFallback,
                        provider: fallback.provider,
                        model: fallback.model,
                        fallback_used: true,
                        blocking_reason: None,
                    }
                }
                Some(fallback) => {
                    return Err(PipelineError::NoRouteAvailable(format!(
                        "local runtime unavailable and external fallback '{}' is not allowed by policy",
                        fallback.provider
                    )))
                }
                None => {
                    return Err(PipelineError::NoRouteAvailable(
                        "local runtime unavailable and no external fallback configured".to_string(),
                    ))
                }
            }
        };

        if target.fallback_used && target.route != RouteKind::ExternalFallback {
            trace.warning(format!("fallback local model used: {}", target.model));
        }

        let route_to_agent = target.blocking_reason.is_none();
        let is_local = target.provider == LOCAL_PROVIDER;
        metadata.processing_flow = processing_flow(&target, &summary, is_local);
        metadata.policy = Some(PolicyDecisionRecord {
            allowed: route_to_agent,
            requires_local: sovereign || (showstopper && route_to_agent),
            sovereign_mode: sovereign,
            reason: policy_reason(&target, sovereign_violation),
        });

        let decision = RoutingDecision {
            provider: target.provider,
            model: target.model,
            is_local,
            model_tier: Some(complexity.tier),
            fallback_used: target.fallback_used,
            complexity_score: complexity.score(),
            reasoning_path: trace.reasoning_path,
            sovereign_mode_enforced: Some(sovereign),
            sovereign_mode_violation: Some(sovereign_violation),
            pii_metadata: Some(metadata),
            route_to_agent,
            blocking_reason: target.blocking_reason,
            route: target.route,
            violations: trace.violations,
            warnings: trace.warnings,
        };

        log_decision(&decision);
        Ok(decision)
    }

    /// Fail fast on targets that can never be served
    fn validate_target(&self, options: &RouteOptions) -> Result<()> {
        match (&options.provider, &options.model) {
            (None, Some(model)) => Err(PipelineError::Config(format!(
                "model '{}' requested without a provider",
                model
            ))),
            (Some(provider), _) if !self.config.is_known_provider(provider) => {
                Err(PipelineError::UnsupportedProvider(provider.clone()))
            }
            (Some(provider), None) if provider != LOCAL_PROVIDER => {
                Err(PipelineError::MissingModel {
                    provider: provider.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Legacy routing still refuses to send showstopper PII off the host
    async fn legacy_route(
        &self,
        prompt: &str,
        complexity: &ComplexityAnalysis,
        options: RouteOptions,
        mut trace: Trace,
    ) -> Result<RoutingDecision> {
        trace.step("smart routing disabled: legacy routing");
        let (provider, model) = match (options.provider, options.model) {
            (Some(provider), Some(model)) => (provider, model),
            (Some(provider), None) if provider == self.config.legacy.provider => {
                (provider, self.config.legacy.model.clone())
            }
            (Some(provider), None) => (provider, self.config.emergency_model.clone()),
            _ => (
                self.config.legacy.provider.clone(),
                self.config.legacy.model.clone(),
            ),
        };
        let is_local = provider == LOCAL_PROVIDER;

        let mut metadata = self.detection_metadata(prompt, options.pii_metadata).await?;
        let summary = metadata.detection.clone().unwrap_or_default();
        let target = if summary.has_showstoppers() && !is_local {
            trace.step(format!(
                "showstopper PII detected: {}",
                summary.data_types.join(", ")
            ));
            trace.step("showstopper with external legacy provider: blocked");
            Target::refused(RouteKind::Blocked, provider, model, BlockingReason::ShowstopperPii)
        } else {
            Target {
                route: RouteKind::Legacy,
                provider,
                model,
                fallback_used: false,
                blocking_reason: None,
            }
        };

        let route_to_agent = target.blocking_reason.is_none();
        metadata.processing_flow = processing_flow(&target, &summary, is_local);
        metadata.policy = Some(PolicyDecisionRecord {
            allowed: route_to_agent,
            requires_local: false,
            sovereign_mode: false,
            reason: policy_reason(&target, false),
        });

        let decision = RoutingDecision {
            provider: target.provider,
            model: target.model,
            is_local,
            model_tier: Some(complexity.tier),
            fallback_used: false,
            complexity_score: complexity.score(),
            reasoning_path: trace.reasoning_path,
            sovereign_mode_enforced: None,
            sovereign_mode_violation: None,
            pii_metadata: Some(metadata),
            route_to_agent,
            blocking_reason: target.blocking_reason,
            route: target.route,
            violations: trace.violations,
            warnings: trace.warnings,
        };
        log_decision(&decision);
        Ok(decision)
    }

    /// Use upstream detection when present, otherwise run the detector
    async fn detection_metadata(
        &self,
        prompt: &str,
        supplied: Option<PiiProcessingMetadata>,
    ) -> Result<PiiProcessingMetadata> {
        if let Some(metadata) = supplied {
            if metadata.detection.is_some() {
                return Ok(metadata);
            }
        }

        let result = self.detector.detect(prompt, self.detection).await?;
        let mut metadata = PiiProcessingMetadata::new(ProcessingFlow::AllowedLocal);
        metadata.detection = Some(DetectionSummary::from_matches(
            &result.matches,
            result.processing_time_ms,
            result.patterns_checked,
        ));
        Ok(metadata)
    }

    async fn local_available(&self) -> bool {
        match self.registry.is_available().await {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!(error = %e, "Local runtime availability check failed");
                false
            }
        }
    }

    async fn select_local(&self, complexity: &ComplexityAnalysis) -> LocalSelection {
        select_local_model(
            self.registry.as_ref(),
            self.fallback.as_ref(),
            complexity.tier,
            &self.config.emergency_model,
        )
        .await
    }
}

fn processing_flow(target: &Target, summary: &DetectionSummary, is_local: bool) -> ProcessingFlow {
    match target.blocking_reason {
        Some(BlockingReason::ShowstopperPii) => ProcessingFlow::ShowstopperBlocked {
            data_types: summary.data_types.clone(),
        },
        Some(reason) => ProcessingFlow::PolicyBlocked {
            reason: reason.to_string(),
        },
        None if is_local => ProcessingFlow::AllowedLocal,
        None => ProcessingFlow::Pseudonymized {
            dictionary_mappings: 0,
            pattern_redactions: 0,
        },
    }
}

fn policy_reason(target: &Target, sovereign_violation: bool) -> String {
    let base = match target.route {
        RouteKind::Explicit => "explicit target accepted",
        RouteKind::Local => "local model selected",
        RouteKind::LocalBypass => "showstopper PII kept on local model",
        RouteKind::ExternalFallback => "local runtime unavailable, external fallback used",
        RouteKind::Legacy => "legacy routing",
        RouteKind::Blocked => "showstopper PII cannot leave the process",
        RouteKind::Error => "no local models available under sovereign mode",
    };
    if sovereign_violation {
        format!("{} (explicit external target overridden by sovereign mode)", base)
    } else {
        base.to_string()
    }
}

fn log_decision(decision: &RoutingDecision) {
    if decision.route_to_agent {
        tracing::info!(
            route = ?decision.route,
            provider = %decision.provider,
            model = %decision.model,
            complexity = decision.complexity_score,
            fallback = decision.fallback_used,
            "Route determined"
        );
    } else {
        tracing::warn!(
            route = ?decision.route,
            reason = ?decision.blocking_reason,
            "Request not routed"
        );
    }
}
