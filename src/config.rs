//! Pipeline configuration, feature flags and policy config provider
//!
//! Configuration is read from a TOML file. Every section has defaults, so an
//! absent file or an empty section yields a working pipeline:
//!
//! ```toml
//! [policy]
//! enforced = true
//! audit_level = "full"
//! allowed_providers = ["ollama", "anthropic"]
//!
//! [routing]
//! emergency_model = "llama3.2:1b"
//!
//! [routing.external_fallback]
//! provider = "anthropic"
//! model = "claude-3-5-haiku"
//! ```

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;

/// The only provider that keeps data on local infrastructure
pub const LOCAL_PROVIDER: &str = "ollama";

/// Provider names the router knows how to target
pub const DEFAULT_KNOWN_PROVIDERS: &[&str] = &["ollama", "openai", "anthropic", "google", "grok"];

/// How much of each routing decision is written to the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    None,
    Basic,
    Full,
}

impl Default for AuditLevel {
    fn default() -> Self {
        Self::Basic
    }
}

/// Default routing mode applied when a caller does not ask for one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Local-only routing
    Sovereign,
    /// Local-first with external providers permitted
    Standard,
}

impl Default for RoutingMode {
    fn default() -> Self {
        Self::Standard
    }
}

/// Organization-wide routing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Enforce sovereign mode for every request
    pub enforced: bool,
    pub default_mode: RoutingMode,
    pub audit_level: AuditLevel,
    /// Providers requests may be routed to; empty means no restriction
    pub allowed_providers: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforced: false,
            default_mode: RoutingMode::Standard,
            audit_level: AuditLevel::Basic,
            allowed_providers: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Whether the policy permits routing to `provider`
    pub fn allows_provider(&self, provider: &str) -> bool {
        self.allowed_providers.is_empty()
            || self
                .allowed_providers
                .iter()
                .any(|p| p.eq_ignore_ascii_case(provider))
    }
}

/// Static feature flag values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    /// Complexity-tiered routing; when off the legacy route is used
    pub smart_routing: bool,
    /// Allows sovereign mode to be activated at all
    pub sovereign_mode: bool,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            smart_routing: true,
            sovereign_mode: true,
        }
    }
}

/// Pattern redaction thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub min_confidence: f64,
    pub max_matches: usize,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            max_matches: 100,
        }
    }
}

/// Dictionary cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub cache_ttl_secs: u64,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

/// A concrete provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTarget {
    pub provider: String,
    pub model: String,
}

impl ProviderTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Provider selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Last-resort local model when the registry and fallback table are empty
    pub emergency_model: String,
    /// Provider names accepted in explicit requests
    pub known_providers: Vec<String>,
    /// External target used when no local model is available
    pub external_fallback: Option<ProviderTarget>,
    /// Target used when smart routing is switched off
    pub legacy: ProviderTarget,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            emergency_model: "llama3.2:1b".to_string(),
            known_providers: DEFAULT_KNOWN_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            external_fallback: None,
            legacy: ProviderTarget::new(LOCAL_PROVIDER, "llama3.2:1b"),
        }
    }
}

impl RoutingConfig {
    pub fn is_known_provider(&self, provider: &str) -> bool {
        self.known_providers
            .iter()
            .any(|p| p.eq_ignore_ascii_case(provider))
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub policy: PolicyConfig,
    pub flags: FlagsConfig,
    pub redaction: RedactionConfig,
    pub dictionary: DictionaryConfig,
    pub routing: RoutingConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    /// Returns the default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;

        tracing::debug!(
            path = %path.display(),
            enforced = config.policy.enforced,
            "Config loaded"
        );
        Ok(config)
    }

    /// Check value ranges and provider references
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.redaction.min_confidence) {
            return Err(PipelineError::Config(format!(
                "redaction.min_confidence must be within [0, 1], got {}",
                self.redaction.min_confidence
            )));
        }
        if self.redaction.max_matches == 0 {
            return Err(PipelineError::Config(
                "redaction.max_matches must be greater than 0".to_string(),
            ));
        }
        if self.dictionary.cache_ttl_secs == 0 {
            return Err(PipelineError::Config(
                "dictionary.cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.routing.emergency_model.trim().is_empty() {
            return Err(PipelineError::Config(
                "routing.emergency_model must not be empty".to_string(),
            ));
        }

        let mut targets = vec![("routing.legacy", &self.routing.legacy)];
        if let Some(ref fallback) = self.routing.external_fallback {
            targets.push(("routing.external_fallback", fallback));
        }
        for (section, target) in targets {
            if !self.routing.is_known_provider(&target.provider) {
                return Err(PipelineError::UnsupportedProvider(format!(
                    "{} ({})",
                    target.provider, section
                )));
            }
            if target.model.trim().is_empty() {
                return Err(PipelineError::MissingModel {
                    provider: target.provider.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Named feature flags consulted by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    SmartRouting,
    SovereignMode,
}

/// Source of feature flag values
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn is_enabled(&self, flag: FeatureFlag) -> bool;
}

/// Feature flags fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureFlags {
    config: FlagsConfig,
}

impl StaticFeatureFlags {
    pub fn new(config: FlagsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn is_enabled(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::SmartRouting => self.config.smart_routing,
            FeatureFlag::SovereignMode => self.config.sovereign_mode,
        }
    }
}

/// Source of the current routing policy
#[async_trait]
pub trait PolicyConfigProvider: Send + Sync {
    async fn policy(&self) -> Result<PolicyConfig>;
}

/// In-process policy holder, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticPolicyProvider {
    policy: RwLock<PolicyConfig>,
}

impl StaticPolicyProvider {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// Replace the active policy
    pub fn set(&self, policy: PolicyConfig) -> Result<()> {
        let mut guard = self.policy.write().map_err(|e| {
            PipelineError::Config(format!("Failed to acquire policy lock: {}", e))
        })?;
        *guard = policy;
        Ok(())
    }
}

#[async_trait]
impl PolicyConfigProvider for StaticPolicyProvider {
    async fn policy(&self) -> Result<PolicyConfig> {
        let guard = self.policy.read().map_err(|e| {
            PipelineError::Config(format!("Failed to acquire policy lock: {}", e))
        })?;
        Ok(guard.clone())
    }
}
