//! Local model registry and fallback model lookup
//!
//! Local selection walks four levels, each consulted only after the
//! previous one failed or came back empty: a loaded model for the tier, any
//! model registered for the tier, the priority-ordered fallback table, and
//! finally the configured emergency model.

use crate::error::{PipelineError, Result};
use crate::types::ModelTier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Runtime state of a local model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Resident in memory, ready to serve
    Loaded,
    /// Pulled but not loaded
    Available,
    /// Being downloaded
    Downloading,
}

/// A model known to the local runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    pub status: ModelStatus,
}

impl LocalModel {
    pub fn new(name: impl Into<String>, status: ModelStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// A row of the fallback model table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackModel {
    pub name: String,
    pub tier: ModelTier,
    /// Lower values are tried first
    pub priority: i32,
}

/// Local model runtime inventory
#[async_trait]
pub trait LocalModelRegistry: Send + Sync {
    /// Whether the local runtime is reachable at all
    async fn is_available(&self) -> Result<bool>;

    /// Models registered for `tier`
    async fn models_by_tier(&self, tier: ModelTier) -> Result<Vec<LocalModel>>;
}

/// Persistent fallback model table
#[async_trait]
pub trait FallbackModelStore: Send + Sync {
    /// Fallback models for `tier`, ordered by priority
    async fn fallback_models(&self, tier: ModelTier) -> Result<Vec<FallbackModel>>;
}

/// Which level of the chain produced a local model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionSource {
    Loaded,
    Registered,
    FallbackTable,
    Emergency,
}

impl SelectionSource {
    /// Whether the model came from outside the live registry
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackTable | Self::Emergency)
    }
}

/// Chosen local model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSelection {
    pub model: String,
    pub source: SelectionSource,
}

/// Walk the selection chain for `tier`; always yields a model
pub async fn select_local_model(
    registry: &dyn LocalModelRegistry,
    fallback: &dyn FallbackModelStore,
    tier: ModelTier,
    emergency_model: &str,
) -> LocalSelection {
    match registry.models_by_tier(tier).await {
        Ok(models) => {
            if let Some(model) = models.iter().find(|m| m.status == ModelStatus::Loaded) {
                return LocalSelection {
                    model: model.name.clone(),
                    source: SelectionSource::Loaded,
                };
            }
            if let Some(model) = models.first() {
                return LocalSelection {
                    model: model.name.clone(),
                    source: SelectionSource::Registered,
                };
            }
        }
        Err(e) => {
            tracing::warn!(tier = %tier, error = %e, "Local model registry query failed");
        }
    }

    match fallback.fallback_models(tier).await {
        Ok(mut models) => {
            models.sort_by_key(|m| m.priority);
            if let Some(model) = models.into_iter().next() {
                return LocalSelection {
                    model: model.name,
                    source: SelectionSource::FallbackTable,
                };
            }
        }
        Err(e) => {
            tracing::warn!(tier = %tier, error = %e, "Fallback model lookup failed");
        }
    }

    tracing::warn!(
        tier = %tier,
        model = %emergency_model,
        "No local model for tier, using emergency model"
    );
    LocalSelection {
        model: emergency_model.to_string(),
        source: SelectionSource::Emergency,
    }
}

/// In-memory registry and fallback table for testing
///
/// Implements both [`LocalModelRegistry`] and [`FallbackModelStore`].
#[derive(Default)]
pub struct MemoryModelRegistry {
    offline: AtomicBool,
    failing: AtomicBool,
    models: RwLock<HashMap<ModelTier, Vec<LocalModel>>>,
    fallback: RwLock<Vec<FallbackModel>>,
}

impl MemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model for a tier
    pub fn with_model(self, tier: ModelTier, model: LocalModel) -> Self {
        if let Ok(mut models) = self.models.write() {
            models.entry(tier).or_default().push(model);
        }
        self
    }

    /// Add a fallback table row
    pub fn with_fallback(self, name: impl Into<String>, tier: ModelTier, priority: i32) -> Self {
        if let Ok(mut fallback) = self.fallback.write() {
            fallback.push(FallbackModel {
                name: name.into(),
                tier,
                priority,
            });
        }
        self
    }

    /// Mark the local runtime unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every query fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::Registry("memory registry failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalModelRegistry for MemoryModelRegistry {
    async fn is_available(&self) -> Result<bool> {
        self.check()?;
        Ok(!self.offline.load(Ordering::SeqCst))
    }

    async fn models_by_tier(&self, tier: ModelTier) -> Result<Vec<LocalModel>> {
        self.check()?;
        let models = self.models.read().map_err(|e| {
            PipelineError::Registry(format!("Failed to acquire registry lock: {}", e))
        })?;
        Ok(models.get(&tier).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl FallbackModelStore for MemoryModelRegistry {
    async fn fallback_models(&self, tier: ModelTier) -> Result<Vec<FallbackModel>> {
        self.check()?;
        let fallback = self.fallback.read().map_err(|e| {
            PipelineError::Registry(format!("Failed to acquire registry lock: {}", e))
        })?;
        let mut models: Vec<FallbackModel> =
            fallback.iter().filter(|m| m.tier == tier).cloned().collect();
        models.sort_by_key(|m| m.priority);
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn select(registry: &MemoryModelRegistry, tier: ModelTier) -> LocalSelection {
        select_local_model(registry, registry, tier, "llama3.2:1b").await
    }

    #[tokio::test]
    async fn test_prefers_loaded_model() {
        let registry = MemoryModelRegistry::new()
            .with_model(
                ModelTier::General,
                LocalModel::new("mistral:7b", ModelStatus::Available),
            )
            .with_model(
                ModelTier::General,
                LocalModel::new("qwen2.5:7b", ModelStatus::Loaded),
            );

        let selection = select(&registry, ModelTier::General).await;
        assert_eq!(selection.model, "qwen2.5:7b");
        assert_eq!(selection.source, SelectionSource::Loaded);
    }

    #[tokio::test]
    async fn test_any_registered_model_when_none_loaded() {
        let registry = MemoryModelRegistry::new().with_model(
            ModelTier::UltraFast,
            LocalModel::new("phi3:mini", ModelStatus::Downloading),
        );
        let selection = select(&registry, ModelTier::UltraFast).await;
        assert_eq!(selection.model, "phi3:mini");
        assert_eq!(selection.source, SelectionSource::Registered);
        assert!(!selection.source.is_fallback());
    }

    #[tokio::test]
    async fn test_fallback_table_by_priority() {
        let registry = MemoryModelRegistry::new()
            .with_fallback("deepseek-r1:14b", ModelTier::FastThinking, 2)
            .with_fallback("qwq:32b", ModelTier::FastThinking, 1)
            .with_fallback("llama3.1:8b", ModelTier::General, 0);

        let selection = select(&registry, ModelTier::FastThinking).await;
        assert_eq!(selection.model, "qwq:32b");
        assert_eq!(selection.source, SelectionSource::FallbackTable);
    }

    #[tokio::test]
    async fn test_emergency_model_last() {
        let registry = MemoryModelRegistry::new();
        let selection = select(&registry, ModelTier::General).await;
        assert_eq!(selection.model, "llama3.2:1b");
        assert_eq!(selection.source, SelectionSource::Emergency);
        assert!(selection.source.is_fallback());
    }

    #[tokio::test]
    async fn test_query_failures_fall_through() {
        let registry = MemoryModelRegistry::new()
            .with_model(ModelTier::General, LocalModel::new("x", ModelStatus::Loaded));
        registry.set_failing(true);

        let selection = select(&registry, ModelTier::General).await;
        assert_eq!(selection.source, SelectionSource::Emergency);
        assert!(registry.is_available().await.is_err());
    }
}
