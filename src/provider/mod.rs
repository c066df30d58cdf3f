//! Model provider trait: the outbound LLM call
//!
//! Every backend (local runtime, hosted APIs) implements [`ModelProvider`].
//! The orchestrator hands it text that has already been protected and
//! never inspects provider-specific details.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

/// Sampling parameters forwarded unchanged to the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// One provider invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    pub provider: String,
    pub model: String,
    pub system_prompt: String,
    pub user_message: String,
    #[serde(default)]
    pub params: GenerationParams,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Latency reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTiming {
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
}

/// Provider output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub timing: ProviderTiming,
}

/// Core trait for model backends
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Run one completion
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Provider name (e.g., "ollama", "memory")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        assert_eq!(TokenUsage::new(12, 30).total_tokens, 42);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total_tokens, u32::MAX);
    }
}
