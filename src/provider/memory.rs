//! In-memory model provider for testing and benchmarking
//!
//! Replies are computed from the request by a configurable responder and
//! every request is recorded, so tests can inspect exactly what would have
//! left the process.

use super::{ModelProvider, ProviderRequest, ProviderResponse, ProviderTiming, TokenUsage};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

type Responder = Arc<dyn Fn(&ProviderRequest) -> String + Send + Sync>;

/// In-memory provider
pub struct MemoryProvider {
    responder: Responder,
    delay: Option<Duration>,
    failing: AtomicBool,
    requests: RwLock<Vec<ProviderRequest>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl MemoryProvider {
    /// Reply with the user message unchanged
    pub fn echo() -> Self {
        Self::with_responder(|request| request.user_message.clone())
    }

    /// Always reply with `content`
    pub fn reply(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::with_responder(move |_| content.clone())
    }

    /// Reply with whatever `responder` computes from the request
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ProviderRequest) -> String + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            failing: AtomicBool::new(false),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Sleep before replying
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every request while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .read()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Most recent request
    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests
            .read()
            .ok()
            .and_then(|requests| requests.last().cloned())
    }
}

#[async_trait]
impl ModelProvider for MemoryProvider {
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        {
            let mut requests = self.requests.write().map_err(|e| PipelineError::Provider {
                provider: request.provider.clone(),
                reason: format!("Failed to acquire request log lock: {}", e),
            })?;
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::Provider {
                provider: request.provider.clone(),
                reason: "memory provider failing".to_string(),
            });
        }

        let content = (self.responder)(request);
        let prompt_tokens = request.user_message.split_whitespace().count() as u32;
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(ProviderResponse {
            content,
            usage: TokenUsage::new(prompt_tokens, completion_tokens),
            timing: ProviderTiming {
                latency_ms: self.delay.map(|d| d.as_millis() as u64).unwrap_or(0),
                time_to_first_token_ms: None,
            },
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationParams;

    fn request(message: &str) -> ProviderRequest {
        ProviderRequest {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            system_prompt: "be brief".into(),
            user_message: message.into(),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_echo_records_requests() {
        let provider = MemoryProvider::echo();
        let response = provider.generate(&request("hello world")).await.unwrap();

        assert_eq!(response.content, "hello world");
        assert_eq!(response.usage.total_tokens, 4);
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.last_request().unwrap().model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let provider = MemoryProvider::reply("ok");
        provider.set_failing(true);
        let err = provider.generate(&request("x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider { .. }));
    }
}
