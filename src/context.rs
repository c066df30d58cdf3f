//! Per-request context: tenant scope, cancellation and deadline

use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Dictionary scope for a request
///
/// Agent entries take precedence over organization entries, which take
/// precedence over global ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    pub organization_slug: Option<String>,
    pub agent_slug: Option<String>,
}

impl Scope {
    /// Global scope only
    pub fn global() -> Self {
        Self::default()
    }

    pub fn organization(slug: impl Into<String>) -> Self {
        Self {
            organization_slug: Some(slug.into()),
            agent_slug: None,
        }
    }

    pub fn agent(organization_slug: impl Into<String>, agent_slug: impl Into<String>) -> Self {
        Self {
            organization_slug: Some(organization_slug.into()),
            agent_slug: Some(agent_slug.into()),
        }
    }
}

/// Context for a single inbound request
///
/// Cloning shares the cancellation token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request identifier (req-<uuid>)
    pub request_id: String,
    pub user_id: Option<String>,
    pub scope: Scope,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with global scope and no deadline
    pub fn new() -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            user_id: None,
            scope: Scope::global(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Bind the request to an external cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fail any awaited operation once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Cancel the request
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return an error if the request is cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PipelineError::Timeout(format!(
                    "deadline exceeded for {}",
                    self.request_id
                )));
            }
        }
        Ok(())
    }

    /// Await `fut` unless the request is cancelled or its deadline passes first
    ///
    /// `operation` names the awaited step in timeout errors.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
                result = fut => result,
            }
        };

        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::timeout(remaining, guarded)
                    .await
                    .map_err(|_| {
                        PipelineError::Timeout(format!(
                            "{} exceeded deadline for {}",
                            operation, self.request_id
                        ))
                    })?
            }
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_constructors() {
        assert_eq!(Scope::global().organization_slug, None);
        let scope = Scope::agent("acme", "support-bot");
        assert_eq!(scope.organization_slug.as_deref(), Some("acme"));
        assert_eq!(scope.agent_slug.as_deref(), Some("support-bot"));
    }

    #[test]
    fn test_request_id_format() {
        let ctx = RequestContext::new();
        assert!(ctx.request_id.starts_with("req-"));
    }

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = RequestContext::new();
        let value = ctx.run("step", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_cancelled_before_start() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = ctx.run("step", async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_cancelled_while_pending() {
        let ctx = RequestContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }
}
