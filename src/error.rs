//! Error types for a3s-privacy-router

use thiserror::Error;

/// Errors that can occur in the privacy pipeline
///
/// Policy blocks (showstopper PII, sovereign-mode violations) are never
/// errors; they are returned as [`crate::RoutingDecision`] values carrying a
/// blocking reason.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider name is not one this pipeline can route to
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Explicit provider given without a model it can resolve
    #[error("No model specified for provider '{provider}'")]
    MissingModel { provider: String },

    /// Dictionary store could not be read
    #[error("Failed to load pseudonymization dictionary: {0}")]
    Dictionary(String),

    /// Replacement table could not be read
    #[error("Failed to load replacement table: {0}")]
    ReplacementTable(String),

    /// PII detector failure
    #[error("PII detection failed: {0}")]
    Detection(String),

    /// Local model registry or fallback store failure
    #[error("Model registry error: {0}")]
    Registry(String),

    /// Model provider invocation failure
    #[error("Provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    /// Neither a local model nor an external fallback can serve the request
    #[error("No route available: {0}")]
    NoRouteAvailable(String),

    /// Audit sink failure (never surfaced past the audit logger)
    #[error("Audit error: {0}")]
    Audit(String),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// The request deadline elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl PipelineError {
    /// Whether this error is a configuration error (fail fast, never retried)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnsupportedProvider(_)
                | Self::MissingModel { .. }
                | Self::ConfigParse(_)
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
