use thiserror::Error;

use crate::FallbackReason;

/// Failures on the provider path.
///
/// None of these reach callers of [`crate::Orchestrator::submit`]; each one is
/// turned into a fallback result tagged with the matching [`FallbackReason`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("AI provider rate limited: {0}")]
    RateLimited(String),
    #[error("AI provider failed: {0}")]
    OtherProviderFailure(String),
    #[error("unparseable provider response: {0}")]
    UnparseableResponse(String),
    #[error("analysis is missing required field `{0}`")]
    SchemaViolation(&'static str),
}

impl AnalysisError {
    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            Self::ProviderUnavailable(_) => FallbackReason::AiUnavailable,
            Self::RateLimited(_) => FallbackReason::QuotaExceeded,
            Self::OtherProviderFailure(_) => FallbackReason::ProviderFailure,
            Self::UnparseableResponse(_) => FallbackReason::UnparseableResponse,
            Self::SchemaViolation(_) => FallbackReason::SchemaViolation,
        }
    }
}
