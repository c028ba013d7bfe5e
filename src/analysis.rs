//! Value objects produced by the orchestrator.
//!
//! [`AnalysisResult`] is the body of an analysis. [`Analysis`] wraps it with
//! its [`Outcome`] so callers cannot mistake a degraded result for a real one.

use serde::{Deserialize, Serialize};

/// Overall emotional reading of a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalState {
    Positive,
    Challenging,
    Balanced,
    Depleted,
}

impl EmotionalState {
    /// Parse a provider supplied label, ignoring case.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "challenging" => Some(Self::Challenging),
            "balanced" => Some(Self::Balanced),
            "depleted" => Some(Self::Depleted),
            _ => None,
        }
    }

    pub fn is_strained(self) -> bool {
        matches!(self, Self::Challenging | Self::Depleted)
    }
}

/// Three-band reading used for presence and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Moderate,
    Low,
}

impl Level {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "moderate" => Some(Self::Moderate),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Band for a `1..=10` self-reported level.
    pub fn from_score(score: u8) -> Self {
        match score {
            7.. => Self::High,
            0..=4 => Self::Low,
            _ => Self::Moderate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
}

impl Recommendation {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
            category: category.into(),
        }
    }
}

/// Validated psychological analysis of a single check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub emotional_state: EmotionalState,
    pub presence_state: Level,
    pub capacity_state: Level,
    pub recommendations: Vec<Recommendation>,
    pub psychological_insights: String,
    pub motivational_message: String,
    pub needs_support: bool,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_reasoning: Option<String>,
}

impl AnalysisResult {
    /// Drop every recommendation.
    ///
    /// Applied to all template-sourced results: advice that did not come from
    /// the provider is never presented as if it had.
    pub fn without_template_advice(mut self) -> Self {
        self.recommendations.clear();
        self
    }
}

/// Why a result was synthesized instead of coming from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackReason {
    /// No credentials, or the gate is cooling down.
    AiUnavailable,
    /// The provider reported quota or rate exhaustion.
    QuotaExceeded,
    /// Network failure, server error or timeout.
    ProviderFailure,
    /// No JSON object could be recovered from the reply.
    UnparseableResponse,
    /// A required field was missing from the reply.
    SchemaViolation,
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source", content = "reason")]
pub enum Outcome {
    Ai,
    Fallback(FallbackReason),
}

impl Outcome {
    pub fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Flat provenance markers understood by existing consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceFlags {
    pub cached: bool,
    pub fallback: bool,
    pub quota_exceeded: bool,
    pub ai_unavailable: bool,
}

/// What [`crate::Orchestrator::submit`] resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub outcome: Outcome,
    pub cached: bool,
    pub processing_time_ms: u64,
}

impl Analysis {
    pub fn flags(&self) -> ProvenanceFlags {
        ProvenanceFlags {
            cached: self.cached,
            fallback: self.outcome.is_fallback(),
            quota_exceeded: self.outcome == Outcome::Fallback(FallbackReason::QuotaExceeded),
            ai_unavailable: self.outcome == Outcome::Fallback(FallbackReason::AiUnavailable),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome.is_fallback()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisRecord<'a> {
    #[serde(flatten)]
    result: &'a AnalysisResult,
    #[serde(flatten)]
    flags: ProvenanceFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_reason: Option<FallbackReason>,
    processing_time_ms: u64,
}

impl Serialize for Analysis {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fallback_reason = match self.outcome {
            Outcome::Ai => None,
            Outcome::Fallback(reason) => Some(reason),
        };
        AnalysisRecord {
            result: &self.result,
            flags: self.flags(),
            fallback_reason,
            processing_time_ms: self.processing_time_ms,
        }
        .serialize(serializer)
    }
}
