//! Wellbeing check-in analysis.
//!
//! A [`SubmissionContext`] goes through an [`Orchestrator`], which serves
//! repeats from a [`ContentCache`], serialises provider calls through a
//! [`ProviderGate`], and repairs and validates replies into an
//! [`AnalysisResult`]. When the provider path fails, the
//! [`FallbackSynthesizer`] answers instead and the returned [`Analysis`]
//! records why.

pub mod analysis;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod fingerprint;
pub mod gate;
pub mod gemini;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod repair;
pub mod submission;
pub mod validate;

pub use analysis::{
    Analysis, AnalysisResult, EmotionalState, FallbackReason, Level, Outcome, Priority,
    ProvenanceFlags, Recommendation,
};
pub use cache::{CachedAnalysis, ContentCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AnalystConfig;
pub use error::AnalysisError;
pub use fallback::FallbackSynthesizer;
pub use fingerprint::{Fingerprint, fingerprint};
pub use gate::{DisableCause, GateConfig, GateStatus, ProviderGate};
pub use gemini::GeminiProvider;
pub use logging::LogLevel;
pub use orchestrator::Orchestrator;
pub use provider::{AiProvider, FinishReason, ProviderReply, StaticProvider};
pub use submission::{Audience, HistoricalPattern, SubmissionContext};
