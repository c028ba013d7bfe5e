use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Boxed error returned by providers. The gate classifies it by message.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other(String),
}

impl FinishReason {
    /// Parse the provider's label, e.g. `"STOP"` or `"MAX_TOKENS"`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "STOP" | "" => Self::Stop,
            "MAX_TOKENS" | "LENGTH" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Raw text returned by a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub text: String,
    pub finish_reason: FinishReason,
}

impl ProviderReply {
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Interface to an external text generation service.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<ProviderReply, ProviderError>;

    /// Human readable name used for logging.
    fn name(&self) -> &str {
        "provider"
    }
}

/// Provider replaying scripted replies.
///
/// Each call pops the next scripted item; once the script is empty every call
/// returns `fallback`. Calls are recorded so tests can inspect spacing.
pub struct StaticProvider {
    script: Mutex<VecDeque<Result<ProviderReply, String>>>,
    fallback: Result<ProviderReply, String>,
    latency: Duration,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl StaticProvider {
    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), Ok(ProviderReply::stop(text)))
    }

    /// Always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), Err(message.into()))
    }

    pub fn scripted(
        script: Vec<Result<ProviderReply, String>>,
        fallback: Result<ProviderReply, String>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay each reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Instants at which calls started.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl AiProvider for StaticProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderReply, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Instant::now(), prompt.to_string()));
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        next.map_err(Into::into)
    }

    fn name(&self) -> &str {
        "static"
    }
}
