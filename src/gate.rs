//! Throttled, self-disabling access to the AI provider.
//!
//! [`ProviderGate`] is the only path to the network. It spaces calls at least
//! `min_delay` apart, retries once after a rate limit, and refuses calls for a
//! cooldown window after failures.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, info, trace, warn};

use crate::AnalysisError;
use crate::provider::{AiProvider, ProviderReply};

static RATE_LIMIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b429\b|quota|rate[ _-]?limit|too many requests|exceeded|resource[ _]exhausted",
    )
    .expect("valid regex")
});

/// Whether a provider error message signals quota or rate exhaustion.
pub fn is_rate_limited(message: &str) -> bool {
    RATE_LIMIT_RE.is_match(message)
}

/// Timing policy for a [`ProviderGate`].
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum spacing between any two provider calls.
    pub min_delay: Duration,
    /// Upper bound of the rate-limit backoff.
    pub max_backoff: Duration,
    /// Cooldown applied after a non rate-limit failure.
    pub failure_cooldown: Duration,
    /// Deadline for a single provider call.
    pub call_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1200),
            max_backoff: Duration::from_secs(30),
            failure_cooldown: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl GateConfig {
    /// Delay before the single retry that follows a rate limit.
    pub fn backoff(&self) -> Duration {
        (self.min_delay * 4).min(self.max_backoff)
    }

    /// How long the gate stays closed after a failed retry.
    pub fn rate_limit_cooldown(&self) -> Duration {
        self.backoff() * 2
    }
}

/// Why the gate closed itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableCause {
    RateLimited,
    Failure,
}

#[derive(Default)]
struct GateState {
    last_request: Option<Instant>,
    disabled_until: Option<Instant>,
    cause: Option<DisableCause>,
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub has_credentials: bool,
    pub available: bool,
    pub disabled_for: Option<Duration>,
    pub cause: Option<DisableCause>,
}

enum Failure {
    RateLimited(String),
    Other(String),
}

impl Failure {
    fn classify(message: String) -> Self {
        if is_rate_limited(&message) {
            Self::RateLimited(message)
        } else {
            Self::Other(message)
        }
    }

    fn into_error(self) -> AnalysisError {
        match self {
            Self::RateLimited(m) => AnalysisError::RateLimited(m),
            Self::Other(m) => AnalysisError::OtherProviderFailure(m),
        }
    }
}

/// Owns the provider and the shared throttling state.
///
/// A gate built without a provider behaves as if credentials were missing:
/// every call fails with [`AnalysisError::ProviderUnavailable`].
pub struct ProviderGate {
    provider: Option<Arc<dyn AiProvider>>,
    config: GateConfig,
    state: Mutex<GateState>,
}

impl ProviderGate {
    pub fn new(provider: Arc<dyn AiProvider>, config: GateConfig) -> Self {
        Self {
            provider: Some(provider),
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Gate with no credentials configured.
    pub fn disabled(config: GateConfig) -> Self {
        Self {
            provider: None,
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ok when a call would be attempted right now.
    ///
    /// While cooling down after a rate limit this reports
    /// [`AnalysisError::RateLimited`] so callers keep the quota provenance.
    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.provider.is_none() {
            return Err(AnalysisError::ProviderUnavailable(
                "no credentials configured".into(),
            ));
        }
        let state = self.lock();
        match state.disabled_until {
            Some(until) if Instant::now() < until => {
                let remaining = until - Instant::now();
                let msg = format!("gate closed for another {remaining:?}");
                Err(match state.cause {
                    Some(DisableCause::RateLimited) => AnalysisError::RateLimited(msg),
                    _ => AnalysisError::ProviderUnavailable(msg),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.check().is_ok()
    }

    pub fn status(&self) -> GateStatus {
        let state = self.lock();
        let now = Instant::now();
        let disabled_for = state
            .disabled_until
            .filter(|until| *until > now)
            .map(|until| until - now);
        GateStatus {
            has_credentials: self.provider.is_some(),
            available: self.provider.is_some() && disabled_for.is_none(),
            cause: disabled_for.and(state.cause),
            disabled_for,
        }
    }

    fn disable_for(&self, window: Duration, cause: DisableCause) {
        let mut state = self.lock();
        state.disabled_until = Some(Instant::now() + window);
        state.cause = Some(cause);
        warn!(?window, ?cause, "AI provider disabled");
    }

    /// Wait out the global spacing and claim the next call slot.
    async fn throttle(&self) {
        let slot = {
            let mut state = self.lock();
            let now = Instant::now();
            let slot = match state.last_request {
                Some(last) => now.max(last + self.config.min_delay),
                None => now,
            };
            state.last_request = Some(slot);
            slot
        };
        if slot > Instant::now() {
            trace!(wait = ?(slot - Instant::now()), "throttling provider call");
            sleep_until(slot).await;
        }
    }

    async fn attempt(
        &self,
        provider: &dyn AiProvider,
        prompt: &str,
    ) -> Result<ProviderReply, Failure> {
        self.throttle().await;
        debug!(provider = provider.name(), "calling AI provider");
        match timeout(self.config.call_timeout, provider.generate(prompt)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(Failure::classify(e.to_string())),
            Err(_) => Err(Failure::Other(format!(
                "provider call timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }

    /// Send `prompt` to the provider.
    ///
    /// A rate-limited attempt is retried once after [`GateConfig::backoff`];
    /// if that also fails the gate closes for twice the backoff. Any other
    /// failure closes it for `failure_cooldown` without retrying.
    pub async fn call(&self, prompt: &str) -> Result<ProviderReply, AnalysisError> {
        self.check()?;
        let provider = match &self.provider {
            Some(p) => Arc::clone(p),
            None => {
                return Err(AnalysisError::ProviderUnavailable(
                    "no credentials configured".into(),
                ));
            }
        };

        match self.attempt(provider.as_ref(), prompt).await {
            Ok(reply) => {
                info!(provider = provider.name(), "AI provider call succeeded");
                Ok(reply)
            }
            Err(Failure::RateLimited(msg)) => {
                let backoff = self.config.backoff();
                warn!(error = %msg, ?backoff, "AI provider rate limited; retrying once");
                sleep(backoff).await;
                match self.attempt(provider.as_ref(), prompt).await {
                    Ok(reply) => {
                        info!(provider = provider.name(), "AI provider retry succeeded");
                        Ok(reply)
                    }
                    Err(failure) => {
                        self.disable_for(
                            self.config.rate_limit_cooldown(),
                            DisableCause::RateLimited,
                        );
                        Err(failure.into_error())
                    }
                }
            }
            Err(Failure::Other(msg)) => {
                warn!(error = %msg, "AI provider call failed");
                self.disable_for(self.config.failure_cooldown, DisableCause::Failure);
                Err(AnalysisError::OtherProviderFailure(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;

    fn config() -> GateConfig {
        GateConfig {
            min_delay: Duration::from_millis(1000),
            ..GateConfig::default()
        }
    }

    #[test]
    fn recognizes_rate_limit_messages() {
        assert!(is_rate_limited("429 Too Many Requests"));
        assert!(is_rate_limited("You exceeded your current quota"));
        assert!(is_rate_limited("RESOURCE_EXHAUSTED"));
        assert!(is_rate_limited("Rate limit reached"));
        assert!(!is_rate_limited("500 Internal Server Error"));
        assert!(!is_rate_limited("connection reset"));
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = GateConfig {
            min_delay: Duration::from_secs(10),
            ..GateConfig::default()
        };
        assert_eq!(cfg.backoff(), Duration::from_secs(30));
        assert_eq!(config().backoff(), Duration::from_secs(4));
        assert_eq!(config().rate_limit_cooldown(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn unavailable_without_credentials() {
        let gate = ProviderGate::disabled(config());
        assert!(!gate.is_available());
        assert!(matches!(
            gate.call("hi").await,
            Err(AnalysisError::ProviderUnavailable(_))
        ));
        assert!(!gate.status().has_credentials);
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_by_min_delay() {
        let provider = Arc::new(StaticProvider::replying("{}"));
        let gate = ProviderGate::new(provider.clone(), config());
        for _ in 0..3 {
            gate.call("hi").await.unwrap();
        }
        let times = provider.call_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_after_rate_limit() {
        let provider = Arc::new(StaticProvider::scripted(
            vec![Err("429 Too Many Requests".into())],
            Ok(ProviderReply::stop("{}")),
        ));
        let gate = ProviderGate::new(provider.clone(), config());
        let start = Instant::now();
        let reply = gate.call("hi").await.unwrap();
        assert_eq!(reply.text, "{}");
        assert_eq!(provider.call_count(), 2);
        assert!(Instant::now() - start >= config().backoff());
        assert!(gate.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_failed_retry() {
        let provider = Arc::new(StaticProvider::failing("quota exceeded"));
        let gate = ProviderGate::new(provider.clone(), config());
        let err = gate.call("hi").await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(_)));
        assert_eq!(provider.call_count(), 2);

        let status = gate.status();
        assert!(!status.available);
        assert_eq!(status.cause, Some(DisableCause::RateLimited));
        assert!(matches!(gate.check(), Err(AnalysisError::RateLimited(_))));

        tokio::time::advance(config().rate_limit_cooldown() - Duration::from_millis(1)).await;
        assert!(!gate.is_available());
        assert!(matches!(
            gate.call("hi").await,
            Err(AnalysisError::RateLimited(_))
        ));
        assert_eq!(provider.call_count(), 2);

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(gate.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_cool_down_without_retry() {
        let provider = Arc::new(StaticProvider::failing("500 Internal Server Error"));
        let gate = ProviderGate::new(provider.clone(), config());
        let err = gate.call("hi").await.unwrap_err();
        assert!(matches!(err, AnalysisError::OtherProviderFailure(_)));
        assert_eq!(provider.call_count(), 1);
        assert!(matches!(
            gate.check(),
            Err(AnalysisError::ProviderUnavailable(_))
        ));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(gate.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let provider =
            Arc::new(StaticProvider::replying("{}").with_latency(Duration::from_secs(120)));
        let gate = ProviderGate::new(provider, config());
        let err = gate.call("hi").await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::OtherProviderFailure(ref m) if m.contains("timed out"))
        );
    }
}
