use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::gemini::{DEFAULT_MODEL, GeminiProvider};
use crate::{
    Clock, ContentCache, FallbackSynthesizer, GateConfig, Orchestrator, ProviderGate, SystemClock,
};

/// Throttling and cooldown settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub min_delay_ms: u64,
    pub max_backoff_secs: u64,
    pub failure_cooldown_secs: u64,
    pub call_timeout_secs: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        let defaults = GateConfig::default();
        Self {
            min_delay_ms: defaults.min_delay.as_millis() as u64,
            max_backoff_secs: defaults.max_backoff.as_secs(),
            failure_cooldown_secs: defaults.failure_cooldown.as_secs(),
            call_timeout_secs: defaults.call_timeout.as_secs(),
        }
    }
}

impl From<&GateSection> for GateConfig {
    fn from(section: &GateSection) -> Self {
        Self {
            min_delay: Duration::from_millis(section.min_delay_ms),
            max_backoff: Duration::from_secs(section.max_backoff_secs),
            failure_cooldown: Duration::from_secs(section.failure_cooldown_secs),
            call_timeout: Duration::from_secs(section.call_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: u64,
    /// Optional bound on stored analyses.
    pub max_entries: Option<usize>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub capacity: usize,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: crate::orchestrator::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Gemini connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    pub model: String,
    /// API key given inline. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

impl ProviderSection {
    /// API key from the config or the environment, if any.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Client for the configured provider, or `None` without credentials.
    pub fn provider(&self) -> Option<GeminiProvider> {
        let key = self.resolve_api_key()?;
        let mut provider = GeminiProvider::new(key, self.model.clone())
            .with_generation(self.temperature, self.max_output_tokens);
        if let Some(url) = &self.base_url {
            provider = provider.with_base_url(url.clone());
        }
        Some(provider)
    }
}

/// Top-level configuration. Every field has a default, so an empty file is
/// valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub gate: GateSection,
    pub cache: CacheSection,
    pub queue: QueueSection,
    pub provider: ProviderSection,
}

impl AnalystConfig {
    pub fn gate(&self) -> ProviderGate {
        let config = GateConfig::from(&self.gate);
        match self.provider.provider() {
            Some(p) => ProviderGate::new(Arc::new(p), config),
            None => {
                tracing::warn!(
                    env = %self.provider.api_key_env,
                    "no AI provider credentials; all analyses will use the fallback"
                );
                ProviderGate::disabled(config)
            }
        }
    }

    pub fn cache(&self) -> ContentCache {
        ContentCache::new(Duration::from_secs(self.cache.ttl_secs), self.cache.max_entries)
    }

    /// Build an orchestrator using `clock` for fallback phrasing.
    pub fn orchestrator_with_clock(&self, clock: Arc<dyn Clock>) -> Orchestrator {
        Orchestrator::start(
            Arc::new(self.gate()),
            Arc::new(self.cache()),
            FallbackSynthesizer::new(clock),
            self.queue.capacity,
        )
    }

    /// Build an orchestrator on the current Tokio runtime.
    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with_clock(Arc::new(SystemClock))
    }
}

/// Load an [`AnalystConfig`] from a TOML file.
///
/// # Examples
///
/// ```no_run
/// use checkin_analyst::config::load;
/// # tokio_test::block_on(async {
/// let cfg = load("analyst.toml").await.unwrap();
/// assert!(cfg.queue.capacity > 0);
/// # });
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<AnalystConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}
