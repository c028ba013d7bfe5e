//! Single-consumer request queue in front of the provider gate.
//!
//! Any number of callers may [`Orchestrator::submit`] concurrently. Cache
//! hits return immediately; misses are queued on a bounded channel drained by
//! one worker task, so at most one provider call is in flight at a time.
//! Every submission resolves. Failures become fallback analyses.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::cache::CachedAnalysis;
use crate::prompt::build_prompt;
use crate::repair::repair;
use crate::validate::validate;
use crate::{
    Analysis, AnalysisError, AnalysisResult, Audience, ContentCache, FallbackSynthesizer,
    Fingerprint, Outcome, ProviderGate, SubmissionContext, fingerprint,
};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct QueueEntry {
    id: Uuid,
    ctx: SubmissionContext,
    audience: Audience,
    fingerprint: Fingerprint,
    enqueued_at: Instant,
    reply: oneshot::Sender<Analysis>,
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

struct Shared {
    gate: Arc<ProviderGate>,
    cache: Arc<ContentCache>,
    fallback: FallbackSynthesizer,
    ttl: Duration,
    queued: AtomicUsize,
}

impl Shared {
    fn cached(&self, key: &Fingerprint, started: Instant) -> Option<Analysis> {
        let hit = self.cache.get(key)?;
        debug!(fingerprint = %key, outcome = ?hit.outcome, "analysis cache hit");
        Some(Analysis {
            result: hit.result,
            outcome: hit.outcome,
            cached: true,
            processing_time_ms: elapsed_ms(started),
        })
    }

    /// Template result for a failed provider path, never carrying advice.
    fn fallback_for(
        &self,
        ctx: &SubmissionContext,
        err: &AnalysisError,
    ) -> (AnalysisResult, Outcome) {
        let reason = err.fallback_reason();
        warn!(error = %err, ?reason, "using fallback analysis");
        let result = self.fallback.synthesize(ctx).without_template_advice();
        (result, Outcome::Fallback(reason))
    }

    fn store(&self, key: &Fingerprint, result: &AnalysisResult, outcome: Outcome) {
        self.cache.set(
            key.clone(),
            CachedAnalysis {
                result: result.clone(),
                outcome,
            },
            self.ttl,
        );
    }

    async fn analyse(
        &self,
        ctx: &SubmissionContext,
        audience: Audience,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.gate.check()?;
        let prompt = build_prompt(ctx, audience);
        trace!(%prompt, "analysis prompt");
        let reply = self.gate.call(&prompt).await?;
        let parsed = repair(&reply)?;
        validate(&parsed)
    }

    async fn process(&self, entry: &QueueEntry) -> Analysis {
        if let Some(hit) = self.cached(&entry.fingerprint, entry.enqueued_at) {
            return hit;
        }
        let (result, outcome) = match self.analyse(&entry.ctx, entry.audience).await {
            Ok(result) => {
                info!(emotional_state = ?result.emotional_state, "AI analysis complete");
                (result, Outcome::Ai)
            }
            Err(err) => self.fallback_for(&entry.ctx, &err),
        };
        self.store(&entry.fingerprint, &result, outcome);
        Analysis {
            result,
            outcome,
            cached: false,
            processing_time_ms: elapsed_ms(entry.enqueued_at),
        }
    }

    /// Resolve without the worker, used when the queue is gone.
    fn resolve_inline(
        &self,
        ctx: &SubmissionContext,
        key: &Fingerprint,
        started: Instant,
    ) -> Analysis {
        let err = AnalysisError::ProviderUnavailable("analysis queue is closed".into());
        let (result, outcome) = self.fallback_for(ctx, &err);
        self.store(key, &result, outcome);
        Analysis {
            result,
            outcome,
            cached: false,
            processing_time_ms: elapsed_ms(started),
        }
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<QueueEntry>) {
    debug!("analysis worker started");
    while let Some(entry) = rx.recv().await {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
        let span = info_span!("analysis", entry = %entry.id, fingerprint = %entry.fingerprint);
        let analysis = shared.process(&entry).instrument(span).await;
        if entry.reply.send(analysis).is_err() {
            debug!(entry = %entry.id, "caller dropped before analysis resolved");
        }
    }
    debug!("analysis queue closed; worker exiting");
}

/// Entry point for callers.
///
/// Cloning is cheap; all clones share one queue, cache and gate. The worker
/// exits once every clone has been dropped.
#[derive(Clone)]
pub struct Orchestrator {
    tx: mpsc::Sender<QueueEntry>,
    shared: Arc<Shared>,
    worker: Arc<JoinHandle<()>>,
}

impl Orchestrator {
    /// Spawn the worker on the current Tokio runtime.
    pub fn start(
        gate: Arc<ProviderGate>,
        cache: Arc<ContentCache>,
        fallback: FallbackSynthesizer,
        queue_capacity: usize,
    ) -> Self {
        let ttl = cache.default_ttl();
        let shared = Arc::new(Shared {
            gate,
            cache,
            fallback,
            ttl,
            queued: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), rx));
        Self {
            tx,
            shared,
            worker: Arc::new(worker),
        }
    }

    pub fn gate(&self) -> &ProviderGate {
        &self.shared.gate
    }

    pub fn cache(&self) -> &ContentCache {
        &self.shared.cache
    }

    /// Submissions waiting for the worker.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Analyse `ctx` framed for `audience`.
    ///
    /// Never fails: provider problems resolve to a fallback analysis whose
    /// [`Outcome`] records why.
    pub async fn submit(&self, ctx: SubmissionContext, audience: Audience) -> Analysis {
        let started = Instant::now();
        let key = fingerprint(&ctx);
        if let Some(hit) = self.shared.cached(&key, started) {
            return hit;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            ctx: ctx.clone(),
            audience,
            fingerprint: key.clone(),
            enqueued_at: started,
            reply: reply_tx,
        };
        debug!(entry = %entry.id, fingerprint = %key, "queueing analysis");
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(entry).await.is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            warn!(fingerprint = %key, "analysis queue closed");
            return self.shared.resolve_inline(&ctx, &key, started);
        }

        match reply_rx.await {
            Ok(analysis) => analysis,
            Err(_) => {
                warn!(fingerprint = %key, "analysis worker dropped the request");
                self.shared.resolve_inline(&ctx, &key, started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::{FallbackReason, FixedClock, GateConfig};

    const REPLY: &str = r#"{
        "emotionalState": "challenging",
        "presenceState": "low",
        "capacityState": "moderate",
        "recommendations": [{"title": "Pause", "description": "Take five.", "priority": "high", "category": "rest"}],
        "psychologicalInsights": "Attention is scattered.",
        "motivationalMessage": "One thing at a time.",
        "needsSupport": true,
        "confidence": 70
    }"#;

    fn orchestrator(gate: ProviderGate) -> Orchestrator {
        Orchestrator::start(
            Arc::new(gate),
            Arc::new(ContentCache::default()),
            FallbackSynthesizer::new(Arc::new(FixedClock::new(0))),
            8,
        )
    }

    fn gate_config() -> GateConfig {
        GateConfig {
            min_delay: Duration::from_millis(100),
            ..GateConfig::default()
        }
    }

    fn ctx() -> SubmissionContext {
        SubmissionContext::new("windy", vec!["scattered".into()], "", 3, 5)
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_ai_result() {
        let provider = Arc::new(StaticProvider::replying(REPLY));
        let orch = orchestrator(ProviderGate::new(provider.clone(), gate_config()));
        let analysis = orch.submit(ctx(), Audience::Employee).await;
        assert_eq!(analysis.outcome, Outcome::Ai);
        assert!(!analysis.cached);
        assert_eq!(analysis.result.recommendations[0].title, "Support Check-in");
        assert_eq!(analysis.result.recommendations[1].title, "Grounding Exercise");
        assert_eq!(analysis.result.recommendations[3].title, "Pause");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(orch.cache().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_reply_falls_back() {
        let provider = Arc::new(StaticProvider::replying("Sorry, I can't do that."));
        let orch = orchestrator(ProviderGate::new(provider, gate_config()));
        let analysis = orch.submit(ctx(), Audience::Manager).await;
        assert_eq!(
            analysis.outcome,
            Outcome::Fallback(FallbackReason::UnparseableResponse)
        );
        assert!(analysis.result.recommendations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn schema_violation_falls_back() {
        let provider = Arc::new(StaticProvider::replying(r#"{"emotionalState": "positive"}"#));
        let orch = orchestrator(ProviderGate::new(provider, gate_config()));
        let analysis = orch.submit(ctx(), Audience::Employee).await;
        assert_eq!(
            analysis.outcome,
            Outcome::Fallback(FallbackReason::SchemaViolation)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queued_duplicates_hit_cache_in_worker() {
        let provider = Arc::new(StaticProvider::replying(REPLY));
        let orch = orchestrator(ProviderGate::new(provider.clone(), gate_config()));
        let (a, b) = tokio::join!(
            orch.submit(ctx(), Audience::Employee),
            orch.submit(ctx(), Audience::Manager)
        );
        assert_eq!(provider.call_count(), 1);
        assert_eq!(a.result, b.result);
        assert!(a.cached != b.cached);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_outlives_individual_clones() {
        let orch = orchestrator(ProviderGate::disabled(gate_config()));
        let clone = orch.clone();
        drop(orch);
        let analysis = clone.submit(ctx(), Audience::Employee).await;
        assert_eq!(
            analysis.outcome,
            Outcome::Fallback(FallbackReason::AiUnavailable)
        );
        assert!(clone.is_running());
        assert_eq!(clone.queued(), 0);
    }
}
