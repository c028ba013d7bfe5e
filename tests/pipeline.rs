use std::sync::Arc;
use std::time::Duration;

use checkin_analyst::{
    Audience, ContentCache, EmotionalState, FallbackReason, FallbackSynthesizer, FixedClock,
    GateConfig, Orchestrator, Outcome, ProviderGate, ProviderReply, StaticProvider,
    SubmissionContext, fingerprint,
};
use serde_json::Value;

const AI_REPLY: &str = r#"```json
{
  "emotionalState": "balanced",
  "presenceState": "moderate",
  "capacityState": "low",
  "recommendations": [
    {"title": "Short Walk", "description": "Ten minutes outside.", "priority": "medium", "category": "movement"}
  ],
  "psychologicalInsights": "Energy is lower than usual but attention is steady.",
  "motivationalMessage": "Small steps still count.",
  "needsSupport": true,
  "confidence": 82
}
```"#;

fn gate_config() -> GateConfig {
    GateConfig {
        min_delay: Duration::from_millis(500),
        ..GateConfig::default()
    }
}

fn start(gate: ProviderGate) -> Orchestrator {
    Orchestrator::start(
        Arc::new(gate),
        Arc::new(ContentCache::default()),
        FallbackSynthesizer::new(Arc::new(FixedClock::new(1_700_000_000_000))),
        32,
    )
}

fn low_capacity() -> SubmissionContext {
    SubmissionContext::new(
        "cloudy",
        vec!["tired".into(), "calm".into()],
        "Long week of meetings",
        6,
        3,
    )
}

#[test]
fn fingerprint_ignores_mood_order() {
    let a = SubmissionContext::new("rainy", vec!["sad".into(), "calm".into()], "x", 4, 5);
    let b = SubmissionContext::new("rainy", vec!["calm".into(), "sad".into()], "x", 4, 5);
    assert_eq!(fingerprint(&a), fingerprint(&b));
    assert_eq!(fingerprint(&a).as_str().len(), 64);
}

#[tokio::test(start_paused = true)]
async fn repeated_submission_is_served_from_cache() {
    let provider = Arc::new(StaticProvider::replying(AI_REPLY));
    let orch = start(ProviderGate::new(provider.clone(), gate_config()));

    let first = orch.submit(low_capacity(), Audience::Employee).await;
    let second = orch.submit(low_capacity(), Audience::Employee).await;

    assert_eq!(provider.call_count(), 1);
    assert_eq!(first.outcome, Outcome::Ai);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.outcome, Outcome::Ai);
    assert_eq!(first.result, second.result);
    assert_eq!(first.result.confidence, 82);
    assert_eq!(first.result.recommendations.len(), 4);
    assert!(first
        .result
        .recommendations
        .iter()
        .any(|r| r.title == "Short Walk"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_submissions_are_spaced() {
    let provider = Arc::new(StaticProvider::replying(AI_REPLY));
    let orch = start(ProviderGate::new(provider.clone(), gate_config()));

    let mut handles = Vec::new();
    for level in 1..=5u8 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            let ctx = SubmissionContext::new("windy", vec![], "", level, 5);
            orch.submit(ctx, Audience::Employee).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().outcome, Outcome::Ai);
    }

    let times = provider.call_times();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }
    assert_eq!(orch.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn quota_exhaustion_closes_the_gate() {
    let provider = Arc::new(StaticProvider::failing(
        "429 Too Many Requests: quota exceeded",
    ));
    let orch = start(ProviderGate::new(provider.clone(), gate_config()));

    let first = orch.submit(low_capacity(), Audience::Employee).await;
    assert_eq!(
        first.outcome,
        Outcome::Fallback(FallbackReason::QuotaExceeded)
    );
    assert!(first.flags().quota_exceeded);
    assert!(first.result.recommendations.is_empty());
    assert_eq!(provider.call_count(), 2);
    assert!(!orch.gate().is_available());

    let other = SubmissionContext::new("stormy", vec!["anxious".into()], "", 2, 2);
    let during = orch.submit(other, Audience::Manager).await;
    assert_eq!(
        during.outcome,
        Outcome::Fallback(FallbackReason::QuotaExceeded)
    );
    assert!(during.result.recommendations.is_empty());
    assert_eq!(provider.call_count(), 2);

    tokio::time::advance(gate_config().rate_limit_cooldown()).await;
    assert!(orch.gate().is_available());
}

#[tokio::test(start_paused = true)]
async fn recovers_after_single_rate_limit() {
    let provider = Arc::new(StaticProvider::scripted(
        vec![Err("RESOURCE_EXHAUSTED".into())],
        Ok(ProviderReply::stop(AI_REPLY)),
    ));
    let orch = start(ProviderGate::new(provider.clone(), gate_config()));
    let analysis = orch.submit(low_capacity(), Audience::Employee).await;
    assert_eq!(analysis.outcome, Outcome::Ai);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn without_credentials_everything_falls_back() {
    let orch = start(ProviderGate::disabled(GateConfig::default()));
    let ctx = SubmissionContext::new("sunny", vec!["happy".into()], "", 9, 9);
    let analysis = orch.submit(ctx, Audience::Employee).await;

    assert_eq!(analysis.result.emotional_state, EmotionalState::Positive);
    assert!(!analysis.result.needs_support);
    assert!(analysis.is_fallback());
    assert!(analysis.result.recommendations.is_empty());

    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json["fallback"], Value::Bool(true));
    assert_eq!(json["aiUnavailable"], Value::Bool(true));
    assert_eq!(json["quotaExceeded"], Value::Bool(false));
    assert_eq!(json["emotionalState"], "positive");
    assert_eq!(json["recommendations"], Value::Array(vec![]));
}

#[tokio::test(start_paused = true)]
async fn fallback_results_are_cached_too() {
    let orch = start(ProviderGate::disabled(GateConfig::default()));
    let first = orch.submit(low_capacity(), Audience::Employee).await;
    let second = orch.submit(low_capacity(), Audience::Employee).await;

    assert!(first.result.needs_support);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(
        first.result.psychological_insights,
        second.result.psychological_insights
    );
    assert_eq!(second.outcome, first.outcome);
    assert!(second.result.recommendations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn audience_selects_prompt_framing() {
    let provider = Arc::new(StaticProvider::replying(AI_REPLY));
    let orch = start(ProviderGate::new(provider.clone(), gate_config()));
    orch.submit(low_capacity(), Audience::Manager).await;
    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("team lead"));
    assert!(prompts[0].contains("Long week of meetings"));
}
