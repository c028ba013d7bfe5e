//! Schema enforcement for parsed provider replies.
//!
//! Only a missing required field is fatal. Everything else is coerced into
//! range, and short recommendation lists are topped up from a state-biased
//! pool so every AI result carries four entries.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{AnalysisError, AnalysisResult, EmotionalState, Level, Priority, Recommendation};

pub const MAX_RECOMMENDATIONS: usize = 4;
pub const DEFAULT_CONFIDENCE: u8 = 75;

pub const DEFAULT_MOTIVATION: &str =
    "Every check-in is a step toward understanding yourself better. Be gentle with yourself today.";

/// Placeholder messages providers echo back from the schema or boilerplate.
const BANNED_MESSAGES: &[&str] = &[
    "string",
    "motivational message",
    "your motivational message here",
    "keep up the great work!",
    "stay positive!",
    "you've got this!",
];

const REQUIRED_FIELDS: &[&str] = &[
    "emotionalState",
    "presenceState",
    "capacityState",
    "recommendations",
    "psychologicalInsights",
    "needsSupport",
];

fn support_check_in() -> Recommendation {
    Recommendation::new(
        "Support Check-in",
        "Reach out to someone you trust, a mentor or your lead, and share how you are doing today.",
        Priority::High,
        "support",
    )
}

fn grounding_exercise() -> Recommendation {
    Recommendation::new(
        "Grounding Exercise",
        "Try the 5-4-3-2-1 technique: name five things you see, four you hear, three you can touch, two you smell and one you taste.",
        Priority::High,
        "mindfulness",
    )
}

fn focus_block() -> Recommendation {
    Recommendation::new(
        "Single-Task Focus Block",
        "Pick one small task, silence notifications and give it your full attention for 25 minutes.",
        Priority::Medium,
        "focus",
    )
}

fn recovery_break() -> Recommendation {
    Recommendation::new(
        "Recovery Break",
        "Step away for a proper break: stretch, hydrate and rest your eyes before taking on anything new.",
        Priority::High,
        "recovery",
    )
}

fn reflective_journaling() -> Recommendation {
    Recommendation::new(
        "Reflective Journaling",
        "Spend ten minutes writing about what is weighing on you and one thing that went well.",
        Priority::Medium,
        "reflection",
    )
}

/// General suggestions used, in order, to fill the remaining slots.
fn general_pool() -> [Recommendation; 5] {
    [
        Recommendation::new(
            "Mindful Breathing",
            "Take three slow breaths, counting four in and six out, before your next task.",
            Priority::Medium,
            "mindfulness",
        ),
        Recommendation::new(
            "Movement Break",
            "Go for a short walk or stretch to reset your body and mind.",
            Priority::Medium,
            "movement",
        ),
        Recommendation::new(
            "Gratitude Note",
            "Write down one thing you are grateful for today.",
            Priority::Low,
            "reflection",
        ),
        Recommendation::new(
            "Connect with a Colleague",
            "Share a quick conversation with someone on your team.",
            Priority::Low,
            "connection",
        ),
        Recommendation::new(
            "Plan Tomorrow",
            "Note your top three priorities for tomorrow so today's worries can rest.",
            Priority::Low,
            "planning",
        ),
    ]
}

fn is_present(map: &Map<String, Value>, field: &str) -> bool {
    !matches!(map.get(field), None | Some(Value::Null))
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn coerce_confidence(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_CONFIDENCE,
    }
}

fn motivational_message(value: Option<&Value>) -> String {
    match text(value) {
        Some(msg)
            if !BANNED_MESSAGES
                .iter()
                .any(|banned| banned.eq_ignore_ascii_case(&msg)) =>
        {
            msg
        }
        _ => DEFAULT_MOTIVATION.to_string(),
    }
}

fn parse_recommendation(value: &Value) -> Option<Recommendation> {
    let obj = value.as_object()?;
    let title = text(obj.get("title"))?;
    let description = text(obj.get("description"))?;
    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .and_then(Priority::parse)
        .unwrap_or(Priority::Medium);
    let category = text(obj.get("category")).unwrap_or_else(|| "wellbeing".to_string());
    Some(Recommendation {
        title,
        description,
        priority,
        category,
    })
}

/// Well-formed, de-duplicated provider recommendations, capped at four.
fn provider_recommendations(value: Option<&Value>) -> Vec<Recommendation> {
    let mut seen = HashSet::new();
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(parse_recommendation)
                .filter(|r| seen.insert(r.title.to_lowercase()))
                .take(MAX_RECOMMENDATIONS)
                .collect()
        })
        .unwrap_or_default()
}

/// Recommendations favoured by the analysed state, most urgent first.
fn state_biased(
    needs_support: bool,
    presence: Level,
    capacity: Level,
    emotional: EmotionalState,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if needs_support {
        out.push(support_check_in());
    }
    if presence == Level::Low {
        out.push(grounding_exercise());
        out.push(focus_block());
    }
    if capacity == Level::Low {
        out.push(recovery_break());
    }
    if emotional.is_strained() {
        out.push(reflective_journaling());
    }
    out
}

/// Bring `recs` up to [`MAX_RECOMMENDATIONS`].
///
/// State-biased entries are prepended, general ones appended. Titles already
/// present are skipped, ignoring case. Provider entries are never dropped.
pub fn top_up(
    recs: Vec<Recommendation>,
    needs_support: bool,
    presence: Level,
    capacity: Level,
    emotional: EmotionalState,
) -> Vec<Recommendation> {
    if recs.len() >= MAX_RECOMMENDATIONS {
        return recs;
    }
    let mut titles: HashSet<String> = recs.iter().map(|r| r.title.to_lowercase()).collect();
    let mut slots = MAX_RECOMMENDATIONS - recs.len();

    let mut front = Vec::new();
    for rec in state_biased(needs_support, presence, capacity, emotional) {
        if slots == 0 {
            break;
        }
        if titles.insert(rec.title.to_lowercase()) {
            front.push(rec);
            slots -= 1;
        }
    }

    let mut back = Vec::new();
    for rec in general_pool() {
        if slots == 0 {
            break;
        }
        if titles.insert(rec.title.to_lowercase()) {
            back.push(rec);
            slots -= 1;
        }
    }

    front.into_iter().chain(recs).chain(back).collect()
}

/// Turn a repaired provider object into an [`AnalysisResult`].
pub fn validate(parsed: &Map<String, Value>) -> Result<AnalysisResult, AnalysisError> {
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !is_present(parsed, f)) {
        return Err(AnalysisError::SchemaViolation(*missing));
    }

    let emotional_state = parsed
        .get("emotionalState")
        .and_then(Value::as_str)
        .and_then(EmotionalState::parse)
        .unwrap_or(EmotionalState::Balanced);
    let presence_state = parsed
        .get("presenceState")
        .and_then(Value::as_str)
        .and_then(Level::parse)
        .unwrap_or(Level::Moderate);
    let capacity_state = parsed
        .get("capacityState")
        .and_then(Value::as_str)
        .and_then(Level::parse)
        .unwrap_or(Level::Moderate);
    let needs_support = coerce_bool(parsed.get("needsSupport"));

    let recommendations = provider_recommendations(parsed.get("recommendations"));
    let supplied = recommendations.len();
    let recommendations = top_up(
        recommendations,
        needs_support,
        presence_state,
        capacity_state,
        emotional_state,
    );
    if supplied < recommendations.len() {
        debug!(supplied, total = recommendations.len(), "topped up recommendations");
    }

    let psychological_insights = match parsed.get("psychologicalInsights") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Ok(AnalysisResult {
        emotional_state,
        presence_state,
        capacity_state,
        recommendations,
        psychological_insights,
        motivational_message: motivational_message(parsed.get("motivationalMessage")),
        needs_support,
        confidence: coerce_confidence(parsed.get("confidence")),
        support_reasoning: text(parsed.get("supportReasoning")),
    })
}
