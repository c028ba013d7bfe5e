//! Deterministic analysis used whenever the provider path fails.
//!
//! Classification comes straight from the reported levels. Wording is picked
//! from fixed templates with a seed of `presence + capacity + hour bucket`,
//! then themed by keywords found in what the person wrote.

use std::sync::Arc;

use crate::{AnalysisResult, Clock, EmotionalState, Level, SubmissionContext};

pub const FALLBACK_CONFIDENCE: u8 = 60;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Themes recognised in free text, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Stress,
    Fatigue,
    Meetings,
    Joy,
}

const THEME_KEYWORDS: &[(Theme, &[&str])] = &[
    (
        Theme::Stress,
        &["stress", "anxious", "anxiety", "overwhelm", "worried", "pressure", "panic"],
    ),
    (
        Theme::Fatigue,
        &["tired", "exhausted", "sleep", "fatigue", "drained", "burnout", "burned out"],
    ),
    (
        Theme::Meetings,
        &["meeting", "deadline", "workload", "calls", "presentation", "back to back"],
    ),
    (
        Theme::Joy,
        &["grateful", "happy", "excited", "proud", "celebrate", "good news"],
    ),
];

const POSITIVE_MESSAGES: &[&str] = &[
    "You are bringing real energy today. Let it carry you into what matters most.",
    "This is a strong moment. Notice what is helping and keep it close.",
    "Your presence and capacity are shining. Share a little of that light with your team.",
];

const BALANCED_MESSAGES: &[&str] = &[
    "Steady is a good place to be. Small, intentional steps will take you far today.",
    "You are holding things together well. Remember to pause and check in with yourself.",
    "Balance is a skill, and you are practising it. Keep listening to what you need.",
];

const CHALLENGING_MESSAGES: &[&str] = &[
    "Hard days do not define you. Reaching out and checking in is already a brave step.",
    "It is okay to not be okay. Be as kind to yourself as you would be to a friend.",
    "You do not have to carry everything at once. One small thing at a time is enough.",
];

const POSITIVE_INSIGHTS: &[&str] = &[
    "Your {weather} check-in reflects high engagement and available energy, a good foundation for focused and creative work.",
    "Choosing {weather} alongside strong presence and capacity suggests you are resourced and connected to the moment.",
    "A {weather} outlook with high levels on both scales points to a period of momentum worth protecting.",
];

const BALANCED_INSIGHTS: &[&str] = &[
    "Your {weather} check-in suggests a mixed but manageable state, with some resources available and some needing care.",
    "Describing your day as {weather} with moderate levels indicates you are coping, while a little attention to rest would help.",
    "A {weather} outlook with middling presence and capacity is a common, workable place that rewards small adjustments.",
];

const CHALLENGING_INSIGHTS: &[&str] = &[
    "Your {weather} check-in points to strain: presence or capacity is running low, which often signals the need for rest and support.",
    "Describing your day as {weather} with low levels suggests your resources are stretched and recovery deserves priority.",
    "A {weather} outlook alongside low presence or capacity is a signal worth listening to rather than pushing through.",
];

fn theme_sentences(theme: Theme) -> &'static [&'static str] {
    match theme {
        Theme::Stress => &[
            "You mentioned stress; naming it is the first step to loosening its grip.",
            "Pressure you described may be narrowing your focus, so slowing your breathing can help widen it again.",
        ],
        Theme::Fatigue => &[
            "Tiredness came up in what you shared, which suggests recovery should come before new demands.",
            "Your words point to fatigue, and rest is productive when energy is this low.",
        ],
        Theme::Meetings => &[
            "A heavy schedule of meetings can drain attention, so protected gaps between them matter.",
            "Work demands you mentioned may be crowding out focus time worth defending.",
        ],
        Theme::Joy => &[
            "The positive moments you described are worth savouring; they build resilience for harder days.",
            "What you shared carries real gratitude, which tends to sustain wellbeing.",
        ],
    }
}

/// First theme whose keywords appear in `text`, ignoring case.
pub fn detect_theme(text: &str) -> Option<Theme> {
    let text = text.to_lowercase();
    THEME_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(theme, _)| *theme)
}

/// Emotional reading from the level thresholds.
///
/// Either level at 4 or below is challenging, so the state always agrees
/// with [`SubmissionContext::needs_support`].
pub fn classify_emotion(presence: u8, capacity: u8) -> EmotionalState {
    if presence <= 4 || capacity <= 4 {
        EmotionalState::Challenging
    } else if presence >= 7 && capacity >= 7 {
        EmotionalState::Positive
    } else {
        EmotionalState::Balanced
    }
}

fn pick<'a>(options: &[&'a str], seed: u64) -> &'a str {
    options[(seed % options.len() as u64) as usize]
}

/// Builds schema-valid analyses without calling the provider.
#[derive(Clone)]
pub struct FallbackSynthesizer {
    clock: Arc<dyn Clock>,
}

impl FallbackSynthesizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Hours since the Unix epoch.
    pub fn time_bucket(&self) -> u64 {
        (self.clock.now_millis().max(0) / HOUR_MS) as u64
    }

    pub fn synthesize(&self, ctx: &SubmissionContext) -> AnalysisResult {
        let presence = ctx.presence();
        let capacity = ctx.capacity();
        let seed = u64::from(presence) + u64::from(capacity) + self.time_bucket();

        let emotional_state = classify_emotion(presence, capacity);
        let (messages, insights) = match emotional_state {
            EmotionalState::Positive => (POSITIVE_MESSAGES, POSITIVE_INSIGHTS),
            EmotionalState::Balanced => (BALANCED_MESSAGES, BALANCED_INSIGHTS),
            EmotionalState::Challenging | EmotionalState::Depleted => {
                (CHALLENGING_MESSAGES, CHALLENGING_INSIGHTS)
            }
        };

        let weather = match ctx.weather_type.trim() {
            "" => "mixed",
            w => w,
        };
        let mut insight = pick(insights, seed).replace("{weather}", weather);

        let free_text = match &ctx.reflection {
            Some(r) => format!("{} {}", ctx.details, r),
            None => ctx.details.clone(),
        };
        if let Some(theme) = detect_theme(&free_text) {
            insight.push(' ');
            insight.push_str(pick(theme_sentences(theme), seed));
        }

        let needs_support = ctx.needs_support();
        AnalysisResult {
            emotional_state,
            presence_state: Level::from_score(presence),
            capacity_state: Level::from_score(capacity),
            recommendations: Vec::new(),
            psychological_insights: insight,
            motivational_message: pick(messages, seed).to_string(),
            needs_support,
            confidence: FALLBACK_CONFIDENCE,
            support_reasoning: needs_support
                .then(|| "Presence or capacity was reported at 4 or below.".to_string()),
        }
        .without_template_advice()
    }
}
