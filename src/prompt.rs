//! Audience specific instructions sent to the provider.

use serde::Serialize;
use tinytemplate::TinyTemplate;
use tracing::warn;

use crate::{Audience, SubmissionContext};

/// JSON shape the provider is asked to return.
pub const RESPONSE_SCHEMA: &str = r#"{
  "emotionalState": "positive" | "challenging" | "balanced" | "depleted",
  "presenceState": "high" | "moderate" | "low",
  "capacityState": "high" | "moderate" | "low",
  "recommendations": [
    {"title": string, "description": string, "priority": "high" | "medium" | "low", "category": string}
  ],
  "psychologicalInsights": string,
  "motivationalMessage": string,
  "needsSupport": boolean,
  "confidence": integer between 0 and 100,
  "supportReasoning": string
}"#;

const EMPLOYEE_TEMPLATE: &str = "You are a warm, supportive wellbeing companion. \
Someone has just shared an emotional check-in and wants help understanding it. \
Speak to them directly, gently and without judgement.

Check-in:
- Weather that describes their inner state: {weather}
- Moods: {moods}
- Presence (focus on the here and now): {presence}/10
- Capacity (energy available for work): {capacity}/10
- What they shared: {details}
{reflection_section}{history_section}
Offer up to four practical, kind suggestions they can act on today. \
Set needsSupport to true only if a conversation with someone they trust would clearly help.

Reply with a single JSON object and nothing else. No markdown, no commentary. Use exactly this schema:
{schema}
";

const MANAGER_TEMPLATE: &str = "You are an organisational psychologist briefing a team lead \
about one team member's emotional check-in. Be analytical, specific and respectful of privacy. \
Focus on what the lead can observe and how they can support.

Check-in:
- Weather metaphor chosen: {weather}
- Reported moods: {moods}
- Presence level: {presence}/10
- Capacity level: {capacity}/10
- Details provided: {details}
{reflection_section}{history_section}
Recommend up to four concrete supportive actions for the lead, ordered by priority. \
Set needsSupport to true when the team member would benefit from a check-in conversation, \
and explain why in supportReasoning.

Reply with a single JSON object and nothing else. No markdown, no commentary. Use exactly this schema:
{schema}
";

#[derive(Serialize)]
struct PromptContext<'a> {
    weather: &'a str,
    moods: String,
    presence: u8,
    capacity: u8,
    details: &'a str,
    reflection_section: String,
    history_section: String,
    schema: &'static str,
}

impl<'a> PromptContext<'a> {
    fn new(ctx: &'a SubmissionContext) -> Self {
        let moods = if ctx.selected_moods.is_empty() {
            "none selected".to_string()
        } else {
            ctx.selected_moods.join(", ")
        };
        let details = match ctx.details.trim() {
            "" => "(nothing shared)",
            d => d,
        };
        let reflection_section = match ctx.reflection.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => format!("- Reflection: {r}\n"),
            _ => String::new(),
        };
        let history_section = match &ctx.historical_pattern {
            Some(h) => {
                let deviations = if h.recent_deviations.is_empty() {
                    "none".to_string()
                } else {
                    h.recent_deviations.join(", ")
                };
                format!(
                    "- Historical stability score: {}/100\n- Recent deviations from their usual pattern: {}\n",
                    h.stability_score, deviations
                )
            }
            None => String::new(),
        };
        Self {
            weather: &ctx.weather_type,
            moods,
            presence: ctx.presence(),
            capacity: ctx.capacity(),
            details,
            reflection_section,
            history_section,
            schema: RESPONSE_SCHEMA,
        }
    }
}

/// Renders a `{name}` style template without HTML escaping.
pub fn render_template<T: Serialize>(
    template: &str,
    ctx: &T,
) -> Result<String, tinytemplate::error::Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("tpl", template)?;
    tt.render("tpl", ctx)
}

/// Build the provider instruction for `ctx` framed for `audience`.
pub fn build_prompt(ctx: &SubmissionContext, audience: Audience) -> String {
    let template = match audience {
        Audience::Employee => EMPLOYEE_TEMPLATE,
        Audience::Manager => MANAGER_TEMPLATE,
    };
    let values = PromptContext::new(ctx);
    render_template(template, &values).unwrap_or_else(|e| {
        warn!(error = %e, "prompt template failed to render");
        format!(
            "Analyse this emotional check-in: weather {}, moods {}, presence {}/10, capacity {}/10, details {}.\n\
             Reply with a single JSON object using this schema:\n{}",
            values.weather,
            values.moods,
            values.presence,
            values.capacity,
            values.details,
            values.schema
        )
    })
}
