use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SubmissionContext;

/// Content address of a check-in.
///
/// Hex encoded SHA-256 of the canonical form of the fields that drive
/// analysis. Audience, reflection and history do not take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form keeps log lines readable.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Joins mood tags. Tags are assumed never to contain it.
const MOOD_SEPARATOR: &str = "\u{1f}";

/// Canonical string hashed by [`fingerprint`].
fn canonical(ctx: &SubmissionContext) -> String {
    let mut moods: Vec<&str> = ctx.selected_moods.iter().map(|m| m.as_str()).collect();
    moods.sort_unstable();
    format!(
        "{}|{}|{}|{}|{}",
        ctx.weather_type,
        moods.join(MOOD_SEPARATOR),
        ctx.presence(),
        ctx.capacity(),
        ctx.details
    )
}

/// Derive the cache key for `ctx`.
///
/// Mood order does not matter. Mood tags must not contain the unit
/// separator `U+001F`, which joins them in the hashed form.
///
/// ```
/// use checkin_analyst::{SubmissionContext, fingerprint};
///
/// let a = SubmissionContext::new("rainy", vec!["calm".into(), "tired".into()], "", 5, 5);
/// let b = SubmissionContext::new("rainy", vec!["tired".into(), "calm".into()], "", 5, 5);
/// assert_eq!(fingerprint(&a), fingerprint(&b));
/// ```
pub fn fingerprint(ctx: &SubmissionContext) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical(ctx).as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Audience, HistoricalPattern};

    fn base() -> SubmissionContext {
        SubmissionContext::new("cloudy", vec!["calm".into()], "quiet day", 6, 6)
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(fingerprint(&base()), fingerprint(&base()));
        assert_eq!(fingerprint(&base()).as_str().len(), 64);
    }

    #[test]
    fn known_digest_does_not_drift() {
        let ctx = SubmissionContext::new("sunny", vec![], "", 9, 9);
        let mut hasher = Sha256::new();
        hasher.update(b"sunny||9|9|");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(fingerprint(&ctx).as_str(), expected);
    }

    #[test]
    fn every_relevant_field_changes_the_key() {
        let key = fingerprint(&base());
        let mut ctx = base();
        ctx.details = "busy day".into();
        assert_ne!(fingerprint(&ctx), key);

        let mut ctx = base();
        ctx.weather_type = "sunny".into();
        assert_ne!(fingerprint(&ctx), key);

        let mut ctx = base();
        ctx.selected_moods.push("hopeful".into());
        assert_ne!(fingerprint(&ctx), key);

        let mut ctx = base();
        ctx.presence_level = 2;
        assert_ne!(fingerprint(&ctx), key);

        let mut ctx = base();
        ctx.capacity_level = 9;
        assert_ne!(fingerprint(&ctx), key);
    }

    #[test]
    fn comma_in_a_mood_is_not_a_separator() {
        let joined = SubmissionContext::new("cloudy", vec!["calm,tired".into()], "", 6, 6);
        let split = SubmissionContext::new(
            "cloudy",
            vec!["calm".into(), "tired".into()],
            "",
            6,
            6,
        );
        assert_ne!(fingerprint(&joined), fingerprint(&split));
    }

    #[test]
    fn audience_and_extras_are_ignored() {
        let key = fingerprint(&base());
        let ctx = base()
            .with_audience(Audience::Manager)
            .with_reflection("felt fine")
            .with_history(HistoricalPattern {
                stability_score: 80,
                recent_deviations: vec![],
            });
        assert_eq!(fingerprint(&ctx), key);
    }
}
