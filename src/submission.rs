use serde::{Deserialize, Serialize};

/// Framing requested by whoever will read the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Self-reflection framing for the person who checked in.
    #[default]
    Employee,
    /// Analytical framing for a supervisor.
    Manager,
}

impl std::str::FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "manager" => Ok(Self::Manager),
            other => Err(format!("unknown audience: {other}")),
        }
    }
}

/// Summary of how a person's previous check-ins looked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPattern {
    /// Stability score in `0..=100`.
    pub stability_score: u8,
    #[serde(default)]
    pub recent_deviations: Vec<String>,
}

/// A single emotional check-in as submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionContext {
    pub weather_type: String,
    #[serde(default)]
    pub selected_moods: Vec<String>,
    #[serde(default)]
    pub details: String,
    pub presence_level: u8,
    pub capacity_level: u8,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub audience: Option<Audience>,
    #[serde(default)]
    pub historical_pattern: Option<HistoricalPattern>,
}

impl SubmissionContext {
    /// Build a context from the fields that drive classification.
    ///
    /// Levels are clamped into `1..=10`.
    pub fn new(
        weather_type: impl Into<String>,
        selected_moods: Vec<String>,
        details: impl Into<String>,
        presence_level: u8,
        capacity_level: u8,
    ) -> Self {
        Self {
            weather_type: weather_type.into(),
            selected_moods,
            details: details.into(),
            presence_level: presence_level.clamp(1, 10),
            capacity_level: capacity_level.clamp(1, 10),
            reflection: None,
            audience: None,
            historical_pattern: None,
        }
    }

    pub fn with_reflection(mut self, reflection: impl Into<String>) -> Self {
        self.reflection = Some(reflection.into());
        self
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = Some(audience);
        self
    }

    pub fn with_history(mut self, pattern: HistoricalPattern) -> Self {
        self.historical_pattern = Some(pattern);
        self
    }

    /// Presence level clamped into `1..=10`.
    pub fn presence(&self) -> u8 {
        self.presence_level.clamp(1, 10)
    }

    /// Capacity level clamped into `1..=10`.
    pub fn capacity(&self) -> u8 {
        self.capacity_level.clamp(1, 10)
    }

    /// Whether either level sits in the low band.
    pub fn needs_support(&self) -> bool {
        self.presence() <= 4 || self.capacity() <= 4
    }
}
