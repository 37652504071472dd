//! Shared identifiers and enums for the debrief engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one evaluation run.
///
/// Uses UUIDv7, so the id is time-ordered. It is the only part of an
/// [`EvaluationResult`](crate::EvaluationResult) that differs between two runs
/// over the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(Uuid);

impl EvaluationId {
    /// Create a new time-ordered evaluation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Extract the creation time embedded in the UUIDv7.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.0.get_timestamp().and_then(|ts| {
            let (secs, nanos) = ts.to_unix();
            DateTime::from_timestamp(secs as i64, nanos)
        })
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EvaluationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The trainee playing the treating doctor.
    Learner,
    /// The bedside nurse.
    Nurse,
    /// The patient.
    Lily,
    /// The patient's father.
    Mark,
    /// The simulator itself.
    System,
}

impl Actor {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::Nurse => "nurse",
            Self::Lily => "lily",
            Self::Mark => "mark",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Something the learner said.
    Communication,
    /// An order or procedure performed by the learner.
    Action,
    /// A line spoken by a simulated character.
    CharacterResponse,
    /// A simulator message.
    System,
    /// Synthesized from a difference between two snapshots.
    StateChange,
    /// The nurse intercepted an out-of-policy order.
    NurseCatch,
}

impl EventType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Communication => "communication",
            Self::Action => "action",
            Self::CharacterResponse => "character_response",
            Self::System => "system",
            Self::StateChange => "state_change",
            Self::NurseCatch => "nurse_catch",
        }
    }
}

/// Phase of the simulated scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Scenario not started yet.
    #[default]
    Idle,
    /// Patient in SVT, scenario running.
    Running,
    /// Transient asystole after adenosine.
    Asystole,
    /// Patient converted to sinus rhythm.
    Converted,
}

impl Phase {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Asystole => "ASYSTOLE",
            Self::Converted => "CONVERTED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Educational impact of a window or pivot.
///
/// Variants are declared from most to least severe so that the derived
/// ordering matches the pivot sort rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Critical,
    High,
    Medium,
    Low,
}

impl Impact {
    /// Sort rank: critical 0, high 1, medium 2, low 3.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome reported for an action by the physiology kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Pending,
    Success,
    Failed,
}

/// Why a state-change event was synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTrigger {
    PhaseChange,
    AnxietySpike,
    FearSpike,
}

impl StateTrigger {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhaseChange => "phase_change",
            Self::AnxietySpike => "anxiety_spike",
            Self::FearSpike => "fear_spike",
        }
    }
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Render session milliseconds for narrative text, e.g. `12.5s`.
pub(crate) fn format_seconds(ms: i64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}
