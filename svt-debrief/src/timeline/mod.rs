//! Timeline reconstruction for recorded training sessions.
//!
//! The simulation session hands over four independent streams (chat
//! messages, the action log, nurse safety interceptions and periodic
//! physiological snapshots). This module merges them into one stream of
//! [`TimelineEvent`]s sorted by session time, which every later stage of the
//! debrief reads.
//!
//! # Module Organization
//!
//! - **[`reconstruct`]** - the merge itself, including state-change events
//!   synthesized from snapshot differences
//! - **[`vocabulary`]** - regex tables used to classify learner speech and
//!   action types

pub mod reconstruct;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ActionResult, Actor, EventType, Phase, StateTrigger};

pub use reconstruct::reconstruct_timeline;

/// Vital signs carried by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Heart rate (beats per minute).
    pub hr: f64,
    /// Oxygen saturation (percent).
    pub spo2: f64,
    /// Blood pressure as displayed, e.g. `"90/60"`.
    pub bp: String,
    /// Respiratory rate (breaths per minute).
    pub rr: f64,
}

/// Periodic physiological and emotional state recorded by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Session time in milliseconds.
    pub timestamp: i64,
    pub phase: Phase,
    pub rhythm: String,
    pub vitals: Vitals,
    pub sedated: bool,
    pub adenosine_count: u32,
    pub cardioversion_count: u32,
    /// Father's anxiety, 0 to 5.
    pub mark_anxiety: f64,
    /// Patient's fear, 0 to 5.
    pub lily_fear: f64,
}

impl StateSnapshot {
    /// The state a session starts in: idle, SVT at 220.
    pub fn baseline() -> Self {
        Self {
            timestamp: 0,
            phase: Phase::Idle,
            rhythm: "SVT".to_string(),
            vitals: Vitals {
                hr: 220.0,
                spo2: 97.0,
                bp: "90/60".to_string(),
                rr: 28.0,
            },
            sedated: false,
            adenosine_count: 0,
            cardioversion_count: 0,
            mark_anxiety: 2.0,
            lily_fear: 2.0,
        }
    }

    /// True while the monitor shows no cardiac output.
    pub fn in_crisis(&self) -> bool {
        self.phase == Phase::Asystole || self.vitals.hr == 0.0
    }
}

/// Structured details attached to a timeline event.
///
/// Every field is optional; a rule that needs a missing field simply does
/// not fire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addressed_to: Option<Actor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_explanatory: Option<bool>,
    /// Action or drug name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<StateTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_num: Option<u32>,
}

/// One entry in the reconstructed session timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    /// Deterministic id derived from the source stream and index.
    pub id: String,
    /// Milliseconds since session start.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub actor: Actor,
    pub content: String,
    pub state_before: StateSnapshot,
    pub state_after: StateSnapshot,
    pub metadata: EventMetadata,
}

impl TimelineEvent {
    /// Something the learner said out loud.
    pub fn is_learner_communication(&self) -> bool {
        self.event_type == EventType::Communication && self.actor == Actor::Learner
    }

    /// A learner communication flagged as explaining what is happening.
    pub fn is_explanatory(&self) -> bool {
        self.is_learner_communication() && self.metadata.was_explanatory == Some(true)
    }

    /// A synthesized event for the given snapshot trigger.
    pub fn has_trigger(&self, trigger: StateTrigger) -> bool {
        self.event_type == EventType::StateChange && self.metadata.trigger == Some(trigger)
    }

    /// A phase-change event whose new phase is `phase`.
    pub fn is_transition_into(&self, phase: Phase) -> bool {
        self.has_trigger(StateTrigger::PhaseChange)
            && self.state_after.phase == phase
            && self.state_before.phase != phase
    }

    /// A phase-change event leaving `phase`.
    pub fn is_transition_out_of(&self, phase: Phase) -> bool {
        self.has_trigger(StateTrigger::PhaseChange)
            && self.state_before.phase == phase
            && self.state_after.phase != phase
    }

    /// An action event whose type matches `predicate`.
    pub fn is_action_where(&self, predicate: impl Fn(&str) -> bool) -> bool {
        self.event_type == EventType::Action
            && self
                .metadata
                .intervention
                .as_deref()
                .is_some_and(predicate)
    }

    /// A character line spoken by `actor`.
    pub fn is_response_from(&self, actor: Actor) -> bool {
        self.event_type == EventType::CharacterResponse && self.actor == actor
    }
}

/// Who spoke a recorded chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Lily,
    Mark,
    Nurse,
    Doctor,
    System,
}

/// A chat line from the session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub who: Speaker,
    pub text: String,
    /// Wall-clock epoch milliseconds.
    pub time: i64,
}

/// One entry of the learner's action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    #[serde(rename = "type")]
    pub action_type: String,
    /// Session time in milliseconds.
    pub time: i64,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_num: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
}

/// An order the nurse refused to carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurseCatch {
    pub drug: String,
    pub attempted: f64,
    pub unit: String,
    pub reason: String,
    /// Session time in milliseconds.
    pub time: i64,
}

/// Raw session trace produced by the simulation session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconstructionInput {
    pub messages: Vec<Message>,
    pub action_log: Vec<ActionLogEntry>,
    pub nurse_catches: Vec<NurseCatch>,
    pub state_snapshots: Vec<StateSnapshot>,
    /// Wall-clock epoch milliseconds at session start.
    pub start_time: i64,
}

impl ReconstructionInput {
    /// Parse a session trace from its JSON wire format.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
