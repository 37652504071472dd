//! Post-session evaluation and debrief engine for the SVT training simulator.
//!
//! Takes the raw trace of one simulated pediatric SVT case (dialogue,
//! orders, nurse interceptions and physiology snapshots) and turns it into
//! an [`EvaluationResult`] for the debrief screen.
//!
//! # Pipeline
//!
//! [`evaluate_session`] runs these stages in order:
//!
//! 1. **Timeline** ([`reconstruct_timeline`]) merges the trace into one
//!    sorted list of [`TimelineEvent`]s
//! 2. **Windows** ([`detect_communication_windows`]) finds the moments the
//!    family needed an explanation
//! 3. **Pivots** ([`detect_pivot_points`]) applies a fixed rule registry
//! 4. **Causal chains** ([`build_causal_chains`]) anchors cause and effect
//!    to real events
//! 5. **Counterfactuals** ([`generate_counterfactuals`]) projects what a
//!    better choice would have changed
//! 6. **Scores** ([`calculate_scores`]) plus the pivotal moment, the one
//!    lesson and the trajectory
//!
//! Dialogue hooks ([`generate_dialogue_hooks`]) are built separately from
//! the pivots of a finished evaluation.
//!
//! Every stage is a pure function of its arguments. The engine does no I/O
//! and never installs a tracing subscriber.

pub mod causal;
pub mod config;
pub mod counterfactual;
pub mod error;
mod evaluate;
pub mod hooks;
pub mod pivots;
pub mod scoring;
pub mod timeline;
mod types;
pub mod windows;

// Entry points
pub use evaluate::{DebriefEngine, EvaluationResult, evaluate_session};

// Configuration
pub use config::{
    CausalConfig, CounterfactualConfig, DebriefConfig, PivotConfig, ScoringConfig, TimelineConfig,
};

// Errors
pub use error::{DebriefError, Result};

// Timeline
pub use timeline::{
    ActionLogEntry, EventMetadata, Message, NurseCatch, ReconstructionInput, Speaker,
    StateSnapshot, TimelineEvent, Vitals, reconstruct_timeline,
};

// Stages
pub use causal::{Breakpoint, CausalChain, CausalLink, build_causal_chains, most_impactful_chain};
pub use counterfactual::{
    Counterfactual, InterventionSpec, OutcomeProjection, calculate_preventability_score,
    generate_counterfactuals, most_impactful_counterfactual,
};
pub use hooks::{DialogueHook, HookKind, generate_dialogue_hooks};
pub use pivots::{
    Alternative, PivotPoint, PivotType, StateImpact, detect_pivot_points, find_pivot,
    most_critical_pivot,
};
pub use scoring::{
    PivotalMoment, Scores, TheOneThing, TrajectoryPoint, build_trajectory, calculate_scores,
    pivotal_moment, the_one_thing,
};
pub use windows::{CommunicationWindow, detect_communication_windows, find_window};

// Shared types
pub use types::{ActionResult, Actor, EvaluationId, EventType, Impact, Phase, StateTrigger};
