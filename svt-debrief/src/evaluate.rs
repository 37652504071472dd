//! Evaluation entry point.
//!
//! [`DebriefEngine::evaluate`] runs the stages in a fixed order:
//! reconstruct the timeline, detect windows, detect pivots, build causal
//! chains, generate counterfactuals, then aggregate scores and summaries.
//! It is the only operation in the crate that can fail.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::causal::{CausalChain, build_causal_chains};
use crate::config::DebriefConfig;
use crate::counterfactual::{Counterfactual, generate_counterfactuals};
use crate::error::{DebriefError, Result};
use crate::pivots::{PivotPoint, detect_pivot_points};
use crate::scoring::{
    PivotalMoment, Scores, TheOneThing, TrajectoryPoint, build_trajectory, calculate_scores,
    pivotal_moment, the_one_thing,
};
use crate::timeline::{ReconstructionInput, TimelineEvent, reconstruct_timeline};
use crate::types::EvaluationId;
use crate::windows::{CommunicationWindow, detect_communication_windows};

/// Everything the debrief needs about one session.
///
/// Two evaluations of the same input are equal apart from `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub session_id: EvaluationId,
    pub timeline: Vec<TimelineEvent>,
    pub communication_windows: Vec<CommunicationWindow>,
    pub pivot_points: Vec<PivotPoint>,
    pub causal_chains: Vec<CausalChain>,
    pub counterfactuals: Vec<Counterfactual>,
    pub pivotal_moment: Option<PivotalMoment>,
    pub the_one_thing: Option<TheOneThing>,
    pub scores: Scores,
    pub trajectory: Vec<TrajectoryPoint>,
}

impl EvaluationResult {
    /// Serialize to the JSON shape consumed by the debrief UI.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Runs evaluations with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DebriefEngine {
    config: DebriefConfig,
}

impl DebriefEngine {
    /// Engine with default thresholds and weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a custom configuration, validated up front.
    pub fn with_config(config: DebriefConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DebriefConfig {
        &self.config
    }

    /// Evaluate one recorded session.
    #[instrument(
        skip_all,
        fields(messages = input.messages.len(), actions = input.action_log.len())
    )]
    pub fn evaluate(&self, input: &ReconstructionInput) -> Result<EvaluationResult> {
        self.config.validate()?;
        if let Err(e) = validate_input(input) {
            warn!(error = %e, "Rejected session input");
            return Err(e);
        }

        let timeline = reconstruct_timeline(input, &self.config.timeline);
        let communication_windows = detect_communication_windows(&timeline);
        let mut pivot_points =
            detect_pivot_points(&timeline, &communication_windows, &self.config.pivots);
        let causal_chains =
            build_causal_chains(&mut pivot_points, &timeline, &self.config.causal);
        let counterfactuals =
            generate_counterfactuals(&pivot_points, &timeline, &self.config.counterfactual);

        let scores = calculate_scores(&pivot_points, &communication_windows, &self.config.scoring);
        let pivotal_moment = pivotal_moment(&pivot_points);
        let the_one_thing = the_one_thing(&pivot_points, &counterfactuals);
        let trajectory = build_trajectory(&input.state_snapshots);

        let result = EvaluationResult {
            session_id: EvaluationId::new(),
            timeline,
            communication_windows,
            pivot_points,
            causal_chains,
            counterfactuals,
            pivotal_moment,
            the_one_thing,
            scores,
            trajectory,
        };

        debug!(
            session_id = %result.session_id,
            events = result.timeline.len(),
            windows = result.communication_windows.len(),
            pivots = result.pivot_points.len(),
            chains = result.causal_chains.len(),
            overall = result.scores.overall,
            "Evaluation complete"
        );
        Ok(result)
    }
}

/// Evaluate a session with the default configuration.
pub fn evaluate_session(input: &ReconstructionInput) -> Result<EvaluationResult> {
    DebriefEngine::new().evaluate(input)
}

fn validate_input(input: &ReconstructionInput) -> Result<()> {
    for (i, s) in input.state_snapshots.iter().enumerate() {
        let vitals = [("hr", s.vitals.hr), ("spo2", s.vitals.spo2), ("rr", s.vitals.rr)];
        if let Some((name, _)) = vitals.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(DebriefError::InvalidInput(format!(
                "snapshot {i} has non-finite {name}"
            )));
        }
        for (name, value) in [("markAnxiety", s.mark_anxiety), ("lilyFear", s.lily_fear)] {
            if !(0.0..=5.0).contains(&value) {
                return Err(DebriefError::InvalidInput(format!(
                    "snapshot {i} has {name} {value} outside 0..=5"
                )));
            }
        }
    }

    for (i, a) in input.action_log.iter().enumerate() {
        if [a.given, a.correct].into_iter().flatten().any(|d| !d.is_finite()) {
            return Err(DebriefError::InvalidInput(format!(
                "action {i} ({}) has a non-finite dose",
                a.action_type
            )));
        }
    }

    for (i, c) in input.nurse_catches.iter().enumerate() {
        if !c.attempted.is_finite() {
            return Err(DebriefError::InvalidInput(format!(
                "nurse catch {i} ({}) has a non-finite dose",
                c.drug
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::StateSnapshot;

    #[test]
    fn test_empty_session_evaluates() {
        let result = evaluate_session(&ReconstructionInput::default()).unwrap();

        assert!(result.timeline.is_empty());
        assert!(result.communication_windows.is_empty());
        assert!(result.pivotal_moment.is_none());
        assert!(result.the_one_thing.is_none());
        assert_eq!(result.scores.overall, 4.0);
    }

    #[test]
    fn test_rejects_nan_vitals() {
        let mut snapshot = StateSnapshot::baseline();
        snapshot.vitals.hr = f64::NAN;
        let input = ReconstructionInput {
            state_snapshots: vec![snapshot],
            ..Default::default()
        };

        let err = evaluate_session(&input).unwrap_err();
        assert!(matches!(err, DebriefError::InvalidInput(_)));
        assert!(err.to_string().contains("hr"));
    }

    #[test]
    fn test_rejects_anxiety_out_of_range() {
        let mut snapshot = StateSnapshot::baseline();
        snapshot.mark_anxiety = 6.5;
        let input = ReconstructionInput {
            state_snapshots: vec![snapshot],
            ..Default::default()
        };

        assert!(matches!(
            evaluate_session(&input),
            Err(DebriefError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = DebriefConfig::default();
        config.pivots.underdose_ratio = 1.5;

        assert!(matches!(
            DebriefEngine::with_config(config),
            Err(DebriefError::Config(_))
        ));
    }

    #[test]
    fn test_result_json_uses_camel_case() {
        let result = evaluate_session(&ReconstructionInput::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert!(json.get("sessionId").is_some());
        assert!(json.get("communicationWindows").is_some());
        assert!(json.get("theOneThing").is_some());
    }
}
