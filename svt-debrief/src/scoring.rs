//! Score aggregation and debrief summaries.
//!
//! Reduces pivots and windows to three 1–5 scores, and picks out the moment
//! and the single lesson the debrief should open with.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::counterfactual::{
    Counterfactual, calculate_preventability_score, most_impactful_counterfactual,
};
use crate::pivots::{PIVOT_SKIPPED_VAGAL, PivotPoint, most_critical_pivot};
use crate::timeline::StateSnapshot;
use crate::types::{Impact, Phase, round1};
use crate::windows::CommunicationWindow;

/// Session scores, each between 1 and 5 with one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub clinical: f64,
    pub communication: f64,
    pub overall: f64,
}

/// Compute clinical, communication and overall scores.
pub fn calculate_scores(
    pivots: &[PivotPoint],
    windows: &[CommunicationWindow],
    config: &ScoringConfig,
) -> Scores {
    let dosing_errors = pivots
        .iter()
        .filter(|p| p.id.contains("underdose") || p.id.contains("overdose"))
        .count();
    let skipped_vagal = pivots.iter().any(|p| p.id == PIVOT_SKIPPED_VAGAL);

    let mut clinical = config.base_score - config.dosing_penalty * dosing_errors as f64;
    if skipped_vagal {
        clinical -= config.skipped_vagal_penalty;
    }
    let clinical = clinical.clamp(config.min_score, config.max_score);

    let missed = |impact: Impact| {
        windows
            .iter()
            .filter(|w| w.was_missed && w.impact == impact)
            .count() as f64
    };
    let communication = (config.base_score
        - config.missed_critical_penalty * missed(Impact::Critical)
        - config.missed_high_penalty * missed(Impact::High))
    .clamp(config.min_score, config.max_score);

    let overall = clinical * config.clinical_weight + communication * config.communication_weight;

    let scores = Scores {
        clinical: round1(clinical),
        communication: round1(communication),
        overall: round1(overall),
    };
    debug!(
        clinical = scores.clinical,
        communication = scores.communication,
        overall = scores.overall,
        "Calculated scores"
    );
    scores
}

/// One point of the physiological and emotional trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub timestamp: i64,
    pub phase: Phase,
    pub hr: f64,
    pub spo2: f64,
    pub mark_anxiety: f64,
    pub lily_fear: f64,
    pub in_crisis: bool,
}

/// Trajectory of the session, one point per snapshot in time order.
pub fn build_trajectory(snapshots: &[StateSnapshot]) -> Vec<TrajectoryPoint> {
    let mut points: Vec<TrajectoryPoint> = snapshots
        .iter()
        .map(|s| TrajectoryPoint {
            timestamp: s.timestamp,
            phase: s.phase,
            hr: s.vitals.hr,
            spo2: s.vitals.spo2,
            mark_anxiety: s.mark_anxiety,
            lily_fear: s.lily_fear,
            in_crisis: s.in_crisis(),
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

/// The moment the debrief leads with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotalMoment {
    pub pivot_id: String,
    pub timestamp: i64,
    pub description: String,
    pub teaching_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_would_say: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal_chain_id: Option<String>,
}

pub fn pivotal_moment(pivots: &[PivotPoint]) -> Option<PivotalMoment> {
    most_critical_pivot(pivots).map(|p| PivotalMoment {
        pivot_id: p.id.clone(),
        timestamp: p.timestamp,
        description: p.description.clone(),
        teaching_point: p.teaching_point.clone(),
        expert_would_say: p.expert_would_say.clone(),
        causal_chain_id: p.causal_chain_id.clone(),
    })
}

/// The single lesson the learner should take away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheOneThing {
    pub pivot_id: String,
    pub lesson: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_words: Option<String>,
    /// 0–100, from the counterfactual behind the lesson.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preventability: Option<f64>,
}

/// Lesson from the most critical pivot, with words from its counterfactual.
///
/// When the pivot has no counterfactual of its own, the most impactful one
/// supplies the words.
pub fn the_one_thing(
    pivots: &[PivotPoint],
    counterfactuals: &[Counterfactual],
) -> Option<TheOneThing> {
    let pivot = most_critical_pivot(pivots)?;
    let cf = counterfactuals
        .iter()
        .find(|cf| cf.pivot_id == pivot.id)
        .or_else(|| most_impactful_counterfactual(counterfactuals));

    Some(TheOneThing {
        pivot_id: pivot.id.clone(),
        lesson: pivot.teaching_point.clone(),
        exact_words: cf.map(|cf| cf.intervention.exact_words.clone()),
        preventability: cf.map(calculate_preventability_score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counterfactual::{InterventionSpec, OutcomeProjection};
    use crate::pivots::{
        PIVOT_DOSE_ERROR_CAUGHT, PIVOT_NO_WARNING_BEFORE_ASYSTOLE, PIVOT_SIGNIFICANT_UNDERDOSE,
        PivotType, StateImpact,
    };

    fn pivot(id: &str, impact: Impact, pivot_type: PivotType) -> PivotPoint {
        PivotPoint {
            id: id.into(),
            timestamp: 1000,
            pivot_type,
            impact,
            description: format!("{id} description"),
            decision: String::new(),
            alternatives: vec![],
            actual_outcome: String::new(),
            affected_characters: vec![],
            state_impact: StateImpact::default(),
            teaching_point: format!("{id} lesson"),
            expert_would_say: None,
            causal_chain_id: None,
        }
    }

    fn window(impact: Impact, was_missed: bool) -> CommunicationWindow {
        CommunicationWindow {
            id: "w".into(),
            name: "w".into(),
            start_timestamp: 0,
            end_timestamp: 1,
            duration: 1,
            trigger_event_id: String::new(),
            closing_event_id: String::new(),
            optimal_message: String::new(),
            actual_messages: vec![],
            was_missed,
            impact,
            impact_description: String::new(),
        }
    }

    fn counterfactual(pivot_id: &str, words: &str) -> Counterfactual {
        let side = |mark, lily, trust| OutcomeProjection {
            mark_anxiety_peak: mark,
            lily_fear_peak: lily,
            trust_delta: trust,
            outcome: String::new(),
        };
        Counterfactual {
            pivot_id: pivot_id.into(),
            actual: side(3.0, 2.0, -1.0),
            alternative: side(2.0, 1.0, 0.0),
            intervention: InterventionSpec {
                timestamp: 0,
                action: String::new(),
                exact_words: words.into(),
            },
            difference_narrative: String::new(),
        }
    }

    #[test]
    fn test_clean_session_scores() {
        let scores = calculate_scores(&[], &[], &ScoringConfig::default());
        assert_eq!(
            scores,
            Scores {
                clinical: 4.0,
                communication: 4.0,
                overall: 4.0
            }
        );
    }

    #[test]
    fn test_clinical_penalties() {
        let pivots = vec![
            pivot(PIVOT_SIGNIFICANT_UNDERDOSE, Impact::High, PivotType::Error),
            pivot(PIVOT_SKIPPED_VAGAL, Impact::Medium, PivotType::Decision),
        ];

        let scores = calculate_scores(&pivots, &[], &ScoringConfig::default());

        // 4 - 0.5 - 0.3
        assert_eq!(scores.clinical, 3.2);
        // 3.2 * 0.4 + 4 * 0.6
        assert_eq!(scores.overall, 3.7);
    }

    #[test]
    fn test_communication_penalties() {
        let windows = vec![
            window(Impact::Critical, true),
            window(Impact::High, true),
            window(Impact::High, false),
            window(Impact::Low, true),
        ];

        let scores = calculate_scores(&[], &windows, &ScoringConfig::default());

        // 4 - 1.5 - 0.5
        assert_eq!(scores.communication, 2.0);
    }

    #[test]
    fn test_scores_clamp_at_floor() {
        let windows: Vec<_> = (0..5).map(|_| window(Impact::Critical, true)).collect();
        let pivots: Vec<_> = (0..10)
            .map(|i| pivot(&format!("pivot_overdose_{i}"), Impact::High, PivotType::Error))
            .collect();

        let scores = calculate_scores(&pivots, &windows, &ScoringConfig::default());

        assert_eq!(scores.clinical, 1.0);
        assert_eq!(scores.communication, 1.0);
        assert_eq!(scores.overall, 1.0);
    }

    #[test]
    fn test_nurse_catch_does_not_count_as_dosing_pivot() {
        let pivots = vec![pivot(PIVOT_DOSE_ERROR_CAUGHT, Impact::Medium, PivotType::Error)];
        let scores = calculate_scores(&pivots, &[], &ScoringConfig::default());
        assert_eq!(scores.clinical, 4.0);
    }

    #[test]
    fn test_trajectory_sorted_and_flags_crisis() {
        let mut asystole = StateSnapshot::baseline();
        asystole.timestamp = 1200;
        asystole.phase = Phase::Asystole;
        asystole.vitals.hr = 0.0;
        let mut running = StateSnapshot::baseline();
        running.phase = Phase::Running;

        let trajectory = build_trajectory(&[asystole, running]);

        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory[0].timestamp, 0);
        assert!(!trajectory[0].in_crisis);
        assert!(trajectory[1].in_crisis);
    }

    #[test]
    fn test_the_one_thing_uses_matching_counterfactual() {
        let pivots = vec![pivot(
            PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
            Impact::Critical,
            PivotType::MissedOpportunity,
        )];
        let cfs = vec![
            counterfactual(PIVOT_SKIPPED_VAGAL, "blow into the straw"),
            counterfactual(PIVOT_NO_WARNING_BEFORE_ASYSTOLE, "the monitor will go flat"),
        ];

        let one = the_one_thing(&pivots, &cfs).unwrap();

        assert_eq!(one.pivot_id, PIVOT_NO_WARNING_BEFORE_ASYSTOLE);
        assert_eq!(one.lesson, "pivot_no_warning_before_asystole lesson");
        assert_eq!(one.exact_words.as_deref(), Some("the monitor will go flat"));
        assert_eq!(one.preventability, Some(50.0));
    }

    #[test]
    fn test_summaries_absent_without_pivots() {
        assert!(pivotal_moment(&[]).is_none());
        assert!(the_one_thing(&[], &[]).is_none());
    }

    #[test]
    fn test_pivotal_moment_copies_pivot() {
        let mut critical = pivot(
            PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
            Impact::Critical,
            PivotType::MissedOpportunity,
        );
        critical.causal_chain_id = Some("asystole_trauma".into());

        let moment = pivotal_moment(&[critical]).unwrap();

        assert_eq!(moment.pivot_id, PIVOT_NO_WARNING_BEFORE_ASYSTOLE);
        assert_eq!(moment.causal_chain_id.as_deref(), Some("asystole_trauma"));
    }
}
