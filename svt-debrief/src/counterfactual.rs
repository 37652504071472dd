//! Counterfactual ("what if") projections.
//!
//! For pivots with a known model, compare what actually happened to the
//! family against what a prepared, well-timed intervention would have
//! produced. The actual side is measured from the timeline; the alternative
//! side is hand-authored from clinical experience and is not computed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CounterfactualConfig;
use crate::pivots::{
    PIVOT_NO_CARDIOVERSION_WARNING, PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
    PIVOT_SIGNIFICANT_UNDERDOSE, PIVOT_SILENCE_DURING_ASYSTOLE, PIVOT_SKIPPED_VAGAL, PivotPoint,
};
use crate::timeline::{StateSnapshot, TimelineEvent};
use crate::types::Phase;

/// One side of a counterfactual comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeProjection {
    pub mark_anxiety_peak: f64,
    pub lily_fear_peak: f64,
    /// Signed change in Mark's trust in the learner.
    pub trust_delta: f64,
    pub outcome: String,
}

/// What should have been done instead, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionSpec {
    pub timestamp: i64,
    pub action: String,
    pub exact_words: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterfactual {
    pub pivot_id: String,
    pub actual: OutcomeProjection,
    pub alternative: OutcomeProjection,
    pub intervention: InterventionSpec,
    pub difference_narrative: String,
}

/// Peak of one emotional measure over the timeline.
struct PeakSpec {
    /// Lower bound for the peak, also used when nothing matches.
    floor: f64,
    /// Only consider events whose resulting phase is this one.
    phase: Option<Phase>,
}

impl PeakSpec {
    fn measure(&self, timeline: &[TimelineEvent], value: fn(&StateSnapshot) -> f64) -> f64 {
        timeline
            .iter()
            .filter(|e| self.phase.is_none_or(|p| e.state_after.phase == p))
            .map(|e| value(&e.state_after))
            .fold(self.floor, f64::max)
    }
}

struct ActualModel {
    mark_anxiety: PeakSpec,
    lily_fear: PeakSpec,
    trust_delta: f64,
    outcome: &'static str,
}

impl ActualModel {
    fn evaluate(&self, timeline: &[TimelineEvent]) -> OutcomeProjection {
        OutcomeProjection {
            mark_anxiety_peak: self.mark_anxiety.measure(timeline, |s| s.mark_anxiety),
            lily_fear_peak: self.lily_fear.measure(timeline, |s| s.lily_fear),
            trust_delta: self.trust_delta,
            outcome: self.outcome.to_string(),
        }
    }
}

struct AlternativeModel {
    mark_anxiety_peak: f64,
    lily_fear_peak: f64,
    trust_delta: f64,
    outcome: &'static str,
}

impl AlternativeModel {
    fn projection(&self) -> OutcomeProjection {
        OutcomeProjection {
            mark_anxiety_peak: self.mark_anxiety_peak,
            lily_fear_peak: self.lily_fear_peak,
            trust_delta: self.trust_delta,
            outcome: self.outcome.to_string(),
        }
    }
}

struct CounterfactualModel {
    pivot_id: &'static str,
    actual: ActualModel,
    alternative: AlternativeModel,
    action: &'static str,
    exact_words: &'static str,
    /// Opening sentence of the difference narrative.
    lead: &'static str,
}

const COUNTERFACTUAL_MODELS: &[CounterfactualModel] = &[
    CounterfactualModel {
        pivot_id: PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
        actual: ActualModel {
            mark_anxiety: PeakSpec { floor: 3.0, phase: None },
            lily_fear: PeakSpec { floor: 2.0, phase: Some(Phase::Asystole) },
            trust_delta: -3.0,
            outcome: "Mark panicked at the flat line and lost confidence in the team.",
        },
        alternative: AlternativeModel {
            mark_anxiety_peak: 2.0,
            lily_fear_peak: 1.0,
            trust_delta: 0.0,
            outcome: "Mark watched the pause knowing it was expected and kept Lily calm.",
        },
        action: "Warn Mark about the expected pause before pushing adenosine.",
        exact_words: "Mr. Henderson, when I give this medicine the monitor will go flat for a \
            few seconds. That's expected. It means the medicine is working.",
        lead: "With a warning, the flat line would have confirmed the plan instead of \
            shattering it.",
    },
    CounterfactualModel {
        pivot_id: PIVOT_SILENCE_DURING_ASYSTOLE,
        actual: ActualModel {
            mark_anxiety: PeakSpec { floor: 3.0, phase: Some(Phase::Asystole) },
            lily_fear: PeakSpec { floor: 2.0, phase: Some(Phase::Asystole) },
            trust_delta: -2.0,
            outcome: "The family sat through the pause in silence and assumed the worst.",
        },
        alternative: AlternativeModel {
            mark_anxiety_peak: 2.0,
            lily_fear_peak: 1.0,
            trust_delta: 1.0,
            outcome: "A calm voice carried the family through the pause.",
        },
        action: "Narrate the pause while it happens.",
        exact_words: "This is the pause we expected. Watch with me, her heart is about to restart.",
        lead: "A single sentence during the pause would have kept the room steady.",
    },
    CounterfactualModel {
        pivot_id: PIVOT_NO_CARDIOVERSION_WARNING,
        actual: ActualModel {
            mark_anxiety: PeakSpec { floor: 2.0, phase: None },
            lily_fear: PeakSpec { floor: 2.0, phase: None },
            trust_delta: -1.0,
            outcome: "The shock took Mark by surprise.",
        },
        alternative: AlternativeModel {
            mark_anxiety_peak: 1.0,
            lily_fear_peak: 1.0,
            trust_delta: 0.0,
            outcome: "Mark knew what the shock would look like and why it was needed.",
        },
        action: "Explain sedation and cardioversion before starting.",
        exact_words: "We're going to help Lily sleep, then give a small timed shock to reset her \
            heart. She won't feel it, and her body may jump. That's normal.",
        lead: "Explaining the procedure first would have made the shock look like treatment.",
    },
    CounterfactualModel {
        pivot_id: PIVOT_SIGNIFICANT_UNDERDOSE,
        actual: ActualModel {
            mark_anxiety: PeakSpec { floor: 3.0, phase: None },
            lily_fear: PeakSpec { floor: 2.0, phase: None },
            trust_delta: -1.0,
            outcome: "The first push failed and Lily needed another.",
        },
        alternative: AlternativeModel {
            mark_anxiety_peak: 2.0,
            lily_fear_peak: 1.0,
            trust_delta: 0.0,
            outcome: "A full first dose converted the rhythm in one attempt.",
        },
        action: "Calculate the weight-based dose aloud and confirm with a read-back.",
        exact_words: "She weighs 18 kilos, so the dose is 1.8 milligrams. Please read that \
            back to me.",
        lead: "Getting the dose right the first time would have spared the family a second cycle.",
    },
    CounterfactualModel {
        pivot_id: PIVOT_SKIPPED_VAGAL,
        actual: ActualModel {
            mark_anxiety: PeakSpec { floor: 2.0, phase: None },
            lily_fear: PeakSpec { floor: 2.0, phase: None },
            trust_delta: 0.0,
            outcome: "Lily went straight to an IV drug.",
        },
        alternative: AlternativeModel {
            mark_anxiety_peak: 1.0,
            lily_fear_peak: 1.0,
            trust_delta: 0.0,
            outcome: "A vagal manoeuvre was tried first, possibly avoiding adenosine entirely.",
        },
        action: "Coach Lily through a modified Valsalva manoeuvre.",
        exact_words: "Lily, I need you to blow into this straw as hard as you can, like you're \
            blowing up a balloon.",
        lead: "Starting with a vagal manoeuvre might have ended the episode without a drug.",
    },
];

/// Project actual vs alternative outcomes for every modelled pivot.
///
/// Pivots without a model are skipped.
pub fn generate_counterfactuals(
    pivots: &[PivotPoint],
    timeline: &[TimelineEvent],
    config: &CounterfactualConfig,
) -> Vec<Counterfactual> {
    let counterfactuals: Vec<_> = pivots
        .iter()
        .filter_map(|pivot| {
            let model = COUNTERFACTUAL_MODELS
                .iter()
                .find(|m| m.pivot_id == pivot.id)?;
            Some(project(model, pivot, timeline, config))
        })
        .collect();

    debug!(
        generated = counterfactuals.len(),
        "Generated counterfactuals"
    );
    counterfactuals
}

fn project(
    model: &CounterfactualModel,
    pivot: &PivotPoint,
    timeline: &[TimelineEvent],
    config: &CounterfactualConfig,
) -> Counterfactual {
    let actual = model.actual.evaluate(timeline);
    let alternative = model.alternative.projection();
    let difference_narrative = format!(
        "{} Mark's anxiety would have peaked at {} instead of {}, Lily's fear at {} instead of {}, \
         and trust would have moved by {:+} instead of {:+}.",
        model.lead,
        alternative.mark_anxiety_peak,
        actual.mark_anxiety_peak,
        alternative.lily_fear_peak,
        actual.lily_fear_peak,
        alternative.trust_delta,
        actual.trust_delta,
    );

    Counterfactual {
        pivot_id: pivot.id.clone(),
        actual,
        alternative,
        intervention: InterventionSpec {
            timestamp: pivot.timestamp - config.intervention_lead_ms,
            action: model.action.to_string(),
            exact_words: model.exact_words.to_string(),
        },
        difference_narrative,
    }
}

/// The counterfactual with the largest gap between actual and alternative.
///
/// Score is |Δ anxiety| + |Δ fear| + 2·|Δ trust|; ties keep array order.
pub fn most_impactful_counterfactual(
    counterfactuals: &[Counterfactual],
) -> Option<&Counterfactual> {
    let score = |cf: &Counterfactual| {
        (cf.actual.mark_anxiety_peak - cf.alternative.mark_anxiety_peak).abs()
            + (cf.actual.lily_fear_peak - cf.alternative.lily_fear_peak).abs()
            + (cf.actual.trust_delta - cf.alternative.trust_delta).abs() * 2.0
    };

    counterfactuals
        .iter()
        .reduce(|best, cf| if score(cf) > score(best) { cf } else { best })
}

/// How preventable the actual outcome was, from 0 to 100.
pub fn calculate_preventability_score(cf: &Counterfactual) -> f64 {
    let anxiety_prevented = cf.actual.mark_anxiety_peak - cf.alternative.mark_anxiety_peak;
    let fear_prevented = cf.actual.lily_fear_peak - cf.alternative.lily_fear_peak;
    let trust_saved = cf.alternative.trust_delta - cf.actual.trust_delta;

    ((anxiety_prevented + fear_prevented) * 15.0 + trust_saved * 20.0)
        .clamp(0.0, 100.0)
        .round()
}
