//! Pivot point detection.
//!
//! A pivot point is a moment in the session worth stopping on in the
//! debrief: a missed chance to prepare the family, a dosing error, a skipped
//! first-line step, or a warning done well.
//!
//! Rules form a closed, ordered registry. Every rule runs on every session
//! and more than one may fire. Each rule pairs static teaching content
//! (description, alternatives, teaching point) with a detector that pulls
//! the session-specific evidence out of the timeline and windows.
//!
//! Registry order:
//!
//! 1. `no_warning_before_asystole`
//! 2. `silence_during_asystole`
//! 3. `skipped_vagal`
//! 4. `no_cardioversion_warning`
//! 5. `no_post_conversion_ack`
//! 6. `dose_error_caught`
//! 7. `significant_underdose`
//! 8. `good_warning_given`

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::PivotConfig;
use crate::timeline::{TimelineEvent, vocabulary};
use crate::types::{Actor, EventType, Impact, Phase, format_seconds, round1};
use crate::windows::{
    CommunicationWindow, DURING_ASYSTOLE, POST_CONVERSION_ACK, PRE_ADENOSINE_WARNING,
    PRE_CARDIOVERSION_WARNING, find_window,
};

pub const PIVOT_NO_WARNING_BEFORE_ASYSTOLE: &str = "pivot_no_warning_before_asystole";
pub const PIVOT_SILENCE_DURING_ASYSTOLE: &str = "pivot_silence_during_asystole";
pub const PIVOT_SKIPPED_VAGAL: &str = "pivot_skipped_vagal";
pub const PIVOT_NO_CARDIOVERSION_WARNING: &str = "pivot_no_cardioversion_warning";
pub const PIVOT_NO_POST_CONVERSION_ACK: &str = "pivot_no_post_conversion_ack";
pub const PIVOT_DOSE_ERROR_CAUGHT: &str = "pivot_dose_error_caught";
pub const PIVOT_SIGNIFICANT_UNDERDOSE: &str = "pivot_significant_underdose";
pub const PIVOT_GOOD_WARNING_GIVEN: &str = "pivot_good_warning_given";

/// What kind of moment a pivot represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotType {
    Decision,
    Error,
    MissedOpportunity,
    Success,
}

impl PivotType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Error => "error",
            Self::MissedOpportunity => "missed_opportunity",
            Self::Success => "success",
        }
    }
}

/// Another course of action the learner could have taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub action: String,
    pub rationale: String,
    pub expected_outcome: String,
    pub is_preferred_practice: bool,
}

/// How much a pivot moved the family's emotional state. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateImpact {
    pub mark_anxiety_delta: f64,
    pub lily_fear_delta: f64,
}

/// A rule-detected moment of educational significance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotPoint {
    /// `pivot_<rule id>`; unique within one evaluation.
    pub id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub pivot_type: PivotType,
    pub impact: Impact,
    pub description: String,
    pub decision: String,
    pub alternatives: Vec<Alternative>,
    pub actual_outcome: String,
    pub affected_characters: Vec<Actor>,
    pub state_impact: StateImpact,
    pub teaching_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_would_say: Option<String>,
    /// Id of the causal chain this pivot triggered, set by the chain builder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal_chain_id: Option<String>,
}

/// Session-specific evidence extracted by a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotEvidence {
    pub timestamp: i64,
    pub decision: String,
    pub actual_outcome: String,
    pub affected_characters: Vec<Actor>,
    pub state_impact: StateImpact,
}

/// Everything a rule may look at.
struct RuleContext<'a> {
    timeline: &'a [TimelineEvent],
    windows: &'a [CommunicationWindow],
    config: &'a PivotConfig,
}

struct AlternativeSpec {
    action: &'static str,
    rationale: &'static str,
    expected_outcome: &'static str,
    is_preferred_practice: bool,
}

impl AlternativeSpec {
    fn to_alternative(&self) -> Alternative {
        Alternative {
            action: self.action.to_string(),
            rationale: self.rationale.to_string(),
            expected_outcome: self.expected_outcome.to_string(),
            is_preferred_practice: self.is_preferred_practice,
        }
    }
}

struct PivotRule {
    id: &'static str,
    pivot_type: PivotType,
    impact: Impact,
    description: &'static str,
    alternatives: &'static [AlternativeSpec],
    teaching_point: &'static str,
    expert_would_say: Option<&'static str>,
    detect: fn(&RuleContext<'_>) -> Option<PivotEvidence>,
}

impl PivotRule {
    fn pivot_id(&self) -> String {
        format!("pivot_{}", self.id)
    }

    fn build(&self, evidence: PivotEvidence) -> PivotPoint {
        PivotPoint {
            id: self.pivot_id(),
            timestamp: evidence.timestamp,
            pivot_type: self.pivot_type,
            impact: self.impact,
            description: self.description.to_string(),
            decision: evidence.decision,
            alternatives: self
                .alternatives
                .iter()
                .map(AlternativeSpec::to_alternative)
                .collect(),
            actual_outcome: evidence.actual_outcome,
            affected_characters: evidence.affected_characters,
            state_impact: evidence.state_impact,
            teaching_point: self.teaching_point.to_string(),
            expert_would_say: self.expert_would_say.map(str::to_string),
            causal_chain_id: None,
        }
    }
}

const PIVOT_RULES: &[PivotRule] = &[
    PivotRule {
        id: "no_warning_before_asystole",
        pivot_type: PivotType::MissedOpportunity,
        impact: Impact::Critical,
        description: "Adenosine was given without preparing the family for the expected asystole.",
        alternatives: &[
            AlternativeSpec {
                action: "Warn Mark before the push that the monitor will go flat for a few \
                    seconds",
                rationale: "A predicted pause reads as the treatment working; an unpredicted \
                    one reads as death.",
                expected_outcome: "Mark stays at the bedside and keeps Lily calm through the \
                    pause.",
                is_preferred_practice: true,
            },
            AlternativeSpec {
                action: "Ask the nurse to stand with Mark and narrate while you push",
                rationale: "Delegating the explanation still gets it said when your hands \
                    are busy.",
                expected_outcome: "Mark is frightened but not blindsided.",
                is_preferred_practice: false,
            },
        ],
        teaching_point: "Adenosine causes a brief, expected asystole. Always tell the family what \
            they are about to see before you push it.",
        expert_would_say: Some(
            "Mr. Henderson, when I give this medicine the monitor will go flat for a few seconds. \
             That's expected. It means the medicine is resetting her heart.",
        ),
        detect: detect_no_warning_before_asystole,
    },
    PivotRule {
        id: "silence_during_asystole",
        pivot_type: PivotType::MissedOpportunity,
        impact: Impact::High,
        description: "The flat line passed without the learner talking the family through it.",
        alternatives: &[AlternativeSpec {
            action: "Narrate the pause out loud while watching the monitor",
            rationale: "A calm voice during the scariest seconds anchors the room.",
            expected_outcome: "Mark's anxiety plateaus instead of spiking.",
            is_preferred_practice: true,
        }],
        teaching_point: "Silence during a crisis is filled with the worst interpretation. \
            Keep talking while the monitor is flat.",
        expert_would_say: Some(
            "This is the pause we expected. Watch with me, her heart will restart.",
        ),
        detect: detect_silence_during_asystole,
    },
    PivotRule {
        id: "skipped_vagal",
        pivot_type: PivotType::Decision,
        impact: Impact::Medium,
        description: "Adenosine was chosen before any vagal manoeuvre was tried.",
        alternatives: &[
            AlternativeSpec {
                action: "Try a modified Valsalva manoeuvre first",
                rationale: "Vagal manoeuvres convert a meaningful share of stable SVT \
                    without drugs.",
                expected_outcome: "Possible conversion with no asystole and no IV push.",
                is_preferred_practice: true,
            },
            AlternativeSpec {
                action: "Apply ice to the face",
                rationale: "The diving reflex is effective in young children.",
                expected_outcome: "Possible conversion while adenosine is drawn up.",
                is_preferred_practice: false,
            },
        ],
        teaching_point: "In a stable child with SVT, vagal manoeuvres come before adenosine.",
        expert_would_say: Some("Lily, can you blow into this straw as hard as you can for me?"),
        detect: detect_skipped_vagal,
    },
    PivotRule {
        id: "no_cardioversion_warning",
        pivot_type: PivotType::MissedOpportunity,
        impact: Impact::High,
        description: "Sedation and cardioversion went ahead without preparing the family.",
        alternatives: &[AlternativeSpec {
            action: "Explain sedation and the shock before starting",
            rationale: "A body jumping under a shock looks violent unless the family expects it.",
            expected_outcome: "Mark understands the procedure and trusts the team.",
            is_preferred_practice: true,
        }],
        teaching_point: "Before electrical cardioversion, tell the family she will be asleep, \
            will not feel it, and that her body may jump.",
        expert_would_say: Some(
            "She'll be asleep and won't feel anything. When we deliver the shock her body may \
             jump. That's normal.",
        ),
        detect: detect_no_cardioversion_warning,
    },
    PivotRule {
        id: "no_post_conversion_ack",
        pivot_type: PivotType::MissedOpportunity,
        impact: Impact::Low,
        description: "Conversion to sinus rhythm was not acknowledged to the family.",
        alternatives: &[AlternativeSpec {
            action: "Tell Mark and Lily that the rhythm is back to normal",
            rationale: "The family cannot read the monitor; closing the loop ends the \
                crisis for them.",
            expected_outcome: "Mark relaxes and Lily settles.",
            is_preferred_practice: true,
        }],
        teaching_point: "Close the loop: announce when the danger has passed.",
        expert_would_say: Some("Her heart is back in a normal rhythm. You did great."),
        detect: detect_no_post_conversion_ack,
    },
    PivotRule {
        id: "dose_error_caught",
        pivot_type: PivotType::Error,
        impact: Impact::Medium,
        description: "An out-of-policy order was intercepted by the nurse.",
        alternatives: &[AlternativeSpec {
            action: "Calculate the weight-based dose aloud and have the nurse read it back",
            rationale: "Closed-loop dose checks catch errors before they reach the syringe.",
            expected_outcome: "The correct dose is given on the first order.",
            is_preferred_practice: true,
        }],
        teaching_point: "Say the weight-based calculation out loud and ask for a read-back.",
        expert_would_say: Some(
            "She's 18 kilos, so 0.1 per kilo is 1.8 milligrams. Can you read that back?",
        ),
        detect: detect_dose_error_caught,
    },
    PivotRule {
        id: "significant_underdose",
        pivot_type: PivotType::Error,
        impact: Impact::High,
        description: "Adenosine was given well below the weight-based dose.",
        alternatives: &[AlternativeSpec {
            action: "Give 0.1 mg/kg rapid push with an immediate saline flush",
            rationale: "Adenosine has a half-life of seconds; an underdose rarely reaches \
                the heart in effect.",
            expected_outcome: "A single push converts the rhythm.",
            is_preferred_practice: true,
        }],
        teaching_point: "An underdosed adenosine push exposes the child to the procedure without \
            the benefit. Dose by weight and flush fast.",
        expert_would_say: None,
        detect: detect_significant_underdose,
    },
    PivotRule {
        id: "good_warning_given",
        pivot_type: PivotType::Success,
        impact: Impact::Low,
        description: "The family was warned before adenosine.",
        alternatives: &[],
        teaching_point: "Preparing the family before adenosine turns a terrifying moment into \
            an expected one.",
        expert_would_say: None,
        detect: detect_good_warning_given,
    },
];

/// Run every pivot rule and return the fired pivots sorted by impact.
///
/// The sort is stable, so pivots of equal impact keep registry order.
pub fn detect_pivot_points(
    timeline: &[TimelineEvent],
    windows: &[CommunicationWindow],
    config: &PivotConfig,
) -> Vec<PivotPoint> {
    let ctx = RuleContext {
        timeline,
        windows,
        config,
    };

    let mut pivots: Vec<PivotPoint> = PIVOT_RULES
        .iter()
        .filter_map(|rule| {
            let evidence = (rule.detect)(&ctx)?;
            trace!(rule = rule.id, timestamp = evidence.timestamp, "Pivot rule fired");
            Some(rule.build(evidence))
        })
        .collect();

    pivots.sort_by_key(|p| p.impact.rank());

    debug!(fired = pivots.len(), "Detected pivot points");
    pivots
}

/// The single moment the debrief should lead with.
///
/// Prefers a critical missed opportunity, then the highest-ranked pivot.
pub fn most_critical_pivot(pivots: &[PivotPoint]) -> Option<&PivotPoint> {
    pivots
        .iter()
        .find(|p| p.impact == Impact::Critical && p.pivot_type == PivotType::MissedOpportunity)
        .or_else(|| pivots.first())
}

/// Find a pivot by id.
pub fn find_pivot<'a>(pivots: &'a [PivotPoint], id: &str) -> Option<&'a PivotPoint> {
    pivots.iter().find(|p| p.id == id)
}

// ============================================================================
// Rule detectors
// ============================================================================

fn detect_no_warning_before_asystole(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let window = find_window(ctx.windows, PRE_ADENOSINE_WARNING).filter(|w| w.was_missed)?;
    let asystole = ctx
        .timeline
        .iter()
        .find(|e| e.is_transition_into(Phase::Asystole))?;
    let recovery = ctx
        .timeline
        .iter()
        .find(|e| e.timestamp > asystole.timestamp && e.is_transition_out_of(Phase::Asystole))
        .map_or(i64::MAX, |e| e.timestamp);

    let actual_outcome = if window.actual_messages.is_empty() {
        format!(
            "Mark watched the monitor go flat at {} with no warning at all.",
            format_seconds(asystole.timestamp)
        )
    } else {
        format!(
            "The learner spoke {} time(s) before the push but never explained the pause; \
             the monitor went flat at {}.",
            window.actual_messages.len(),
            format_seconds(asystole.timestamp)
        )
    };

    Some(PivotEvidence {
        timestamp: window.end_timestamp,
        decision: "Pushed adenosine without telling Mark the heart would pause.".to_string(),
        actual_outcome,
        affected_characters: vec![Actor::Learner, Actor::Mark, Actor::Lily],
        state_impact: state_impact_between(ctx.timeline, asystole.timestamp, recovery),
    })
}

fn detect_silence_during_asystole(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let window = find_window(ctx.windows, DURING_ASYSTOLE).filter(|w| w.was_missed)?;

    let actual_outcome = if window.actual_messages.is_empty() {
        format!(
            "{} of flat line passed without a word to the family.",
            format_seconds(window.duration)
        )
    } else {
        format!(
            "The learner spoke {} time(s) during the pause but never explained it.",
            window.actual_messages.len()
        )
    };

    Some(PivotEvidence {
        timestamp: window.start_timestamp,
        decision: "Stayed silent while the monitor showed asystole.".to_string(),
        actual_outcome,
        affected_characters: vec![Actor::Mark, Actor::Lily],
        state_impact: state_impact_between(
            ctx.timeline,
            window.start_timestamp,
            window.end_timestamp,
        ),
    })
}

fn detect_skipped_vagal(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let adenosine = ctx
        .timeline
        .iter()
        .find(|e| e.is_action_where(vocabulary::is_adenosine))?;
    let tried_vagal = ctx.timeline.iter().any(|e| {
        e.timestamp < adenosine.timestamp && e.is_action_where(vocabulary::is_vagal)
    });
    if tried_vagal {
        return None;
    }

    Some(PivotEvidence {
        timestamp: adenosine.timestamp,
        decision: "Went straight to adenosine.".to_string(),
        actual_outcome: format!(
            "Adenosine was the first treatment, given at {}; no vagal manoeuvre was attempted.",
            format_seconds(adenosine.timestamp)
        ),
        affected_characters: vec![Actor::Learner, Actor::Lily],
        state_impact: state_impact_between(ctx.timeline, adenosine.timestamp, adenosine.timestamp),
    })
}

fn detect_no_cardioversion_warning(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let window = find_window(ctx.windows, PRE_CARDIOVERSION_WARNING).filter(|w| w.was_missed)?;

    Some(PivotEvidence {
        timestamp: window.end_timestamp,
        decision: "Proceeded to cardioversion without explaining it.".to_string(),
        actual_outcome: format!(
            "The shock at {} came without any explanation to Mark.",
            format_seconds(window.end_timestamp)
        ),
        affected_characters: vec![Actor::Mark, Actor::Lily],
        state_impact: state_impact_between(
            ctx.timeline,
            window.start_timestamp,
            window.end_timestamp,
        ),
    })
}

fn detect_no_post_conversion_ack(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let window = find_window(ctx.windows, POST_CONVERSION_ACK).filter(|w| w.was_missed)?;

    Some(PivotEvidence {
        timestamp: window.start_timestamp,
        decision: "Did not tell the family the rhythm had converted.".to_string(),
        actual_outcome: "The family was left reading the monitor to find out whether it was over."
            .to_string(),
        affected_characters: vec![Actor::Mark],
        state_impact: state_impact_between(
            ctx.timeline,
            window.start_timestamp,
            window.end_timestamp,
        ),
    })
}

fn detect_dose_error_caught(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let catches: Vec<&TimelineEvent> = ctx
        .timeline
        .iter()
        .filter(|e| e.event_type == EventType::NurseCatch)
        .collect();
    let first = catches.first()?;

    let drug = first.metadata.intervention.as_deref().unwrap_or("medication");
    let decision = match first.metadata.dose {
        Some(dose) => format!(
            "Ordered {drug} {dose}{}.",
            first.metadata.unit.as_deref().unwrap_or("")
        ),
        None => format!("Ordered {drug} outside policy."),
    };
    let reason = first
        .metadata
        .reason
        .as_deref()
        .unwrap_or("the order was outside policy");
    let actual_outcome = if catches.len() == 1 {
        format!("The nurse refused the order: {reason}.")
    } else {
        format!(
            "The nurse refused {} orders; the first because {reason}.",
            catches.len()
        )
    };

    Some(PivotEvidence {
        timestamp: first.timestamp,
        decision,
        actual_outcome,
        affected_characters: vec![Actor::Learner, Actor::Nurse],
        state_impact: StateImpact::default(),
    })
}

fn detect_significant_underdose(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    ctx.timeline
        .iter()
        .filter(|e| e.is_action_where(vocabulary::is_adenosine))
        .find_map(|e| {
            let dose = e.metadata.dose?;
            let correct = e.metadata.correct.filter(|c| *c > 0.0)?;
            let ratio = dose / correct;
            if !(ratio < ctx.config.underdose_ratio) {
                return None;
            }

            let unit = e.metadata.unit.as_deref().unwrap_or("");
            let percent = (ratio * 100.0).round();
            Some(PivotEvidence {
                timestamp: e.timestamp,
                decision: format!(
                    "Gave adenosine {dose}{unit} against a weight-based dose of {correct}{unit} \
                     ({percent}%)."
                ),
                actual_outcome: format!(
                    "At {percent}% of the target dose the push was unlikely to convert the rhythm, \
                     committing Lily to a repeat dose."
                ),
                affected_characters: vec![Actor::Learner, Actor::Lily],
                state_impact: state_impact_between(ctx.timeline, e.timestamp, e.timestamp),
            })
        })
}

fn detect_good_warning_given(ctx: &RuleContext<'_>) -> Option<PivotEvidence> {
    let window = find_window(ctx.windows, PRE_ADENOSINE_WARNING).filter(|w| !w.was_missed)?;
    let warning = window
        .actual_messages
        .iter()
        .find(|m| vocabulary::is_explanatory(m))?;
    let timestamp = ctx
        .timeline
        .iter()
        .find(|e| {
            e.is_explanatory()
                && e.timestamp >= window.start_timestamp
                && e.timestamp <= window.end_timestamp
        })
        .map_or(window.start_timestamp, |e| e.timestamp);

    Some(PivotEvidence {
        timestamp,
        decision: "Warned Mark before giving adenosine.".to_string(),
        actual_outcome: format!("Said: \"{warning}\""),
        affected_characters: vec![Actor::Learner, Actor::Mark],
        state_impact: StateImpact::default(),
    })
}

/// Rise in Mark's anxiety and Lily's fear across `[start, end]`.
///
/// Measured from the state before the first event in range to the peak
/// state after any event in range; drops count as zero.
fn state_impact_between(timeline: &[TimelineEvent], start: i64, end: i64) -> StateImpact {
    let mut in_range = timeline
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .peekable();
    let Some(first) = in_range.peek() else {
        return StateImpact::default();
    };

    let base_anxiety = first.state_before.mark_anxiety;
    let base_fear = first.state_before.lily_fear;
    let (peak_anxiety, peak_fear) = in_range.fold((base_anxiety, base_fear), |(a, f), e| {
        (a.max(e.state_after.mark_anxiety), f.max(e.state_after.lily_fear))
    });

    StateImpact {
        mark_anxiety_delta: round1((peak_anxiety - base_anxiety).max(0.0)),
        lily_fear_delta: round1((peak_fear - base_fear).max(0.0)),
    }
}
