//! Causal chain construction.
//!
//! For selected pivots, expand a fixed narrative template into a
//! cause → effect chain anchored to real timeline events, so the debrief
//! can show how one decision cascaded into what the family experienced.
//!
//! ```text
//! root cause ──link 0──→ relevant[0] ──link 1──→ relevant[1] ──→ ...
//!              ▲
//!              └─ breakpoint: where an intervention would have cut the chain
//! ```
//!
//! A chain always has exactly as many links as its template declares. When
//! fewer relevant events are found, the missing endpoints get placeholder
//! ids `synthetic_0`, `synthetic_1`, ... in slot order.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::CausalConfig;
use crate::pivots::{
    PIVOT_NO_WARNING_BEFORE_ASYSTOLE, PIVOT_SIGNIFICANT_UNDERDOSE, PIVOT_SILENCE_DURING_ASYSTOLE,
    PIVOT_SKIPPED_VAGAL, PivotPoint,
};
use crate::timeline::{TimelineEvent, vocabulary};
use crate::types::{Actor, EventType, Phase, StateTrigger, format_seconds};

/// Most relevant events a template scan returns.
const MAX_RELEVANT_EVENTS: usize = 3;

/// Root cause id when the timeline is empty.
const UNKNOWN_ROOT_CAUSE: &str = "unknown";

/// One cause → effect step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalLink {
    pub from_event_id: String,
    pub to_event_id: String,
    pub mechanism: String,
}

/// A point where an intervention would have broken the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub after_event_id: String,
    pub intervention: String,
    /// How events would have unfolded instead.
    pub alternative_chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalChain {
    pub id: String,
    pub name: String,
    pub root_cause_event_id: String,
    pub links: Vec<CausalLink>,
    pub final_effect: String,
    pub breakpoints: Vec<Breakpoint>,
    pub narrative_summary: String,
}

struct LinkSpec {
    from: &'static str,
    to: &'static str,
    mechanism: &'static str,
}

struct BreakpointSpec {
    /// Index of the link whose source the breakpoint sits after.
    after_link: usize,
    intervention: &'static str,
    alternative_chain: &'static [&'static str],
}

struct ChainTemplate {
    id: &'static str,
    name: &'static str,
    trigger_pivot_id: &'static str,
    links: &'static [LinkSpec],
    final_effect: &'static str,
    breakpoint: BreakpointSpec,
    narrative: &'static str,
    relevant_events: fn(i64, &[TimelineEvent]) -> Vec<String>,
}

const CHAIN_TEMPLATES: &[ChainTemplate] = &[
    ChainTemplate {
        id: "asystole_trauma",
        name: "Unwarned asystole to parental trauma",
        trigger_pivot_id: PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
        links: &[
            LinkSpec {
                from: "adenosine_push",
                to: "flatline",
                mechanism: "Adenosine blocks the AV node and the monitor shows asystole.",
            },
            LinkSpec {
                from: "flatline",
                to: "parent_outburst",
                mechanism: "Mark, unprepared, reads the flat line as his daughter dying.",
            },
            LinkSpec {
                from: "parent_outburst",
                to: "anxiety_spike",
                mechanism: "His panic peaks and fills the room, and Lily hears it.",
            },
        ],
        final_effect: "Mark's trust in the team collapses and Lily's fear rises with his.",
        breakpoint: BreakpointSpec {
            after_link: 0,
            intervention: "A ten-second warning to Mark before the push.",
            alternative_chain: &[
                "Mark is told the monitor will pause",
                "The flat line confirms what he was told",
                "Mark stays calm and holds Lily's hand",
            ],
        },
        narrative: "adenosine was pushed without a warning. The expected pause looked like \
            death to an unprepared father, and his panic became the defining memory of the \
            resuscitation.",
        relevant_events: asystole_trauma_events,
    },
    ChainTemplate {
        id: "silent_flatline",
        name: "Silence during the pause",
        trigger_pivot_id: PIVOT_SILENCE_DURING_ASYSTOLE,
        links: &[
            LinkSpec {
                from: "flatline",
                to: "silence",
                mechanism: "The monitor goes flat and nobody speaks.",
            },
            LinkSpec {
                from: "silence",
                to: "worst_case",
                mechanism: "Mark fills the silence with the worst interpretation.",
            },
            LinkSpec {
                from: "worst_case",
                to: "fear_transfer",
                mechanism: "Lily reads her father's face and her fear climbs.",
            },
        ],
        final_effect: "The family remembers the pause as abandonment rather than treatment.",
        breakpoint: BreakpointSpec {
            after_link: 1,
            intervention: "One calm sentence: this pause is what we expected.",
            alternative_chain: &[
                "Mark hears the pause named as expected",
                "He watches the monitor with the learner",
                "Lily takes her cue from a calm father",
            ],
        },
        narrative: "the monitor went flat and the room went quiet. Every second without an \
            explanation pushed the family further toward the worst conclusion.",
        relevant_events: no_relevant_events,
    },
    ChainTemplate {
        id: "vagal_bypass",
        name: "Skipped vagal manoeuvres",
        trigger_pivot_id: PIVOT_SKIPPED_VAGAL,
        links: &[
            LinkSpec {
                from: "first_line_skipped",
                to: "adenosine_push",
                mechanism: "Without a vagal attempt, the first treatment is an IV drug.",
            },
            LinkSpec {
                from: "adenosine_push",
                to: "avoidable_asystole",
                mechanism: "Adenosine brings an asystole a successful Valsalva would have avoided.",
            },
        ],
        final_effect: "Lily is exposed to a frightening drug effect that may not have been needed.",
        breakpoint: BreakpointSpec {
            after_link: 0,
            intervention: "Try a modified Valsalva manoeuvre before drawing up adenosine.",
            alternative_chain: &[
                "Lily blows into a syringe with her legs raised",
                "The rhythm may convert without any drug",
            ],
        },
        narrative: "treatment started with adenosine. A stable child should have been offered \
            a vagal manoeuvre first.",
        relevant_events: no_relevant_events,
    },
    ChainTemplate {
        id: "underdose_cascade",
        name: "Underdose cascade",
        trigger_pivot_id: PIVOT_SIGNIFICANT_UNDERDOSE,
        links: &[
            LinkSpec {
                from: "underdose",
                to: "no_conversion",
                mechanism: "A sub-therapeutic push fails to block the AV node.",
            },
            LinkSpec {
                from: "no_conversion",
                to: "repeat_dose",
                mechanism: "SVT persists and a second push is needed.",
            },
            LinkSpec {
                from: "repeat_dose",
                to: "prolonged_distress",
                mechanism: "Each extra push extends the time Lily spends in SVT and Mark \
                    spends afraid.",
            },
        ],
        final_effect: "The resuscitation runs longer and the family endures an extra \
            cycle of fear.",
        breakpoint: BreakpointSpec {
            after_link: 0,
            intervention: "Calculate 0.1 mg/kg aloud and confirm with a read-back.",
            alternative_chain: &[
                "The first push is a full dose",
                "The rhythm converts on the first attempt",
            ],
        },
        narrative: "adenosine was given well under the weight-based dose. The push could not \
            work, and everything after it was spent recovering from that.",
        relevant_events: no_relevant_events,
    },
];

/// Build the causal chain for every template whose trigger pivot fired.
///
/// Writes the chain id back onto the triggering pivot's `causal_chain_id`.
pub fn build_causal_chains(
    pivots: &mut [PivotPoint],
    timeline: &[TimelineEvent],
    config: &CausalConfig,
) -> Vec<CausalChain> {
    let mut chains = Vec::new();

    for template in CHAIN_TEMPLATES {
        let Some(pivot) = pivots.iter_mut().find(|p| p.id == template.trigger_pivot_id) else {
            continue;
        };

        let chain = build_chain(template, pivot.timestamp, timeline, config);
        pivot.causal_chain_id = Some(chain.id.clone());
        chains.push(chain);
    }

    debug!(built = chains.len(), "Built causal chains");
    chains
}

fn build_chain(
    template: &ChainTemplate,
    pivot_timestamp: i64,
    timeline: &[TimelineEvent],
    config: &CausalConfig,
) -> CausalChain {
    let root = root_cause_event_id(timeline, pivot_timestamp, config.root_cause_window_ms);
    let relevant = (template.relevant_events)(pivot_timestamp, timeline);

    // Endpoint 0 is the root cause; endpoint j is relevant[j - 1].
    let endpoint = |j: usize| -> String {
        if j == 0 {
            root.clone()
        } else {
            relevant
                .get(j - 1)
                .cloned()
                .unwrap_or_else(|| format!("synthetic_{}", j - 1))
        }
    };

    let links: Vec<CausalLink> = template
        .links
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let link = CausalLink {
                from_event_id: endpoint(i),
                to_event_id: endpoint(i + 1),
                mechanism: spec.mechanism.to_string(),
            };
            trace!(
                chain = template.id,
                from = spec.from,
                to = spec.to,
                from_event = %link.from_event_id,
                to_event = %link.to_event_id,
                "Resolved causal link"
            );
            link
        })
        .collect();

    let breakpoint = Breakpoint {
        after_event_id: links
            .get(template.breakpoint.after_link)
            .map_or_else(|| root.clone(), |l| l.from_event_id.clone()),
        intervention: template.breakpoint.intervention.to_string(),
        alternative_chain: template
            .breakpoint
            .alternative_chain
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    CausalChain {
        id: template.id.to_string(),
        name: template.name.to_string(),
        root_cause_event_id: root.clone(),
        links,
        final_effect: template.final_effect.to_string(),
        breakpoints: vec![breakpoint],
        narrative_summary: format!(
            "At {}, {}",
            format_seconds(pivot_timestamp),
            template.narrative
        ),
    }
}

/// The event that most plausibly caused a pivot.
///
/// The nearest action within `window_ms` wins; otherwise the nearest event
/// of any kind. Equidistant candidates resolve to the earlier one in
/// timeline order.
fn root_cause_event_id(timeline: &[TimelineEvent], pivot_timestamp: i64, window_ms: i64) -> String {
    let distance = |e: &&TimelineEvent| e.timestamp.abs_diff(pivot_timestamp);

    timeline
        .iter()
        .filter(|e| e.event_type == EventType::Action)
        .filter(|e| e.timestamp.abs_diff(pivot_timestamp) <= window_ms.unsigned_abs())
        .min_by_key(distance)
        .or_else(|| timeline.iter().min_by_key(distance))
        .map_or_else(|| UNKNOWN_ROOT_CAUSE.to_string(), |e| e.id.clone())
}

/// Events after the pivot that show the trauma unfolding, in slot order:
/// flat line first, then Mark's outburst and his anxiety spike.
fn asystole_trauma_events(pivot_timestamp: i64, timeline: &[TimelineEvent]) -> Vec<String> {
    let after: Vec<&TimelineEvent> = timeline
        .iter()
        .filter(|e| e.timestamp >= pivot_timestamp)
        .collect();

    let flatline = after.iter().find(|e| e.is_transition_into(Phase::Asystole));
    let outburst = after
        .iter()
        .find(|e| e.actor == Actor::Mark && vocabulary::is_alarm_outburst(&e.content));
    let spike = after
        .iter()
        .find(|e| e.has_trigger(StateTrigger::AnxietySpike));

    [flatline, outburst, spike]
        .into_iter()
        .flatten()
        .take(MAX_RELEVANT_EVENTS)
        .map(|e| e.id.clone())
        .collect()
}

fn no_relevant_events(_pivot_timestamp: i64, _timeline: &[TimelineEvent]) -> Vec<String> {
    Vec::new()
}

/// The chain the debrief should feature.
///
/// Score is link count, doubled for trauma chains; ties keep array order.
pub fn most_impactful_chain(chains: &[CausalChain]) -> Option<&CausalChain> {
    let score = |c: &CausalChain| c.links.len() * if c.id.contains("trauma") { 2 } else { 1 };

    chains
        .iter()
        .reduce(|best, c| if score(c) > score(best) { c } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivots::{PivotType, StateImpact};
    use crate::timeline::{EventMetadata, StateSnapshot};
    use crate::types::Impact;

    fn event(id: &str, timestamp: i64, event_type: EventType, actor: Actor) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type,
            actor,
            content: String::new(),
            state_before: StateSnapshot::baseline(),
            state_after: StateSnapshot::baseline(),
            metadata: EventMetadata::default(),
        }
    }

    fn pivot(id: &str, timestamp: i64) -> PivotPoint {
        PivotPoint {
            id: id.into(),
            timestamp,
            pivot_type: PivotType::MissedOpportunity,
            impact: Impact::High,
            description: String::new(),
            decision: String::new(),
            alternatives: vec![],
            actual_outcome: String::new(),
            affected_characters: vec![],
            state_impact: StateImpact::default(),
            teaching_point: String::new(),
            expert_would_say: None,
            causal_chain_id: None,
        }
    }

    fn trauma_timeline() -> Vec<TimelineEvent> {
        let mut flat = event("state_1_phase", 1200, EventType::StateChange, Actor::System);
        flat.state_after.phase = Phase::Asystole;
        flat.metadata.trigger = Some(StateTrigger::PhaseChange);

        let mut spike = event("state_1_anxiety", 1200, EventType::StateChange, Actor::System);
        spike.metadata.trigger = Some(StateTrigger::AnxietySpike);

        let mut outburst = event("msg_3", 1500, EventType::CharacterResponse, Actor::Mark);
        outburst.content = "IT'S FLAT! HER HEART STOPPED!".into();

        vec![
            event("action_0", 1000, EventType::Action, Actor::Learner),
            flat,
            spike,
            outburst,
        ]
    }

    #[test]
    fn test_trauma_chain_anchors_real_events() {
        let timeline = trauma_timeline();
        let mut pivots = vec![pivot(PIVOT_NO_WARNING_BEFORE_ASYSTOLE, 1000)];

        let chains = build_causal_chains(&mut pivots, &timeline, &CausalConfig::default());

        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.id, "asystole_trauma");
        assert_eq!(chain.root_cause_event_id, "action_0");
        let endpoints: Vec<_> = chain
            .links
            .iter()
            .map(|l| (l.from_event_id.as_str(), l.to_event_id.as_str()))
            .collect();
        assert_eq!(
            endpoints,
            vec![
                ("action_0", "state_1_phase"),
                ("state_1_phase", "msg_3"),
                ("msg_3", "state_1_anxiety"),
            ]
        );
        assert_eq!(chain.breakpoints[0].after_event_id, "action_0");
        assert_eq!(pivots[0].causal_chain_id.as_deref(), Some("asystole_trauma"));
    }

    #[test]
    fn test_missing_events_degrade_to_synthetic_ids() {
        let timeline = vec![event("action_0", 1000, EventType::Action, Actor::Learner)];
        let mut pivots = vec![pivot(PIVOT_SIGNIFICANT_UNDERDOSE, 1000)];

        let chains = build_causal_chains(&mut pivots, &timeline, &CausalConfig::default());

        let chain = &chains[0];
        assert_eq!(chain.links.len(), 3);
        assert_eq!(chain.links[0].from_event_id, "action_0");
        assert_eq!(chain.links[0].to_event_id, "synthetic_0");
        assert_eq!(chain.links[1].to_event_id, "synthetic_1");
        assert_eq!(chain.links[2].to_event_id, "synthetic_2");
    }

    #[test]
    fn test_link_count_fixed_even_for_empty_timeline() {
        let mut pivots = vec![
            pivot(PIVOT_NO_WARNING_BEFORE_ASYSTOLE, 0),
            pivot(PIVOT_SKIPPED_VAGAL, 0),
        ];

        let chains = build_causal_chains(&mut pivots, &[], &CausalConfig::default());

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].links.len(), 3);
        assert_eq!(chains[1].links.len(), 2);
        assert_eq!(chains[0].root_cause_event_id, UNKNOWN_ROOT_CAUSE);
    }

    #[test]
    fn test_root_cause_falls_back_to_nearest_event() {
        let timeline = vec![
            event("action_0", 0, EventType::Action, Actor::Learner),
            event("msg_0", 4500, EventType::CharacterResponse, Actor::Mark),
        ];

        assert_eq!(root_cause_event_id(&timeline, 5000, 2000), "msg_0");
        assert_eq!(root_cause_event_id(&timeline, 1500, 2000), "action_0");
    }

    #[test]
    fn test_root_cause_tie_goes_to_first() {
        let timeline = vec![
            event("action_0", 800, EventType::Action, Actor::Learner),
            event("action_1", 1200, EventType::Action, Actor::Learner),
        ];

        assert_eq!(root_cause_event_id(&timeline, 1000, 2000), "action_0");
    }

    #[test]
    fn test_no_chain_without_trigger_pivot() {
        let mut pivots = vec![pivot("pivot_dose_error_caught", 0)];
        let chains = build_causal_chains(&mut pivots, &[], &CausalConfig::default());
        assert!(chains.is_empty());
        assert!(pivots[0].causal_chain_id.is_none());
    }

    #[test]
    fn test_most_impactful_chain_weights_trauma() {
        let mut pivots = vec![
            pivot(PIVOT_SIGNIFICANT_UNDERDOSE, 0),
            pivot(PIVOT_NO_WARNING_BEFORE_ASYSTOLE, 0),
        ];
        let chains = build_causal_chains(&mut pivots, &[], &CausalConfig::default());

        assert_eq!(
            most_impactful_chain(&chains).map(|c| c.id.as_str()),
            Some("asystole_trauma")
        );
    }

    #[test]
    fn test_most_impactful_chain_ties_keep_order() {
        let mut pivots = vec![
            pivot(PIVOT_SIGNIFICANT_UNDERDOSE, 0),
            pivot(PIVOT_SILENCE_DURING_ASYSTOLE, 0),
        ];
        let chains = build_causal_chains(&mut pivots, &[], &CausalConfig::default());

        assert_eq!(
            most_impactful_chain(&chains).map(|c| c.id.as_str()),
            Some("silent_flatline")
        );
        assert!(most_impactful_chain(&[]).is_none());
    }
}
