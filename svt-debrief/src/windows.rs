//! Communication window detection.
//!
//! A communication window is a stretch of session time in which the learner
//! was expected to say something specific to the family: warn Mark before
//! adenosine stops Lily's heart, talk through the flat line, prepare them for
//! cardioversion, and so on.
//!
//! Each window comes from a fixed template with a trigger predicate and a
//! close predicate. A window is reported only when both match; a trigger
//! without a closer is dropped rather than counted as missed.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::timeline::{TimelineEvent, vocabulary};
use crate::types::{Actor, Impact, Phase, StateTrigger};

pub const PRE_ADENOSINE_WARNING: &str = "pre_adenosine_warning";
pub const DURING_ASYSTOLE: &str = "during_asystole";
pub const PRE_CARDIOVERSION_WARNING: &str = "pre_cardioversion_warning";
pub const PARENT_DISTRESS: &str = "parent_distress";
pub const POST_CONVERSION_ACK: &str = "post_conversion_ack";

/// A detected interval where a specific acknowledgment was expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationWindow {
    /// Template id, e.g. `pre_adenosine_warning`.
    pub id: String,
    pub name: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration: i64,
    pub trigger_event_id: String,
    pub closing_event_id: String,
    /// What an expert would have said in this window.
    pub optimal_message: String,
    /// Everything the learner said inside the window.
    pub actual_messages: Vec<String>,
    /// No explanatory learner communication happened inside the window.
    pub was_missed: bool,
    pub impact: Impact,
    pub impact_description: String,
}

struct WindowTemplate {
    id: &'static str,
    name: &'static str,
    opens: fn(&TimelineEvent) -> bool,
    closes: fn(&TimelineEvent) -> bool,
    optimal_message: &'static str,
    impact: Impact,
    impact_description: &'static str,
}

/// Window templates in report order.
const WINDOW_TEMPLATES: &[WindowTemplate] = &[
    WindowTemplate {
        id: PRE_ADENOSINE_WARNING,
        name: "Warning before adenosine",
        opens: |e| e.actor == Actor::Learner || e.state_after.phase == Phase::Running,
        closes: |e| {
            e.is_action_where(vocabulary::is_adenosine) || e.is_transition_into(Phase::Asystole)
        },
        optimal_message: "Mr. Henderson, I'm going to give Lily a medicine that resets her heart. \
            When it works, the monitor will go flat for a few seconds. That pause is expected \
            and it means the medicine is doing its job.",
        impact: Impact::Critical,
        impact_description: "An unprepared parent who watches his daughter's heart stop \
            experiences it as her dying in front of him.",
    },
    WindowTemplate {
        id: DURING_ASYSTOLE,
        name: "Narrating the pause",
        opens: |e| e.is_transition_into(Phase::Asystole),
        closes: |e| e.is_transition_out_of(Phase::Asystole),
        optimal_message: "This pause is what we expected. Her heart is resetting. \
            Watch with me, it will start again in a moment.",
        impact: Impact::High,
        impact_description: "Silence during the flat line lets the family fill the gap \
            with the worst possible explanation.",
    },
    WindowTemplate {
        id: PRE_CARDIOVERSION_WARNING,
        name: "Preparing for cardioversion",
        opens: |e| {
            e.is_action_where(vocabulary::is_sedation)
                || e.is_action_where(vocabulary::is_cardioversion)
        },
        closes: |e| {
            e.is_action_where(vocabulary::is_cardioversion)
                || e.is_transition_into(Phase::Converted)
        },
        optimal_message: "Lily is going to get medicine to make her sleep, then we will use a \
            small, timed electric shock to reset her rhythm. She won't feel it, and her body \
            may jump. That is normal.",
        impact: Impact::High,
        impact_description: "A shock delivered without warning looks violent to a parent and \
            undermines trust in the team.",
    },
    WindowTemplate {
        id: PARENT_DISTRESS,
        name: "Responding to parent distress",
        opens: |e| e.has_trigger(StateTrigger::AnxietySpike),
        closes: |e| e.is_response_from(Actor::Mark),
        optimal_message: "I can see how frightening this is. Let me tell you exactly what is \
            happening and what we are doing next.",
        impact: Impact::Medium,
        impact_description: "Unacknowledged distress escalates and spills over to the child.",
    },
    WindowTemplate {
        id: POST_CONVERSION_ACK,
        name: "Acknowledging conversion",
        opens: |e| e.is_transition_into(Phase::Converted),
        closes: |e| e.is_response_from(Actor::Mark) || e.is_response_from(Actor::Lily),
        optimal_message: "Her heart is back in a normal rhythm. You did a great job staying \
            with her, Mr. Henderson.",
        impact: Impact::Low,
        impact_description: "Closing the loop tells the family the crisis is over and \
            restores a sense of safety.",
    },
];

/// Detect every communication window present in the timeline.
///
/// Windows come back in template order, at most one per template.
pub fn detect_communication_windows(timeline: &[TimelineEvent]) -> Vec<CommunicationWindow> {
    let windows: Vec<_> = WINDOW_TEMPLATES
        .iter()
        .filter_map(|template| detect_window(template, timeline))
        .collect();

    debug!(
        detected = windows.len(),
        missed = windows.iter().filter(|w| w.was_missed).count(),
        "Detected communication windows"
    );

    windows
}

fn detect_window(
    template: &WindowTemplate,
    timeline: &[TimelineEvent],
) -> Option<CommunicationWindow> {
    let trigger_idx = timeline.iter().position(|e| (template.opens)(e))?;
    let trigger = &timeline[trigger_idx];
    let closer = timeline[trigger_idx + 1..]
        .iter()
        .find(|e| e.timestamp > trigger.timestamp && (template.closes)(e))?;

    let (start, end) = (trigger.timestamp, closer.timestamp);
    let spoken: Vec<&TimelineEvent> = timeline
        .iter()
        .filter(|e| e.is_learner_communication() && e.timestamp >= start && e.timestamp <= end)
        .collect();
    let was_missed = !spoken.iter().any(|e| e.is_explanatory());

    trace!(
        window = template.id,
        start,
        end,
        messages = spoken.len(),
        was_missed,
        "Window matched"
    );

    Some(CommunicationWindow {
        id: template.id.to_string(),
        name: template.name.to_string(),
        start_timestamp: start,
        end_timestamp: end,
        duration: end - start,
        trigger_event_id: trigger.id.clone(),
        closing_event_id: closer.id.clone(),
        optimal_message: template.optimal_message.to_string(),
        actual_messages: spoken.iter().map(|e| e.content.clone()).collect(),
        was_missed,
        impact: template.impact,
        impact_description: template.impact_description.to_string(),
    })
}

/// Find a detected window by template id.
pub fn find_window<'a>(
    windows: &'a [CommunicationWindow],
    id: &str,
) -> Option<&'a CommunicationWindow> {
    windows.iter().find(|w| w.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{EventMetadata, StateSnapshot};
    use crate::types::EventType;

    fn state(phase: Phase) -> StateSnapshot {
        StateSnapshot {
            phase,
            ..StateSnapshot::baseline()
        }
    }

    fn say(id: &str, timestamp: i64, text: &str, explanatory: bool) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type: EventType::Communication,
            actor: Actor::Learner,
            content: text.into(),
            state_before: state(Phase::Running),
            state_after: state(Phase::Running),
            metadata: EventMetadata {
                was_explanatory: Some(explanatory),
                ..Default::default()
            },
        }
    }

    fn act(id: &str, timestamp: i64, action_type: &str) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type: EventType::Action,
            actor: Actor::Learner,
            content: action_type.into(),
            state_before: state(Phase::Running),
            state_after: state(Phase::Running),
            metadata: EventMetadata {
                intervention: Some(action_type.into()),
                ..Default::default()
            },
        }
    }

    fn transition(id: &str, timestamp: i64, from: Phase, to: Phase) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type: EventType::StateChange,
            actor: Actor::System,
            content: format!("Phase: {from} → {to}"),
            state_before: state(from),
            state_after: state(to),
            metadata: EventMetadata {
                trigger: Some(StateTrigger::PhaseChange),
                ..Default::default()
            },
        }
    }

    fn character(id: &str, timestamp: i64, actor: Actor, text: &str) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type: EventType::CharacterResponse,
            actor,
            content: text.into(),
            state_before: state(Phase::Converted),
            state_after: state(Phase::Converted),
            metadata: EventMetadata::default(),
        }
    }

    #[test]
    fn test_explanatory_message_closes_warning_window() {
        let timeline = vec![
            say("msg_0", 500, "Mr. Henderson, watch the monitor", true),
            act("action_0", 1000, "adenosine"),
            transition("state_1_phase", 1200, Phase::Running, Phase::Asystole),
        ];

        let windows = detect_communication_windows(&timeline);
        let warning = find_window(&windows, PRE_ADENOSINE_WARNING).unwrap();

        assert_eq!(warning.start_timestamp, 500);
        assert_eq!(warning.end_timestamp, 1000);
        assert_eq!(warning.duration, 500);
        assert_eq!(warning.closing_event_id, "action_0");
        assert_eq!(warning.actual_messages, vec!["Mr. Henderson, watch the monitor"]);
        assert!(!warning.was_missed);
        assert_eq!(warning.impact, Impact::Critical);
    }

    #[test]
    fn test_non_explanatory_messages_are_missed() {
        let timeline = vec![
            say("msg_0", 500, "Push adenosine", false),
            act("action_0", 1000, "adenosine"),
        ];

        let windows = detect_communication_windows(&timeline);
        let warning = find_window(&windows, PRE_ADENOSINE_WARNING).unwrap();

        assert_eq!(warning.actual_messages.len(), 1);
        assert!(warning.was_missed);
    }

    #[test]
    fn test_silent_learner_window_runs_to_flatline() {
        let timeline = vec![
            act("action_0", 1000, "adenosine"),
            transition("state_1_phase", 1200, Phase::Running, Phase::Asystole),
        ];

        let windows = detect_communication_windows(&timeline);
        let warning = find_window(&windows, PRE_ADENOSINE_WARNING).unwrap();

        assert_eq!(warning.trigger_event_id, "action_0");
        assert_eq!(warning.closing_event_id, "state_1_phase");
        assert!(warning.actual_messages.is_empty());
        assert!(warning.was_missed);
    }

    #[test]
    fn test_trigger_without_closer_yields_no_window() {
        let timeline = vec![transition("state_1_phase", 1200, Phase::Running, Phase::Asystole)];

        let windows = detect_communication_windows(&timeline);

        assert!(find_window(&windows, DURING_ASYSTOLE).is_none());
    }

    #[test]
    fn test_during_asystole_window() {
        let timeline = vec![
            transition("state_1_phase", 1200, Phase::Running, Phase::Asystole),
            say("msg_0", 2000, "This pause is expected", true),
            transition("state_2_phase", 5000, Phase::Asystole, Phase::Converted),
        ];

        let windows = detect_communication_windows(&timeline);
        let pause = find_window(&windows, DURING_ASYSTOLE).unwrap();

        assert_eq!(pause.duration, 3800);
        assert!(!pause.was_missed);
        assert_eq!(pause.impact, Impact::High);
    }

    #[test]
    fn test_closer_must_be_strictly_later() {
        let timeline = vec![
            transition("state_1_phase", 5000, Phase::Asystole, Phase::Converted),
            character("msg_0", 5000, Actor::Mark, "Is it over?"),
        ];

        let windows = detect_communication_windows(&timeline);

        assert!(find_window(&windows, POST_CONVERSION_ACK).is_none());
    }

    fn anxiety_spike(id: &str, timestamp: i64) -> TimelineEvent {
        TimelineEvent {
            id: id.into(),
            timestamp,
            event_type: EventType::StateChange,
            actor: Actor::System,
            content: "Mark anxiety: 2 → 4".into(),
            state_before: state(Phase::Running),
            state_after: state(Phase::Running),
            metadata: EventMetadata {
                trigger: Some(StateTrigger::AnxietySpike),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_sedation_opens_cardioversion_window() {
        let timeline = vec![
            act("action_0", 1000, "sedation"),
            act("action_1", 3000, "synchronized_cardioversion"),
        ];

        let windows = detect_communication_windows(&timeline);
        let prep = find_window(&windows, PRE_CARDIOVERSION_WARNING).unwrap();

        assert_eq!(prep.trigger_event_id, "action_0");
        assert_eq!(prep.closing_event_id, "action_1");
        assert_eq!(prep.duration, 2000);
        assert_eq!(prep.impact, Impact::High);
        assert!(prep.was_missed);
    }

    #[test]
    fn test_cardioversion_window_credits_explanation() {
        let timeline = vec![
            act("action_0", 1000, "sedation"),
            say("msg_0", 2000, "She will sleep, then a small shock resets her heart", true),
            act("action_1", 3000, "synchronized_cardioversion"),
        ];

        let windows = detect_communication_windows(&timeline);
        let prep = find_window(&windows, PRE_CARDIOVERSION_WARNING).unwrap();

        assert_eq!(prep.actual_messages.len(), 1);
        assert!(!prep.was_missed);
    }

    #[test]
    fn test_cardioversion_window_closes_on_conversion() {
        let timeline = vec![
            act("action_0", 1000, "ketamine"),
            transition("state_1_phase", 3500, Phase::Running, Phase::Converted),
        ];

        let windows = detect_communication_windows(&timeline);
        let prep = find_window(&windows, PRE_CARDIOVERSION_WARNING).unwrap();

        assert_eq!(prep.closing_event_id, "state_1_phase");
    }

    #[test]
    fn test_parent_distress_window() {
        let timeline = vec![
            anxiety_spike("state_1_anxiety", 1500),
            say("msg_0", 2000, "I know this is scary, it is normal", true),
            character("msg_1", 2500, Actor::Mark, "What is happening to her?"),
        ];

        let windows = detect_communication_windows(&timeline);
        let distress = find_window(&windows, PARENT_DISTRESS).unwrap();

        assert_eq!(distress.trigger_event_id, "state_1_anxiety");
        assert_eq!(distress.closing_event_id, "msg_1");
        assert_eq!(distress.impact, Impact::Medium);
        assert!(!distress.was_missed);
    }

    #[test]
    fn test_parent_distress_missed_without_explanation() {
        let timeline = vec![
            anxiety_spike("state_1_anxiety", 1500),
            character("msg_0", 2500, Actor::Mark, "Somebody do something!"),
        ];

        let windows = detect_communication_windows(&timeline);
        let distress = find_window(&windows, PARENT_DISTRESS).unwrap();

        assert!(distress.actual_messages.is_empty());
        assert!(distress.was_missed);
    }

    #[test]
    fn test_parent_distress_needs_mark_to_respond() {
        let timeline = vec![
            anxiety_spike("state_1_anxiety", 1500),
            character("msg_0", 2500, Actor::Lily, "Daddy?"),
        ];

        let windows = detect_communication_windows(&timeline);

        assert!(find_window(&windows, PARENT_DISTRESS).is_none());
    }

    #[test]
    fn test_windows_follow_template_order() {
        let timeline = vec![
            act("action_0", 1000, "adenosine"),
            transition("state_1_phase", 1200, Phase::Running, Phase::Asystole),
            transition("state_2_phase", 5000, Phase::Asystole, Phase::Converted),
            character("msg_0", 6000, Actor::Mark, "Is it over?"),
        ];

        let windows = detect_communication_windows(&timeline);
        let ids: Vec<_> = windows.iter().map(|w| w.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![PRE_ADENOSINE_WARNING, DURING_ASYSTOLE, POST_CONVERSION_ACK]
        );
        assert!(windows.iter().all(|w| w.was_missed));
    }
}
