//! Merge the raw session streams into one sorted timeline.
//!
//! ```text
//! messages ──────┐
//! action log ────┤
//! nurse catches ─┼─→ TimelineEvent[] ─→ stable sort by timestamp
//! snapshot diffs ┘
//! ```
//!
//! Reconstruction is total: malformed or missing pieces degrade to
//! defaults instead of failing.

use tracing::{debug, trace};

use super::vocabulary;
use super::{
    ActionLogEntry, EventMetadata, Message, NurseCatch, ReconstructionInput, Speaker,
    StateSnapshot, TimelineEvent,
};
use crate::config::TimelineConfig;
use crate::types::{Actor, EventType, StateTrigger};

/// Build the unified, time-sorted timeline for a session.
pub fn reconstruct_timeline(
    input: &ReconstructionInput,
    config: &TimelineConfig,
) -> Vec<TimelineEvent> {
    let mut snapshots = input.state_snapshots.clone();
    snapshots.sort_by_key(|s| s.timestamp);
    let baseline = StateSnapshot::baseline();
    let states = SnapshotIndex {
        snapshots: &snapshots,
        baseline: &baseline,
    };

    let mut events = Vec::with_capacity(
        input.messages.len() + input.action_log.len() + input.nurse_catches.len(),
    );

    for (idx, message) in input.messages.iter().enumerate() {
        events.push(message_event(idx, message, input.start_time, &states));
    }
    for (idx, entry) in input.action_log.iter().enumerate() {
        events.push(action_event(idx, entry, &states));
    }
    for (idx, catch) in input.nurse_catches.iter().enumerate() {
        events.push(catch_event(idx, catch, &states));
    }
    let state_changes = state_change_events(&snapshots, config);
    let state_change_count = state_changes.len();
    events.extend(state_changes);

    // Vec::sort_by_key is stable; simultaneous events keep stream order.
    events.sort_by_key(|e| e.timestamp);

    debug!(
        messages = input.messages.len(),
        actions = input.action_log.len(),
        nurse_catches = input.nurse_catches.len(),
        state_changes = state_change_count,
        total = events.len(),
        "Reconstructed session timeline"
    );

    events
}

/// Looks up the snapshots surrounding a point in session time.
struct SnapshotIndex<'a> {
    /// Sorted ascending by timestamp.
    snapshots: &'a [StateSnapshot],
    baseline: &'a StateSnapshot,
}

impl SnapshotIndex<'_> {
    /// Returns `(state_before, state_after)` for an event at `timestamp`.
    ///
    /// `state_after` is the last snapshot at or before the event and
    /// `state_before` the one preceding it. Events earlier than every
    /// snapshot see the baseline for both.
    fn around(&self, timestamp: i64) -> (StateSnapshot, StateSnapshot) {
        let idx = self.snapshots.partition_point(|s| s.timestamp <= timestamp);
        match idx {
            0 => (self.baseline.clone(), self.baseline.clone()),
            1 => (self.snapshots[0].clone(), self.snapshots[0].clone()),
            _ => (
                self.snapshots[idx - 2].clone(),
                self.snapshots[idx - 1].clone(),
            ),
        }
    }
}

fn message_event(
    idx: usize,
    message: &Message,
    start_time: i64,
    states: &SnapshotIndex<'_>,
) -> TimelineEvent {
    let timestamp = message.time - start_time;
    let (state_before, state_after) = states.around(timestamp);

    let (actor, event_type) = match message.who {
        Speaker::Doctor => (Actor::Learner, EventType::Communication),
        Speaker::Nurse => (Actor::Nurse, EventType::CharacterResponse),
        Speaker::Lily => (Actor::Lily, EventType::CharacterResponse),
        Speaker::Mark => (Actor::Mark, EventType::CharacterResponse),
        Speaker::System => (Actor::System, EventType::System),
    };

    let metadata = if actor == Actor::Learner {
        let was_explanatory = vocabulary::is_explanatory(&message.text);
        trace!(idx, was_explanatory, "Classified learner message");
        EventMetadata {
            addressed_to: vocabulary::addressed_to(&message.text),
            was_explanatory: Some(was_explanatory),
            ..Default::default()
        }
    } else {
        EventMetadata::default()
    };

    TimelineEvent {
        id: format!("msg_{idx}"),
        timestamp,
        event_type,
        actor,
        content: message.text.clone(),
        state_before,
        state_after,
        metadata,
    }
}

fn action_event(idx: usize, entry: &ActionLogEntry, states: &SnapshotIndex<'_>) -> TimelineEvent {
    let (state_before, state_after) = states.around(entry.time);
    let unit = entry.unit.as_deref().unwrap_or("");

    let content = match (entry.given, entry.correct) {
        (Some(given), Some(correct)) => format!(
            "{} {given}{unit} (correct: {correct}{unit})",
            entry.action_type
        ),
        (Some(given), None) => format!("{} {given}{unit}", entry.action_type),
        _ => entry.action_type.clone(),
    };

    TimelineEvent {
        id: format!("action_{idx}"),
        timestamp: entry.time,
        event_type: EventType::Action,
        actor: Actor::Learner,
        content,
        state_before,
        state_after,
        metadata: EventMetadata {
            intervention: Some(entry.action_type.clone()),
            dose: entry.given,
            correct: entry.correct,
            unit: entry.unit.clone(),
            result: entry.result,
            executed: Some(entry.executed),
            attempt_num: entry.attempt_num,
            ..Default::default()
        },
    }
}

fn catch_event(idx: usize, catch: &NurseCatch, states: &SnapshotIndex<'_>) -> TimelineEvent {
    let (state_before, state_after) = states.around(catch.time);

    TimelineEvent {
        id: format!("catch_{idx}"),
        timestamp: catch.time,
        event_type: EventType::NurseCatch,
        actor: Actor::Nurse,
        content: format!(
            "Nurse caught {} {}{}: {}",
            catch.drug, catch.attempted, catch.unit, catch.reason
        ),
        state_before,
        state_after,
        metadata: EventMetadata {
            intervention: Some(catch.drug.clone()),
            dose: Some(catch.attempted),
            unit: Some(catch.unit.clone()),
            reason: Some(catch.reason.clone()),
            ..Default::default()
        },
    }
}

/// Synthesize state-change events from consecutive snapshot pairs.
///
/// Each trigger is independent, so one pair can yield a phase change, an
/// anxiety spike and a fear spike at the same timestamp.
fn state_change_events(
    snapshots: &[StateSnapshot],
    config: &TimelineConfig,
) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for (i, pair) in snapshots.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        let idx = i + 1;

        if prev.phase != curr.phase {
            events.push(state_event(
                format!("state_{idx}_phase"),
                format!("Phase: {} → {}", prev.phase, curr.phase),
                StateTrigger::PhaseChange,
                prev,
                curr,
            ));
        }

        if curr.mark_anxiety - prev.mark_anxiety >= config.anxiety_spike_threshold {
            events.push(state_event(
                format!("state_{idx}_anxiety"),
                format!(
                    "Mark's anxiety rose {} → {}",
                    prev.mark_anxiety, curr.mark_anxiety
                ),
                StateTrigger::AnxietySpike,
                prev,
                curr,
            ));
        }

        if curr.lily_fear - prev.lily_fear >= config.fear_spike_threshold {
            events.push(state_event(
                format!("state_{idx}_fear"),
                format!("Lily's fear rose {} → {}", prev.lily_fear, curr.lily_fear),
                StateTrigger::FearSpike,
                prev,
                curr,
            ));
        }
    }

    events
}

fn state_event(
    id: String,
    content: String,
    trigger: StateTrigger,
    prev: &StateSnapshot,
    curr: &StateSnapshot,
) -> TimelineEvent {
    TimelineEvent {
        id,
        timestamp: curr.timestamp,
        event_type: EventType::StateChange,
        actor: Actor::System,
        content,
        state_before: prev.clone(),
        state_after: curr.clone(),
        metadata: EventMetadata {
            trigger: Some(trigger),
            ..Default::default()
        },
    }
}
