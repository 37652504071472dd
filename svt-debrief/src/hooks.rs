//! Dialogue hooks: follow-up quiz items built from pivots.
//!
//! Hooks are generated after evaluation and are not part of
//! [`EvaluationResult`](crate::EvaluationResult). Free-text answers are graded
//! by the caller against `ideal_free_text_response`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pivots::{PIVOT_NO_WARNING_BEFORE_ASYSTOLE, PIVOT_SKIPPED_VAGAL, PivotPoint, find_pivot};

/// Marker for a hook with no single correct option.
pub const NO_CORRECT_OPTION: i32 = -1;

/// Shape of a quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    MultipleChoice,
    FreeText,
    OpenReflection,
}

impl HookKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::FreeText => "free_text",
            Self::OpenReflection => "open_reflection",
        }
    }
}

/// An interactive follow-up item tied to one pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueHook {
    pub id: String,
    pub pivot_id: String,
    pub kind: HookKind,
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`, or [`NO_CORRECT_OPTION`].
    pub correct_option_index: i32,
    pub allow_free_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal_free_text_response: Option<String>,
    pub explanation: String,
}

struct HookTemplate {
    id: &'static str,
    pivot_id: &'static str,
    kind: HookKind,
    prompt: &'static str,
    options: &'static [&'static str],
    correct_option_index: i32,
    allow_free_text: bool,
    ideal_free_text_response: Option<&'static str>,
    explanation: &'static str,
}

impl HookTemplate {
    fn instantiate(&self) -> DialogueHook {
        DialogueHook {
            id: self.id.to_string(),
            pivot_id: self.pivot_id.to_string(),
            kind: self.kind,
            prompt: self.prompt.to_string(),
            options: self.options.iter().map(|o| o.to_string()).collect(),
            correct_option_index: self.correct_option_index,
            allow_free_text: self.allow_free_text,
            ideal_free_text_response: self.ideal_free_text_response.map(str::to_string),
            explanation: self.explanation.to_string(),
        }
    }
}

const HOOK_TEMPLATES: &[HookTemplate] = &[
    HookTemplate {
        id: "hook_asystole_warning_choice",
        pivot_id: PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
        kind: HookKind::MultipleChoice,
        prompt: "Mark saw the monitor go flat with no warning. \
                 When was the best moment to prepare him?",
        options: &[
            "After the adenosine had worked",
            "Before pushing the adenosine",
            "While the monitor was flat",
            "It was not necessary to say anything",
        ],
        correct_option_index: 1,
        allow_free_text: false,
        ideal_free_text_response: None,
        explanation: "A warning given before the push turns a terrifying flatline \
                      into an expected step. Once the monitor is flat, reassurance \
                      can only limit the damage.",
    },
    HookTemplate {
        id: "hook_asystole_warning_words",
        pivot_id: PIVOT_NO_WARNING_BEFORE_ASYSTOLE,
        kind: HookKind::FreeText,
        prompt: "In your own words, what would you say to Mark right before \
                 pushing adenosine?",
        options: &[],
        correct_option_index: NO_CORRECT_OPTION,
        allow_free_text: true,
        ideal_free_text_response: Some(
            "Mr. Henderson, this medicine resets Lily's heart. For a few seconds \
             the monitor will show a flat line and she may feel strange. \
             That pause is expected, and her heart will restart on its own.",
        ),
        explanation: "A good warning names what he will see, says it is expected, \
                      and says how long it will last.",
    },
    HookTemplate {
        id: "hook_vagal_reflection",
        pivot_id: PIVOT_SKIPPED_VAGAL,
        kind: HookKind::OpenReflection,
        prompt: "You went straight to adenosine. What might trying vagal \
                 maneuvers first have offered Lily and her father?",
        options: &[
            "A chance to convert without medication",
            "Time to explain the plan to the family",
            "Nothing, adenosine was the right first step",
        ],
        correct_option_index: NO_CORRECT_OPTION,
        allow_free_text: true,
        ideal_free_text_response: None,
        explanation: "In a stable child, vagal maneuvers are first line. They can \
                      convert the rhythm with no drug and involve the family in the \
                      treatment, though reasonable clinicians weigh this differently.",
    },
];

/// Build follow-up quiz items for the pivots that have them.
///
/// Items come out in a fixed order regardless of pivot order.
pub fn generate_dialogue_hooks(pivots: &[PivotPoint]) -> Vec<DialogueHook> {
    let hooks: Vec<DialogueHook> = HOOK_TEMPLATES
        .iter()
        .filter(|t| find_pivot(pivots, t.pivot_id).is_some())
        .map(HookTemplate::instantiate)
        .collect();

    debug!(hooks = hooks.len(), "Generated dialogue hooks");
    hooks
}
