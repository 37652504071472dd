//! Regex vocabularies for classifying speech and actions.

use std::sync::LazyLock;

use regex::RegexSet;

use crate::types::Actor;

/// Words that show the learner is explaining rather than just ordering.
const EXPLANATORY_PATTERNS: &[&str] = &[
    r"(?i)\bbecause\b",
    r"(?i)\bexpected\b",
    r"(?i)\bnormal\b",
    r"(?i)\bwill\b",
    r"(?i)\b(you|she|he|it|we|i)'ll\b",
    r"(?i)\bthis is\b",
    r"(?i)\bgoing to\b",
    r"(?i)\bmeans\b",
    r"(?i)\btemporar",
    r"(?i)\bpause",
    r"(?i)\bwatch\b",
    r"(?i)\breset",
    r"(?i)\b(okay|ok)\b",
];

const MARK_ADDRESS_PATTERNS: &[&str] = &[
    r"(?i)\bmr\.?\s+henderson\b",
    r"(?i)\bmark\b",
    r"(?i)\b(dad|father)\b",
];

const LILY_ADDRESS_PATTERNS: &[&str] = &[r"(?i)\blily\b", r"(?i)\b(sweetheart|sweetie|kiddo)\b"];

const NURSE_ADDRESS_PATTERNS: &[&str] = &[r"(?i)\bnurse\b"];

const ADENOSINE_PATTERNS: &[&str] = &[r"(?i)adenosine"];

const VAGAL_PATTERNS: &[&str] = &[
    r"(?i)vagal",
    r"(?i)valsalva",
    r"(?i)(^|[^a-z])ice([^a-z]|$)",
];

const SEDATION_PATTERNS: &[&str] = &[r"(?i)sedat", r"(?i)ketamine", r"(?i)midazolam"];

const CARDIOVERSION_PATTERNS: &[&str] = &[r"(?i)cardiover", r"(?i)synchroni[sz]ed", r"(?i)shock"];

/// What a frightened parent shouts when the monitor goes flat.
const ALARM_PATTERNS: &[&str] = &[r"(?i)flat", r"(?i)heart", r"(?i)stop"];

/// A compiled vocabulary; matches when any pattern matches.
struct PatternSet {
    patterns: RegexSet,
}

impl PatternSet {
    fn compile(sources: &[&str]) -> Self {
        Self {
            patterns: RegexSet::new(sources).unwrap_or_else(|_| RegexSet::empty()),
        }
    }

    fn is_match(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }
}

static EXPLANATORY: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::compile(EXPLANATORY_PATTERNS));
static MARK_ADDRESS: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::compile(MARK_ADDRESS_PATTERNS));
static LILY_ADDRESS: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::compile(LILY_ADDRESS_PATTERNS));
static NURSE_ADDRESS: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::compile(NURSE_ADDRESS_PATTERNS));
static ADENOSINE: LazyLock<PatternSet> = LazyLock::new(|| PatternSet::compile(ADENOSINE_PATTERNS));
static VAGAL: LazyLock<PatternSet> = LazyLock::new(|| PatternSet::compile(VAGAL_PATTERNS));
static SEDATION: LazyLock<PatternSet> = LazyLock::new(|| PatternSet::compile(SEDATION_PATTERNS));
static CARDIOVERSION: LazyLock<PatternSet> =
    LazyLock::new(|| PatternSet::compile(CARDIOVERSION_PATTERNS));
static ALARM: LazyLock<PatternSet> = LazyLock::new(|| PatternSet::compile(ALARM_PATTERNS));

/// True when the text explains what is happening or about to happen.
pub fn is_explanatory(text: &str) -> bool {
    EXPLANATORY.is_match(text)
}

/// Who a learner utterance is addressed to, if anyone is named.
///
/// Mark is checked first: "Mr. Henderson" is the father even though Lily
/// shares the surname.
pub fn addressed_to(text: &str) -> Option<Actor> {
    if MARK_ADDRESS.is_match(text) {
        Some(Actor::Mark)
    } else if LILY_ADDRESS.is_match(text) {
        Some(Actor::Lily)
    } else if NURSE_ADDRESS.is_match(text) {
        Some(Actor::Nurse)
    } else {
        None
    }
}

pub fn is_adenosine(action_type: &str) -> bool {
    ADENOSINE.is_match(action_type)
}

/// Vagal manoeuvres: modified Valsalva, ice to face.
pub fn is_vagal(action_type: &str) -> bool {
    VAGAL.is_match(action_type)
}

pub fn is_sedation(action_type: &str) -> bool {
    SEDATION.is_match(action_type)
}

pub fn is_cardioversion(action_type: &str) -> bool {
    CARDIOVERSION.is_match(action_type)
}

/// Mark reacting to the flat line ("her heart STOPPED").
pub fn is_alarm_outburst(text: &str) -> bool {
    ALARM.is_match(text)
}
