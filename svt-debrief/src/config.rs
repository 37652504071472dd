//! Debrief engine configuration.
//!
//! Every domain constant the detectors depend on lives here as a named value
//! so that scenario authors can tune thresholds without touching rule code.
//! Sections deserialize with `#[serde(default)]`, so a partial TOML document
//! only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::{DebriefError, Result};

/// Main configuration for the debrief engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebriefConfig {
    /// Timeline reconstruction thresholds.
    pub timeline: TimelineConfig,
    /// Pivot rule thresholds.
    pub pivots: PivotConfig,
    /// Causal chain construction settings.
    pub causal: CausalConfig,
    /// Counterfactual projection settings.
    pub counterfactual: CounterfactualConfig,
    /// Score weights.
    pub scoring: ScoringConfig,
}

impl DebriefConfig {
    /// Parse a configuration from a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in its meaningful range.
    pub fn validate(&self) -> Result<()> {
        if !(self.timeline.anxiety_spike_threshold > 0.0) {
            return Err(DebriefError::Config(
                "timeline.anxiety_spike_threshold must be positive".into(),
            ));
        }
        if !(self.timeline.fear_spike_threshold > 0.0) {
            return Err(DebriefError::Config(
                "timeline.fear_spike_threshold must be positive".into(),
            ));
        }
        if !(self.pivots.underdose_ratio > 0.0 && self.pivots.underdose_ratio <= 1.0) {
            return Err(DebriefError::Config(format!(
                "pivots.underdose_ratio must be in (0, 1], got {}",
                self.pivots.underdose_ratio
            )));
        }
        if self.causal.root_cause_window_ms < 0 {
            return Err(DebriefError::Config(
                "causal.root_cause_window_ms must not be negative".into(),
            ));
        }
        if self.counterfactual.intervention_lead_ms < 0 {
            return Err(DebriefError::Config(
                "counterfactual.intervention_lead_ms must not be negative".into(),
            ));
        }
        let weights = self.scoring.clinical_weight + self.scoring.communication_weight;
        if (weights - 1.0).abs() > 1e-9 {
            return Err(DebriefError::Config(format!(
                "scoring weights must sum to 1.0, got {weights}"
            )));
        }
        Ok(())
    }
}

/// Thresholds for synthesizing state-change events from snapshot diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Minimum rise in Mark's anxiety between snapshots to emit an event.
    pub anxiety_spike_threshold: f64,
    /// Minimum rise in Lily's fear between snapshots to emit an event.
    pub fear_spike_threshold: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            anxiety_spike_threshold: 2.0,
            fear_spike_threshold: 1.0,
        }
    }
}

/// Thresholds for pivot rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    /// A given/correct dose ratio strictly below this is a significant underdose.
    pub underdose_ratio: f64,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            underdose_ratio: 0.7,
        }
    }
}

/// Causal chain construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalConfig {
    /// How far from a pivot (ms) an action still counts as its root cause.
    pub root_cause_window_ms: i64,
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            root_cause_window_ms: 2000,
        }
    }
}

/// Counterfactual projection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterfactualConfig {
    /// How long before a pivot (ms) the alternative intervention should happen.
    pub intervention_lead_ms: i64,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            intervention_lead_ms: 6000,
        }
    }
}

/// Score weights and penalties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Starting value for both sub-scores before penalties.
    pub base_score: f64,
    /// Lower clamp for every score.
    pub min_score: f64,
    /// Upper clamp for every score.
    pub max_score: f64,
    /// Clinical penalty per dosing pivot.
    pub dosing_penalty: f64,
    /// Clinical penalty when vagal manoeuvres were skipped.
    pub skipped_vagal_penalty: f64,
    /// Communication penalty per missed critical window.
    pub missed_critical_penalty: f64,
    /// Communication penalty per missed high-impact window.
    pub missed_high_penalty: f64,
    /// Weight of the clinical score in the overall score.
    pub clinical_weight: f64,
    /// Weight of the communication score in the overall score.
    pub communication_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 4.0,
            min_score: 1.0,
            max_score: 5.0,
            dosing_penalty: 0.5,
            skipped_vagal_penalty: 0.3,
            missed_critical_penalty: 1.5,
            missed_high_penalty: 0.5,
            clinical_weight: 0.4,
            communication_weight: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DebriefConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.counterfactual.intervention_lead_ms, 6000);
        assert_eq!(config.pivots.underdose_ratio, 0.7);
    }

    #[test]
    fn test_partial_toml_overrides_only_named_values() {
        let config = DebriefConfig::from_toml_str(
            r#"
            [counterfactual]
            intervention_lead_ms = 4000

            [timeline]
            fear_spike_threshold = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.counterfactual.intervention_lead_ms, 4000);
        assert_eq!(config.timeline.fear_spike_threshold, 2.0);
        assert_eq!(config.timeline.anxiety_spike_threshold, 2.0);
        assert_eq!(config.causal.root_cause_window_ms, 2000);
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = DebriefConfig::from_toml_str("").unwrap();
        assert_eq!(config, DebriefConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range_ratio() {
        let err = DebriefConfig::from_toml_str("[pivots]\nunderdose_ratio = 1.5\n").unwrap_err();
        assert!(matches!(err, DebriefError::Config(_)));
    }

    #[test]
    fn test_rejects_negative_lead_time() {
        let err = DebriefConfig::from_toml_str("[counterfactual]\nintervention_lead_ms = -1\n")
            .unwrap_err();
        assert!(err.to_string().contains("intervention_lead_ms"));
    }

    #[test]
    fn test_rejects_unbalanced_weights() {
        let mut config = DebriefConfig::default();
        config.scoring.clinical_weight = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = DebriefConfig::from_toml_str("[scoring\n").unwrap_err();
        assert!(matches!(err, DebriefError::ConfigParse(_)));
    }
}
