//! Error types for svt-debrief

use thiserror::Error;

/// Error type for debrief generation.
///
/// Only the orchestration entry point and configuration loading return
/// errors; the individual detectors are total.
#[derive(Debug, Error)]
pub enum DebriefError {
    /// The recorded session failed validation
    #[error("Invalid session input: {0}")]
    InvalidInput(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration TOML could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for debrief operations
pub type Result<T> = std::result::Result<T, DebriefError>;
