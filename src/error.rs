//! Error types for simulator setup and execution

use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, NpuError>;

/// Errors raised by the simulator
#[derive(Debug, Error)]
pub enum NpuError {
    /// Configuration is inconsistent and would produce skewed results
    #[error("Configuration error: {reason}")]
    Config {
        /// What is wrong with the configuration
        reason: String,
    },

    /// I/O error while reading or writing configuration files
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// TOML configuration could not be parsed
    #[error("Invalid TOML configuration: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },

    /// Configuration could not be rendered as TOML
    #[error("Failed to serialize configuration: {source}")]
    TomlSer {
        #[from]
        source: toml::ser::Error,
    },

    /// JSON export failed
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// A step was requested after the stop trigger
    #[error("Simulation stopped at cycle {cycle}")]
    SimulationStopped {
        /// Cycle at which the stop trigger was honoured
        cycle: u64,
    },
}

impl NpuError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
