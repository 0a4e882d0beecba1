use std::time::Duration;

/// Reasons a single probe could not produce its fact.
///
/// These never escape the collectors: each one is absorbed into the
/// capability ledger as "unavailable".
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{source_name} is not available: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("{source_name} returned malformed output: {reason}")]
    SourceMalformed { source_name: String, reason: String },

    #[error("{source_name} did not finish within {}", humantime::format_duration(*timeout))]
    SourceTimeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("{source_name} was cancelled")]
    Cancelled { source_name: String },
}

impl ProbeError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceMalformed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(source_name: impl Into<String>, timeout: Duration) -> Self {
        Self::SourceTimeout {
            source_name: source_name.into(),
            timeout,
        }
    }

    pub fn cancelled(source_name: impl Into<String>) -> Self {
        Self::Cancelled {
            source_name: source_name.into(),
        }
    }

    /// Name of the data source that failed.
    pub fn source_name(&self) -> &str {
        match self {
            Self::SourceUnavailable { source_name, .. }
            | Self::SourceMalformed { source_name, .. }
            | Self::SourceTimeout { source_name, .. }
            | Self::Cancelled { source_name } => source_name,
        }
    }
}

/// Result of a single probe.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors returned by the collector API. Only caller misconfiguration
/// qualifies; environmental failures are reported through capabilities.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Invalid collector configuration: {0}")]
    InvalidConfig(String),
}

/// Errors for rendering a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Failed to serialize snapshot to JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize snapshot to YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render snapshot as text: {0}")]
    Text(#[from] std::fmt::Error),

    #[error("Unsupported output format: {0} (expected text, json or yaml)")]
    UnknownFormat(String),
}
