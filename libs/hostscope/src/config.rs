//! Collector configuration.

use crate::error::CollectError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `tool_timeout`; anything longer is a caller mistake.
pub const MAX_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Which optional domains to probe and how long external tools may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Attempt GPU detection.
    pub gpu: bool,

    /// Attempt NPU detection.
    pub npu: bool,

    /// Attempt privileged or slow extras (SMART health). Off by default.
    pub extras: bool,

    /// Budget for every external tool and for each collector that shells out.
    #[serde(with = "humantime_duration")]
    pub tool_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            gpu: true,
            npu: true,
            extras: false,
            tool_timeout: Duration::from_secs(5),
        }
    }
}

impl CollectorConfig {
    /// # Errors
    /// Returns `CollectError::InvalidConfig` if the timeout is zero or
    /// larger than [`MAX_TOOL_TIMEOUT`].
    pub fn validate(&self) -> Result<(), CollectError> {
        if self.tool_timeout.is_zero() {
            return Err(CollectError::InvalidConfig(
                "tool_timeout must be greater than zero".to_owned(),
            ));
        }
        if self.tool_timeout > MAX_TOOL_TIMEOUT {
            return Err(CollectError::InvalidConfig(format!(
                "tool_timeout {} exceeds the maximum of {}",
                humantime::format_duration(self.tool_timeout),
                humantime::format_duration(MAX_TOOL_TIMEOUT)
            )));
        }
        Ok(())
    }
}

/// Serde mapping for `Duration` as humantime strings (`"5s"`, `"250ms"`).
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(de::Error::custom)
    }
}
