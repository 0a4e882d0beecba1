//! Absorbing probe failures.

use crate::error::{ProbeError, ProbeResult};
use std::path::Path;

/// Converts a probe result into "value or unavailable", logging the reason
/// at the level its error class calls for.
pub trait ProbeResultExt<T> {
    fn available(self, fact: &'static str) -> Option<T>;
}

impl<T> ProbeResultExt<T> for ProbeResult<T> {
    fn available(self, fact: &'static str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                log_unavailable(fact, &e);
                None
            }
        }
    }
}

pub(crate) fn log_unavailable(fact: &'static str, error: &ProbeError) {
    match error {
        ProbeError::SourceUnavailable { .. } => {
            tracing::trace!(fact, source = error.source_name(), error = %error, "probe unavailable");
        }
        ProbeError::SourceMalformed { .. }
        | ProbeError::SourceTimeout { .. }
        | ProbeError::Cancelled { .. } => {
            tracing::debug!(fact, source = error.source_name(), error = %error, "probe failed");
        }
    }
}

/// Read a kernel pseudo-file or other small text source.
pub fn read_source(path: impl AsRef<Path>) -> ProbeResult<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| ProbeError::unavailable(path.display().to_string(), e))
}
