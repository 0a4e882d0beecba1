use crate::capability::{Capability, CapabilityDelta};
use crate::model::OsInfo;
use sysinfo::System;

const UNKNOWN: &str = "unknown";

/// Collect operating system facts. Never reports unavailable: every field
/// falls back to a compile-time runtime fact or `"unknown"`.
pub fn collect() -> (OsInfo, CapabilityDelta) {
    let name = System::name()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| std::env::consts::OS.to_owned());
    let version = System::os_version()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_owned());
    let kernel = System::kernel_version()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_owned());
    let distribution = Some(System::distribution_id())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| std::env::consts::OS.to_owned());

    let info = OsInfo {
        name,
        version,
        kernel,
        arch: std::env::consts::ARCH.to_owned(),
        distribution,
    };

    tracing::debug!(os = %info.name, version = %info.version, kernel = %info.kernel, "collected OS info");

    (info, CapabilityDelta::new().with(Capability::Os, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_fields_are_never_empty() {
        let (info, delta) = collect();
        assert!(!info.name.is_empty());
        assert!(!info.version.is_empty());
        assert!(!info.kernel.is_empty());
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert!(!info.distribution.is_empty());
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::Os && ok));
    }
}
