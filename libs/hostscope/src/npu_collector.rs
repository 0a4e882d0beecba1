//! NPU detection.
//!
//! There is no portable NPU enumeration API. The CPU model names the NPU
//! family on the current consumer parts; Linux additionally exposes driven
//! accelerators under `/sys/class/accel`, and on macOS the Neural Engine is
//! part of every Apple Silicon SoC.

use crate::capability::{Capability, CapabilityDelta};
use crate::model::{NpuDetectionMethod, NpuInfo};
use regex::Regex;
use std::sync::LazyLock;

pub const APPLE_NEURAL_ENGINE: &str = "Apple Neural Engine";
pub const INTEL_AI_BOOST: &str = "Intel AI Boost";
pub const AMD_RYZEN_AI: &str = "AMD Ryzen AI";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static APPLE_SILICON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bapple m\d+\b").expect("static regex should not panic"));

#[cfg(target_os = "linux")]
const ACCEL_CLASS_PATH: &str = "/sys/class/accel";

/// What the OS says about accelerator devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AccelEvidence {
    /// Nothing exposed, or the platform has no such interface.
    None,
    /// A compute accelerator bound to the named kernel driver.
    Device { driver: Option<String> },
    /// The platform ships the NPU with every CPU of this family.
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    Platform,
}

/// NPU family implied by the CPU brand string.
pub fn infer_from_cpu_model(cpu_model: &str) -> Option<&'static str> {
    let lower = cpu_model.to_lowercase();
    let has_word = |word: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|w| w == word)
    };

    if APPLE_SILICON_REGEX.is_match(cpu_model) {
        Some(APPLE_NEURAL_ENGINE)
    } else if lower.contains("intel") && has_word("ultra") {
        Some(INTEL_AI_BOOST)
    } else if has_word("ryzen") && has_word("ai") {
        Some(AMD_RYZEN_AI)
    } else {
        None
    }
}

fn kind_from_driver(driver: &str) -> Option<&'static str> {
    match driver {
        "intel_vpu" => Some(INTEL_AI_BOOST),
        "amdxdna" => Some(AMD_RYZEN_AI),
        _ => None,
    }
}

/// Combine accelerator evidence with CPU-model inference.
pub(crate) fn detect(cpu_model: &str, evidence: &AccelEvidence) -> Option<NpuInfo> {
    let inferred = infer_from_cpu_model(cpu_model);

    match evidence {
        AccelEvidence::Device { driver } => {
            let kind = driver
                .as_deref()
                .and_then(kind_from_driver)
                .or(inferred)
                .unwrap_or("Compute accelerator");
            Some(NpuInfo {
                available: true,
                kind: kind.to_owned(),
                detection_method: NpuDetectionMethod::AccelDevice,
                note: match driver {
                    Some(driver) => format!("Accelerator device bound to the {driver} driver"),
                    None => "Accelerator device present, driver unknown".to_owned(),
                },
            })
        }
        AccelEvidence::Platform if inferred == Some(APPLE_NEURAL_ENGINE) => Some(NpuInfo {
            available: true,
            kind: APPLE_NEURAL_ENGINE.to_owned(),
            detection_method: NpuDetectionMethod::Platform,
            note: "Built into every Apple Silicon SoC".to_owned(),
        }),
        AccelEvidence::Platform | AccelEvidence::None => inferred.map(|kind| NpuInfo {
            available: false,
            kind: kind.to_owned(),
            detection_method: NpuDetectionMethod::CpuModel,
            note: "Inferred from CPU model; driver and runtime support not verified".to_owned(),
        }),
    }
}

/// Read `/sys/class/accel/accel*/device/driver` to find bound accelerators.
#[cfg(target_os = "linux")]
pub(crate) fn read_accel_class(root: &std::path::Path) -> AccelEvidence {
    let Ok(entries) = std::fs::read_dir(root) else {
        tracing::trace!(path = %root.display(), "no accel class");
        return AccelEvidence::None;
    };

    let mut found = false;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("accel") {
            continue;
        }
        found = true;
        let driver = std::fs::read_link(entry.path().join("device").join("driver"))
            .ok()
            .and_then(|target| {
                target
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
        if driver.is_some() {
            return AccelEvidence::Device { driver };
        }
    }

    if found {
        AccelEvidence::Device { driver: None }
    } else {
        AccelEvidence::None
    }
}

#[cfg(target_os = "linux")]
fn platform_evidence() -> AccelEvidence {
    read_accel_class(std::path::Path::new(ACCEL_CLASS_PATH))
}

#[cfg(target_os = "macos")]
fn platform_evidence() -> AccelEvidence {
    AccelEvidence::Platform
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_evidence() -> AccelEvidence {
    AccelEvidence::None
}

/// Detect an NPU. `None` means nothing points at one.
pub fn collect(cpu_model: &str) -> (Option<NpuInfo>, CapabilityDelta) {
    let npu = detect(cpu_model, &platform_evidence());

    match &npu {
        Some(info) => tracing::debug!(
            kind = %info.kind,
            method = info.detection_method.as_str(),
            available = info.available,
            "detected NPU"
        ),
        None => tracing::debug!(cpu_model, "no NPU detected"),
    }

    let delta = CapabilityDelta::new().with(Capability::Npu, npu.is_some());
    (npu, delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_model_rules() {
        assert_eq!(infer_from_cpu_model("Apple M1"), Some(APPLE_NEURAL_ENGINE));
        assert_eq!(infer_from_cpu_model("Apple M3 Max"), Some(APPLE_NEURAL_ENGINE));
        assert_eq!(
            infer_from_cpu_model("Intel(R) Core(TM) Ultra 7 155H"),
            Some(INTEL_AI_BOOST)
        );
        assert_eq!(
            infer_from_cpu_model("AMD Ryzen AI 9 HX 370 w/ Radeon 890M"),
            Some(AMD_RYZEN_AI)
        );
        assert_eq!(infer_from_cpu_model("Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz"), None);
        assert_eq!(infer_from_cpu_model("AMD Ryzen 7 5800H with Radeon Graphics"), None);
        assert_eq!(infer_from_cpu_model(""), None);
    }

    #[test]
    fn inference_alone_is_not_available() {
        let npu = detect("Intel(R) Core(TM) Ultra 7 155H", &AccelEvidence::None).unwrap();
        assert!(!npu.available);
        assert_eq!(npu.detection_method, NpuDetectionMethod::CpuModel);
        assert!(!npu.note.is_empty());
    }

    #[test]
    fn accel_device_is_available() {
        let npu = detect(
            "Intel(R) Core(TM) Ultra 7 155H",
            &AccelEvidence::Device {
                driver: Some("intel_vpu".to_owned()),
            },
        )
        .unwrap();
        assert!(npu.available);
        assert_eq!(npu.kind, INTEL_AI_BOOST);
        assert_eq!(npu.detection_method, NpuDetectionMethod::AccelDevice);
    }

    #[test]
    fn unknown_accel_without_inference() {
        let npu = detect("Some CPU", &AccelEvidence::Device { driver: None }).unwrap();
        assert_eq!(npu.kind, "Compute accelerator");
    }

    #[test]
    fn apple_platform() {
        let npu = detect("Apple M2 Pro", &AccelEvidence::Platform).unwrap();
        assert!(npu.available);
        assert_eq!(npu.detection_method, NpuDetectionMethod::Platform);

        // Intel Macs have no Neural Engine
        assert!(detect("Intel(R) Core(TM) i9-9880H", &AccelEvidence::Platform).is_none());
    }

    #[test]
    fn capability_matches_presence() {
        let (npu, delta) = collect("Apple M4");
        assert!(npu.is_some());
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::Npu && ok));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn accel_class_layout() {
        let root = tempfile::tempdir().unwrap();
        let empty = read_accel_class(root.path());
        assert_eq!(empty, AccelEvidence::None);

        let device = root.path().join("accel0").join("device");
        std::fs::create_dir_all(&device).unwrap();
        let driver_dir = root.path().join("drivers").join("amdxdna");
        std::fs::create_dir_all(&driver_dir).unwrap();
        std::os::unix::fs::symlink(&driver_dir, device.join("driver")).unwrap();

        assert_eq!(
            read_accel_class(root.path()),
            AccelEvidence::Device {
                driver: Some("amdxdna".to_owned())
            }
        );
    }
}
