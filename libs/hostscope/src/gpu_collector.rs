//! GPU discovery.
//!
//! Probes run concurrently and are merged in priority order: vendor tools
//! first (`nvidia-smi`, `rocm-smi`), then the platform's native enumeration.
//! Every probe that answers contributes devices. A native device of a vendor
//! and kind that a vendor tool already reported is dropped.

use crate::capability::{Capability, CapabilityDelta};
use crate::error::{ProbeError, ProbeResult};
use crate::model::{GpuDevice, GpuInfo, GpuKind};
use crate::tool::ToolRunner;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

pub const VENDOR_NVIDIA: &str = "NVIDIA";
pub const VENDOR_AMD: &str = "AMD";
pub const VENDOR_INTEL: &str = "Intel";
pub const VENDOR_APPLE: &str = "Apple";

const MIB: u64 = 1024 * 1024;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static INTEL_DISCRETE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\barc(\(tm\))?\s+(pro\s+)?[ab]\d{2,3}|\bdg[12]\b")
        .expect("static regex should not panic")
});
#[allow(clippy::expect_used)] // good regex, it doesn't panic
static AMD_INTEGRATED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)radeon(\(tm\))?\s+(\d{3}m\s+)?graphics|\bvega\s+\d+\s+graphics|renoir|cezanne|rembrandt|phoenix|barcelo|lucienne|picasso|raven")
        .expect("static regex should not panic")
});

/// One way of discovering GPUs.
#[async_trait]
pub trait GpuProbe: Send + Sync {
    /// Name recorded as the device `source`.
    fn name(&self) -> &'static str;

    /// Vendor tools outrank native enumeration when both see a vendor.
    fn is_vendor_tool(&self) -> bool {
        false
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>>;
}

/// Map the many spellings of GPU vendors to one short name.
pub fn normalize_vendor(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.contains("nvidia") || lower.contains("0x10de") {
        VENDOR_NVIDIA.to_owned()
    } else if lower.contains("advanced micro devices")
        || lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == "amd" || w == "ati")
        || lower.contains("0x1002")
    {
        VENDOR_AMD.to_owned()
    } else if lower.contains("intel") || lower.contains("0x8086") {
        VENDOR_INTEL.to_owned()
    } else if lower.contains("apple") || lower.contains("0x106b") {
        VENDOR_APPLE.to_owned()
    } else if lower.is_empty() {
        "Unknown".to_owned()
    } else {
        raw.trim().to_owned()
    }
}

/// Integrated or discrete, from vendor and model name.
pub fn classify_kind(vendor: &str, model: &str) -> GpuKind {
    match vendor {
        VENDOR_APPLE => GpuKind::Integrated,
        VENDOR_NVIDIA => {
            let lower = model.to_lowercase();
            if lower.contains("tegra") || lower.contains("orin") || lower.contains("xavier") {
                GpuKind::Integrated
            } else {
                GpuKind::Discrete
            }
        }
        VENDOR_INTEL => {
            if INTEL_DISCRETE_REGEX.is_match(model) {
                GpuKind::Discrete
            } else {
                GpuKind::Integrated
            }
        }
        VENDOR_AMD => {
            if AMD_INTEGRATED_REGEX.is_match(model) {
                GpuKind::Integrated
            } else {
                GpuKind::Discrete
            }
        }
        _ => GpuKind::Unknown,
    }
}

/// Build a device from what a native enumeration knows: no driver version,
/// no dedicated memory figure.
pub(crate) fn native_device(vendor: &str, model: &str, source: &str) -> GpuDevice {
    let vendor = normalize_vendor(vendor);
    let model = match model.trim() {
        "" => "Unknown Model".to_owned(),
        m => m.to_owned(),
    };
    let kind = classify_kind(&vendor, &model);
    GpuDevice {
        kind,
        shared_memory: kind == GpuKind::Integrated,
        vendor,
        model,
        driver_version: None,
        memory_bytes: 0,
        source: source.to_owned(),
    }
}

/// `nvidia-smi --query-gpu=name,driver_version,memory.total`.
#[derive(Debug, Default)]
pub struct NvidiaSmiProbe;

pub(crate) fn parse_nvidia_smi(output: &str) -> ProbeResult<Vec<GpuDevice>> {
    let mut devices = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, driver, memory_mib] = parts.as_slice() else {
            return Err(ProbeError::malformed(
                "nvidia-smi",
                format!("expected 3 columns, got {}", parts.len()),
            ));
        };
        // "[N/A]" on some boards
        let memory_bytes = memory_mib.parse::<u64>().map_or(0, |mib| mib.saturating_mul(MIB));
        devices.push(GpuDevice {
            vendor: VENDOR_NVIDIA.to_owned(),
            model: (*name).to_owned(),
            kind: classify_kind(VENDOR_NVIDIA, name),
            driver_version: Some((*driver).to_owned()).filter(|d| !d.is_empty() && d != "[N/A]"),
            memory_bytes,
            shared_memory: memory_bytes == 0,
            source: "nvidia-smi".to_owned(),
        });
    }
    Ok(devices)
}

#[async_trait]
impl GpuProbe for NvidiaSmiProbe {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn is_vendor_tool(&self) -> bool {
        true
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
        let output = runner
            .run(
                "nvidia-smi",
                &[
                    "--query-gpu=name,driver_version,memory.total",
                    "--format=csv,noheader,nounits",
                ],
            )
            .await?;
        parse_nvidia_smi(&output)
    }
}

/// `rocm-smi --showproductname --showmeminfo vram --showdriverversion --json`.
#[derive(Debug, Default)]
pub struct RocmSmiProbe;

pub(crate) fn parse_rocm_smi(output: &str) -> ProbeResult<Vec<GpuDevice>> {
    let value: serde_json::Value =
        serde_json::from_str(output).map_err(|e| ProbeError::malformed("rocm-smi", e))?;
    let cards = value
        .as_object()
        .ok_or_else(|| ProbeError::malformed("rocm-smi", "top level is not an object"))?;

    let driver_version = cards
        .get("system")
        .and_then(|s| s.get("Driver version"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    let mut devices = Vec::new();
    for (key, card) in cards {
        if !key.starts_with("card") {
            continue;
        }
        let field = |name: &str| card.get(name).and_then(serde_json::Value::as_str);
        let model = field("Card Series")
            .or_else(|| field("Card series"))
            .or_else(|| field("Card model"))
            .unwrap_or("Unknown Model")
            .trim()
            .to_owned();
        let memory_bytes = field("VRAM Total Memory (B)")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let kind = classify_kind(VENDOR_AMD, &model);
        devices.push(GpuDevice {
            vendor: VENDOR_AMD.to_owned(),
            model,
            kind,
            driver_version: driver_version.clone(),
            memory_bytes,
            shared_memory: kind == GpuKind::Integrated || memory_bytes == 0,
            source: "rocm-smi".to_owned(),
        });
    }
    Ok(devices)
}

#[async_trait]
impl GpuProbe for RocmSmiProbe {
    fn name(&self) -> &'static str {
        "rocm-smi"
    }

    fn is_vendor_tool(&self) -> bool {
        true
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
        let output = runner
            .run(
                "rocm-smi",
                &[
                    "--showproductname",
                    "--showmeminfo",
                    "vram",
                    "--showdriverversion",
                    "--json",
                ],
            )
            .await?;
        parse_rocm_smi(&output)
    }
}

/// Run one probe under the runner's timeout and cancellation token.
async fn bounded_probe(probe: &dyn GpuProbe, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
    tokio::select! {
        biased;
        () = runner.cancel_token().cancelled() => Err(ProbeError::cancelled(probe.name())),
        result = tokio::time::timeout(runner.timeout(), probe.probe(runner)) => {
            result.unwrap_or_else(|_| Err(ProbeError::timeout(probe.name(), runner.timeout())))
        }
    }
}

/// Whether a vendor tool already reported this native device.
fn reported_by_vendor_tool(device: &GpuDevice, reported: &HashSet<(String, GpuKind)>) -> bool {
    match device.kind {
        GpuKind::Unknown => reported.iter().any(|(vendor, _)| *vendor == device.vendor),
        kind => reported.contains(&(device.vendor.clone(), kind)),
    }
}

/// Run every probe concurrently and merge what they found in probe order.
///
/// Each probe is bounded on its own, so a hanging tool costs at most one
/// timeout and never hides devices found by the others. Returns `None` when
/// no probe answered or the run was cancelled. `Some` with an empty device
/// list means enumeration worked and found nothing.
pub async fn collect(
    probes: &[Arc<dyn GpuProbe>],
    runner: &ToolRunner,
) -> (Option<GpuInfo>, CapabilityDelta) {
    let absent = || {
        (
            None,
            CapabilityDelta::new()
                .with(Capability::Gpu, false)
                .with(Capability::GpuDetails, false),
        )
    };

    let results = join_all(
        probes
            .iter()
            .map(|probe| bounded_probe(probe.as_ref(), runner)),
    )
    .await;

    if runner.cancel_token().is_cancelled() {
        tracing::debug!("GPU detection cancelled");
        return absent();
    }

    let mut answered = false;
    let mut vendor_tool_devices = HashSet::new();
    let mut devices: Vec<GpuDevice> = Vec::new();

    for (probe, result) in probes.iter().zip(results) {
        let found = match result {
            Ok(found) => found,
            Err(e) => {
                crate::probe::log_unavailable("gpu", &e);
                continue;
            }
        };
        answered = true;
        tracing::debug!(probe = probe.name(), devices = found.len(), "GPU probe answered");

        if probe.is_vendor_tool() {
            vendor_tool_devices.extend(found.iter().map(|d| (d.vendor.clone(), d.kind)));
            devices.extend(found);
        } else {
            devices.extend(
                found
                    .into_iter()
                    .filter(|d| !reported_by_vendor_tool(d, &vendor_tool_devices)),
            );
        }
    }

    if !answered {
        return absent();
    }

    devices.sort_by(|a, b| (&a.vendor, &a.model).cmp(&(&b.vendor, &b.model)));
    let details = devices.iter().any(|d| d.driver_version.is_some());

    let delta = CapabilityDelta::new()
        .with(Capability::Gpu, true)
        .with(Capability::GpuDetails, details);
    (Some(GpuInfo { devices }), delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct FixedProbe {
        name: &'static str,
        vendor_tool: bool,
        result: fn() -> ProbeResult<Vec<GpuDevice>>,
    }

    #[async_trait]
    impl GpuProbe for FixedProbe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_vendor_tool(&self) -> bool {
            self.vendor_tool
        }

        async fn probe(&self, _runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
            (self.result)()
        }
    }

    /// A vendor tool that never answers.
    struct WedgedTool;

    #[async_trait]
    impl GpuProbe for WedgedTool {
        fn name(&self) -> &'static str {
            "nvidia-smi"
        }

        fn is_vendor_tool(&self) -> bool {
            true
        }

        async fn probe(&self, _runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn runner() -> ToolRunner {
        ToolRunner::new(Duration::from_secs(1), CancellationToken::new())
    }

    #[test]
    fn vendor_names_are_normalized() {
        assert_eq!(normalize_vendor("NVIDIA Corporation"), "NVIDIA");
        assert_eq!(
            normalize_vendor("Advanced Micro Devices, Inc. [AMD/ATI]"),
            "AMD"
        );
        assert_eq!(normalize_vendor("Intel Corporation"), "Intel");
        assert_eq!(normalize_vendor("sppci_vendor_Apple"), "Apple");
        assert_eq!(normalize_vendor("Matrox Electronics Systems Ltd."), "Matrox Electronics Systems Ltd.");
        assert_eq!(normalize_vendor("  "), "Unknown");
    }

    #[test]
    fn corporation_is_not_ati() {
        assert_eq!(normalize_vendor("Some Corporation"), "Some Corporation");
    }

    #[test]
    fn kinds_are_classified() {
        assert_eq!(classify_kind("Apple", "Apple M2 Pro"), GpuKind::Integrated);
        assert_eq!(classify_kind("NVIDIA", "GeForce RTX 4090"), GpuKind::Discrete);
        assert_eq!(classify_kind("Intel", "UHD Graphics 630"), GpuKind::Integrated);
        assert_eq!(classify_kind("Intel", "Arc(TM) Graphics"), GpuKind::Integrated);
        assert_eq!(classify_kind("Intel", "Intel Arc A770"), GpuKind::Discrete);
        assert_eq!(classify_kind("AMD", "Radeon RX 7900 XTX"), GpuKind::Discrete);
        assert_eq!(classify_kind("AMD", "AMD Radeon(TM) Graphics"), GpuKind::Integrated);
        assert_eq!(classify_kind("Matrox", "G200eR2"), GpuKind::Unknown);
    }

    #[test]
    fn parses_nvidia_smi_csv() {
        let out = "NVIDIA GeForce RTX 3080, 535.104.05, 10240\nTesla T4, 535.104.05, [N/A]\n";
        let devices = parse_nvidia_smi(out).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].model, "NVIDIA GeForce RTX 3080");
        assert_eq!(devices[0].driver_version.as_deref(), Some("535.104.05"));
        assert_eq!(devices[0].memory_bytes, 10240 * MIB);
        assert_eq!(devices[0].kind, GpuKind::Discrete);
        assert_eq!(devices[1].memory_bytes, 0);
    }

    #[test]
    fn nvidia_smi_with_wrong_columns_is_malformed() {
        let err = parse_nvidia_smi("No devices were found, oops\n").unwrap_err();
        assert!(matches!(err, ProbeError::SourceMalformed { .. }));
        assert!(parse_nvidia_smi("").unwrap().is_empty());
    }

    #[test]
    fn parses_rocm_smi_json() {
        let out = r#"{
            "card0": {
                "Card Series": "Radeon RX 7900 XTX",
                "Card Vendor": "Advanced Micro Devices, Inc. [AMD/ATI]",
                "VRAM Total Memory (B)": "25753026560"
            },
            "system": {"Driver version": "6.7.0"}
        }"#;
        let devices = parse_rocm_smi(out).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor, "AMD");
        assert_eq!(devices[0].model, "Radeon RX 7900 XTX");
        assert_eq!(devices[0].memory_bytes, 25_753_026_560);
        assert_eq!(devices[0].driver_version.as_deref(), Some("6.7.0"));
        assert!(parse_rocm_smi("WARNING: no AMD GPU").is_err());
    }

    #[tokio::test]
    async fn no_probe_answering_means_absent() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![Arc::new(FixedProbe {
            name: "nvidia-smi",
            vendor_tool: true,
            result: || Err(ProbeError::unavailable("nvidia-smi", "not found")),
        })];
        let (gpu, delta) = collect(&probes, &runner()).await;
        assert!(gpu.is_none());
        assert!(delta.iter().all(|(_, ok)| !ok));
    }

    #[tokio::test]
    async fn union_drops_native_duplicates_and_sorts() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![
            Arc::new(FixedProbe {
                name: "nvidia-smi",
                vendor_tool: true,
                result: || parse_nvidia_smi("NVIDIA GeForce RTX 3080, 550.1, 10240"),
            }),
            Arc::new(FixedProbe {
                name: "lspci",
                vendor_tool: false,
                result: || {
                    Ok(vec![
                        native_device("NVIDIA Corporation", "GA102 [GeForce RTX 3080]", "lspci"),
                        native_device("Intel Corporation", "UHD Graphics 770", "lspci"),
                    ])
                },
            }),
        ];
        let (gpu, delta) = collect(&probes, &runner()).await;
        let devices = gpu.unwrap().devices;

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].vendor, "Intel");
        assert_eq!(devices[1].vendor, "NVIDIA");
        assert_eq!(devices[1].source, "nvidia-smi");
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::GpuDetails && ok));
    }

    #[tokio::test]
    async fn empty_enumeration_is_present_without_details() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![Arc::new(FixedProbe {
            name: "lspci",
            vendor_tool: false,
            result: || Ok(Vec::new()),
        })];
        let (gpu, delta) = collect(&probes, &runner()).await;
        assert_eq!(gpu, Some(GpuInfo::default()));
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::Gpu && ok));
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::GpuDetails && !ok));
    }

    #[tokio::test]
    async fn wedged_vendor_tool_keeps_native_devices() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![
            Arc::new(WedgedTool),
            Arc::new(FixedProbe {
                name: "lspci",
                vendor_tool: false,
                result: || {
                    Ok(vec![native_device(
                        "Intel Corporation",
                        "CoffeeLake-S GT2 [UHD Graphics 630]",
                        "lspci",
                    )])
                },
            }),
        ];
        let runner = ToolRunner::new(Duration::from_millis(300), CancellationToken::new());
        let started = std::time::Instant::now();
        let (gpu, delta) = collect(&probes, &runner).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let devices = gpu.unwrap().devices;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor, "Intel");
        assert!(delta.iter().any(|(cap, ok)| cap == Capability::Gpu && ok));
    }

    #[tokio::test]
    async fn cancelled_run_is_absent() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![Arc::new(WedgedTool)];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (gpu, delta) = collect(&probes, &ToolRunner::new(Duration::from_secs(5), cancel)).await;
        assert!(gpu.is_none());
        assert!(delta.iter().all(|(_, ok)| !ok));
    }

    #[tokio::test]
    async fn discrete_vendor_card_keeps_integrated_apu() {
        let probes: Vec<Arc<dyn GpuProbe>> = vec![
            Arc::new(FixedProbe {
                name: "rocm-smi",
                vendor_tool: true,
                result: || {
                    Ok(vec![GpuDevice {
                        vendor: VENDOR_AMD.to_owned(),
                        model: "Radeon RX 7900 XTX".to_owned(),
                        kind: GpuKind::Discrete,
                        driver_version: Some("6.7.0".to_owned()),
                        memory_bytes: 24 * 1024 * MIB,
                        shared_memory: false,
                        source: "rocm-smi".to_owned(),
                    }])
                },
            }),
            Arc::new(FixedProbe {
                name: "lspci",
                vendor_tool: false,
                result: || {
                    Ok(vec![
                        native_device(
                            "Advanced Micro Devices, Inc. [AMD/ATI]",
                            "Navi 31 [Radeon RX 7900 XTX]",
                            "lspci",
                        ),
                        native_device(
                            "Advanced Micro Devices, Inc. [AMD/ATI]",
                            "Phoenix1 [Radeon 780M Graphics]",
                            "lspci",
                        ),
                    ])
                },
            }),
        ];
        let (gpu, _) = collect(&probes, &runner()).await;
        let devices = gpu.unwrap().devices;

        assert_eq!(devices.len(), 2);
        assert!(devices.iter().any(|d| d.kind == GpuKind::Integrated && d.source == "lspci"));
        assert!(devices.iter().any(|d| d.kind == GpuKind::Discrete && d.source == "rocm-smi"));
    }
}
