use crate::error::{ProbeError, ProbeResult};
use crate::gpu_collector::{GpuProbe, native_device};
use crate::model::GpuDevice;
use crate::tool::ToolRunner;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static VRAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(MB|GB)\s*$").expect("static regex should not panic")
});

/// Native enumeration via `system_profiler SPDisplaysDataType -json`.
#[derive(Debug, Default)]
pub struct SystemProfilerProbe;

#[async_trait]
impl GpuProbe for SystemProfilerProbe {
    fn name(&self) -> &'static str {
        "system_profiler"
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
        let output = runner
            .run("system_profiler", &["SPDisplaysDataType", "-json"])
            .await?;
        parse_displays_json(&output)
    }
}

/// `"1536 MB"` or `"8 GB"` in bytes.
fn parse_vram(raw: &str) -> Option<u64> {
    let caps = VRAM_REGEX.captures(raw)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = if caps.get(2)?.as_str().eq_ignore_ascii_case("GB") {
        1024.0 * 1024.0 * 1024.0
    } else {
        1024.0 * 1024.0
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // non-negative by regex
    Some((amount * unit) as u64)
}

pub(crate) fn parse_displays_json(output: &str) -> ProbeResult<Vec<GpuDevice>> {
    let value: serde_json::Value =
        serde_json::from_str(output).map_err(|e| ProbeError::malformed("system_profiler", e))?;
    let displays = value
        .get("SPDisplaysDataType")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| ProbeError::malformed("system_profiler", "missing SPDisplaysDataType"))?;

    let devices = displays
        .iter()
        .map(|gpu| {
            let field = |name: &str| gpu.get(name).and_then(serde_json::Value::as_str);
            let model = field("sppci_model").unwrap_or_default();
            let vendor = field("spdisplays_vendor")
                .or_else(|| field("sppci_vendor"))
                .unwrap_or(model);

            let mut device = native_device(vendor, model, "system_profiler");
            // Dedicated VRAM only; Apple Silicon reports none and shares RAM
            if let Some(bytes) = field("spdisplays_vram")
                .or_else(|| field("sppci_vram"))
                .and_then(parse_vram)
            {
                device.memory_bytes = bytes;
                device.shared_memory = false;
            } else {
                device.shared_memory = true;
            }
            device
        })
        .collect();
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GpuKind;

    #[test]
    fn apple_silicon_has_shared_memory() {
        let out = r#"{"SPDisplaysDataType": [{
            "sppci_model": "Apple M2 Pro",
            "spdisplays_vendor": "sppci_vendor_Apple",
            "sppci_cores": "19"
        }]}"#;
        let devices = parse_displays_json(out).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor, "Apple");
        assert_eq!(devices[0].kind, GpuKind::Integrated);
        assert!(devices[0].shared_memory);
        assert_eq!(devices[0].memory_bytes, 0);
    }

    #[test]
    fn discrete_card_reports_vram() {
        let out = r#"{"SPDisplaysDataType": [{
            "sppci_model": "AMD Radeon Pro 5500M",
            "spdisplays_vendor": "sppci_vendor_amd",
            "spdisplays_vram": "8 GB"
        }]}"#;
        let devices = parse_displays_json(out).unwrap();
        assert_eq!(devices[0].vendor, "AMD");
        assert_eq!(devices[0].memory_bytes, 8 * 1024 * 1024 * 1024);
        assert!(!devices[0].shared_memory);
    }

    #[test]
    fn vram_units() {
        assert_eq!(parse_vram("1536 MB"), Some(1536 * 1024 * 1024));
        assert_eq!(parse_vram("lots"), None);
    }

    #[test]
    fn missing_section_is_malformed() {
        assert!(parse_displays_json("{}").is_err());
        assert!(parse_displays_json("not json").is_err());
    }
}
