use crate::error::{ProbeError, ProbeResult};
use crate::gpu_collector::{GpuProbe, native_device};
use crate::model::GpuDevice;
use crate::tool::ToolRunner;
use async_trait::async_trait;
use std::path::Path;

const DRM_CLASS_PATH: &str = "/sys/class/drm";

/// PCI classes that carry a display or compute GPU.
const GPU_CLASSES: &[&str] = &[
    "VGA compatible controller",
    "3D controller",
    "Display controller",
];

/// Native enumeration: `lspci -mm`, falling back to the DRM class in sysfs
/// when `pciutils` is not installed.
#[derive(Debug, Default)]
pub struct LinuxPciProbe;

#[async_trait]
impl GpuProbe for LinuxPciProbe {
    fn name(&self) -> &'static str {
        "lspci"
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
        match runner.run("lspci", &["-mm"]).await {
            Ok(output) => Ok(parse_lspci_mm(&output)),
            Err(e @ (ProbeError::Cancelled { .. } | ProbeError::SourceTimeout { .. })) => Err(e),
            Err(e) => {
                tracing::trace!(error = %e, "lspci unavailable, reading DRM class");
                read_drm_cards(Path::new(DRM_CLASS_PATH))
            }
        }
    }
}

/// Split one `lspci -mm` line into its fields. Quoted fields may contain
/// spaces; unquoted ones (slot, `-rXX` revision) may not.
fn split_lspci_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            fields.push(stripped[..end].to_owned());
            rest = stripped.get(end + 1..).unwrap_or_default().trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            fields.push(rest[..end].to_owned());
            rest = rest[end..].trim_start();
        }
    }
    fields
}

/// Parse `lspci -mm`: `Slot "Class" "Vendor" "Device" [-rXX] "SVendor" "SDevice"`.
pub(crate) fn parse_lspci_mm(output: &str) -> Vec<GpuDevice> {
    output
        .lines()
        .filter_map(|line| {
            let fields = split_lspci_fields(line);
            let [_, class, vendor, device, ..] = fields.as_slice() else {
                return None;
            };
            if !GPU_CLASSES.contains(&class.as_str()) {
                return None;
            }
            Some(native_device(vendor, &marketing_name(device), "lspci"))
        })
        .collect()
}

/// `TU106 [GeForce RTX 2060 SUPER]` becomes `GeForce RTX 2060 SUPER`.
fn marketing_name(device: &str) -> String {
    match (device.find('['), device.rfind(']')) {
        (Some(open), Some(close)) if open < close => device[open + 1..close].to_owned(),
        _ => device.to_owned(),
    }
}

/// Enumerate `/sys/class/drm/card*/device/vendor`. Only PCI ids are known
/// here, so the model is the device id.
pub(crate) fn read_drm_cards(root: &Path) -> ProbeResult<Vec<GpuDevice>> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| ProbeError::unavailable(root.display().to_string(), e))?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // card0 is a GPU, card0-HDMI-A-1 is one of its connectors
        let is_card = name
            .strip_prefix("card")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if !is_card {
            continue;
        }

        let device_dir = entry.path().join("device");
        let Ok(vendor_id) = crate::probe::read_source(device_dir.join("vendor")) else {
            continue;
        };
        let device_id = crate::probe::read_source(device_dir.join("device")).unwrap_or_default();
        let model = match device_id.trim() {
            "" => String::new(),
            id => format!("PCI device {id}"),
        };
        devices.push(native_device(vendor_id.trim(), &model, "drm"));
    }
    Ok(devices)
}
