use crate::error::{ProbeError, ProbeResult};
use crate::gpu_collector::{GpuProbe, native_device};
use crate::model::GpuDevice;
use crate::tool::ToolRunner;
use async_trait::async_trait;

/// Native enumeration via `wmic path win32_VideoController`.
#[derive(Debug, Default)]
pub struct WmicProbe;

#[async_trait]
impl GpuProbe for WmicProbe {
    fn name(&self) -> &'static str {
        "wmic"
    }

    async fn probe(&self, runner: &ToolRunner) -> ProbeResult<Vec<GpuDevice>> {
        let output = runner
            .run(
                "wmic",
                &[
                    "path",
                    "win32_VideoController",
                    "get",
                    "Name,AdapterRAM,DriverVersion,PNPDeviceID",
                    "/format:csv",
                ],
            )
            .await?;
        parse_wmic_csv(&output)
    }
}

/// `PCI\VEN_10DE&DEV_2484&...` yields `0x10de`.
fn pci_vendor_id(pnp_device_id: &str) -> Option<String> {
    let upper = pnp_device_id.to_ascii_uppercase();
    let start = upper.find("VEN_")? + 4;
    let id = upper.get(start..start + 4)?;
    Some(format!("0x{}", id.to_ascii_lowercase()))
}

/// wmic orders CSV columns alphabetically regardless of the request, so
/// columns are located through the header row.
pub(crate) fn parse_wmic_csv(output: &str) -> ProbeResult<Vec<GpuDevice>> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| ProbeError::malformed("wmic", "empty output"))?
        .split(',')
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| ProbeError::malformed("wmic", format!("missing {name} column")))
    };
    let name_col = column("Name")?;
    let ram_col = column("AdapterRAM")?;
    let driver_col = column("DriverVersion")?;
    let pnp_col = column("PNPDeviceID")?;

    let mut devices = Vec::new();
    for line in lines {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let Some(name) = parts.get(name_col).filter(|n| !n.is_empty()) else {
            continue;
        };
        let vendor = parts
            .get(pnp_col)
            .and_then(|p| pci_vendor_id(p))
            .unwrap_or_else(|| (*name).to_owned());

        let mut device = native_device(&vendor, name, "wmic");
        device.driver_version = parts
            .get(driver_col)
            .filter(|d| !d.is_empty())
            .map(|d| (*d).to_owned());
        // AdapterRAM is a 32-bit field and saturates at 4 GiB
        if let Some(bytes) = parts
            .get(ram_col)
            .and_then(|r| r.parse::<u64>().ok())
            .filter(|&b| b > 0)
            && !device.shared_memory
        {
            device.memory_bytes = bytes;
        }
        devices.push(device);
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GpuKind;

    const WMIC: &str = "\r\n\
Node,AdapterRAM,DriverVersion,Name,PNPDeviceID\r\n\
DESKTOP,4293918720,31.0.15.3623,NVIDIA GeForce RTX 3060,PCI\\VEN_10DE&DEV_2504&SUBSYS_397D1462&REV_A1\\4&1\r\n\
DESKTOP,1073741824,31.0.101.4502,Intel(R) UHD Graphics 770,PCI\\VEN_8086&DEV_4680&SUBSYS_7D251462&REV_0C\\3&1\r\n";

    #[test]
    fn parses_by_header_columns() {
        let devices = parse_wmic_csv(WMIC).unwrap();
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].vendor, "NVIDIA");
        assert_eq!(devices[0].model, "NVIDIA GeForce RTX 3060");
        assert_eq!(devices[0].kind, GpuKind::Discrete);
        assert_eq!(devices[0].memory_bytes, 4_293_918_720);
        assert_eq!(devices[0].driver_version.as_deref(), Some("31.0.15.3623"));

        assert_eq!(devices[1].vendor, "Intel");
        assert!(devices[1].shared_memory);
        assert_eq!(devices[1].memory_bytes, 0);
    }

    #[test]
    fn vendor_id_from_pnp() {
        assert_eq!(pci_vendor_id(r"PCI\VEN_1002&DEV_73BF").as_deref(), Some("0x1002"));
        assert_eq!(pci_vendor_id("ROOT\\BasicDisplay"), None);
    }

    #[test]
    fn missing_columns_are_malformed() {
        assert!(parse_wmic_csv("Node,Name\r\nX,Y\r\n").is_err());
        assert!(parse_wmic_csv("").is_err());
    }
}
