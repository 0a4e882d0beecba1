//! Rendering snapshots as text, JSON or YAML.
//!
//! Rendering is a pure function of the snapshot: nothing is re-queried and
//! nothing is computed beyond unit conversion.

use crate::error::FormatError;
use crate::model::{GpuInfo, NpuInfo, StorageVolume, SystemInfo};
use std::fmt::Write;
use std::str::FromStr;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(FormatError::UnknownFormat(s.to_owned())),
        }
    }
}

/// Render a snapshot.
///
/// # Errors
/// Returns `FormatError` if the serializer fails.
pub fn render(info: &SystemInfo, format: OutputFormat) -> Result<String, FormatError> {
    match format {
        OutputFormat::Text => render_text(info),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(info)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(info)?),
    }
}

fn mib(bytes: u64) -> u64 {
    bytes / MIB
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn render_text(info: &SystemInfo) -> Result<String, FormatError> {
    let mut b = String::new();

    writeln!(b, "OS: {}", info.os.name)?;
    writeln!(b, "Version: {}", info.os.version)?;
    writeln!(b, "Distribution: {}", info.os.distribution)?;
    writeln!(b, "Kernel: {}", info.os.kernel)?;
    writeln!(b, "Architecture: {}", info.os.arch)?;
    writeln!(b)?;

    writeln!(b, "CPU:")?;
    if !info.cpu.model.is_empty() {
        writeln!(b, "  Model: {}", info.cpu.model)?;
    }
    if !info.cpu.vendor.is_empty() {
        writeln!(b, "  Vendor: {}", info.cpu.vendor)?;
    }
    match info.cpu.physical_cores {
        Some(physical) => writeln!(
            b,
            "  Cores: {} logical, {physical} physical",
            info.cpu.logical_cores
        )?,
        None => writeln!(b, "  Cores: {} logical", info.cpu.logical_cores)?,
    }
    match info.cpu.max_frequency_mhz {
        Some(mhz) => writeln!(b, "  Frequency: {mhz} MHz")?,
        None => writeln!(b, "  Frequency: unknown")?,
    }
    if !info.cpu.features.is_empty() {
        writeln!(b, "  Features: {}", info.cpu.features.join(" "))?;
    }
    writeln!(b)?;

    let mem = &info.memory;
    writeln!(b, "Memory:")?;
    writeln!(b, "  Total: {} MB", mib(mem.total_bytes))?;
    writeln!(b, "  Available: {} MB", mib(mem.available_bytes))?;
    writeln!(b, "  Used: {} MB ({:.1}%)", mib(mem.used_bytes), mem.used_percent)?;
    if let Some(swap) = &mem.swap {
        writeln!(
            b,
            "  Swap: {} MB total, {} MB used ({:.1}%)",
            mib(swap.total_bytes),
            mib(swap.used_bytes),
            swap.used_percent
        )?;
    }
    writeln!(b)?;

    if !info.storage.is_empty() {
        write_storage(&mut b, &info.storage)?;
    }
    if let Some(gpu) = info.gpu.as_ref().filter(|g| !g.devices.is_empty()) {
        write_gpu(&mut b, gpu)?;
    }
    if let Some(npu) = &info.npu {
        write_npu(&mut b, npu)?;
    }

    writeln!(b, "Capabilities:")?;
    for (capability, available) in info.capabilities.iter() {
        writeln!(b, "  {capability}: {}", yes_no(available))?;
    }

    Ok(b)
}

fn write_storage(b: &mut String, volumes: &[StorageVolume]) -> std::fmt::Result {
    writeln!(b, "Storage:")?;
    for v in volumes {
        write!(
            b,
            "  {} ({}, {}): {} MB total, {} MB used ({:.1}%)",
            v.mountpoint,
            v.filesystem,
            v.device,
            mib(v.total_bytes),
            mib(v.used_bytes),
            v.used_percent
        )?;
        if v.read_only {
            write!(b, " [read-only]")?;
        }
        match v.smart_healthy {
            Some(true) => write!(b, " [SMART: passed]")?,
            Some(false) => write!(b, " [SMART: FAILED]")?,
            None => {}
        }
        writeln!(b)?;
    }
    writeln!(b)
}

fn write_gpu(b: &mut String, gpu: &GpuInfo) -> std::fmt::Result {
    writeln!(b, "GPU:")?;
    for d in &gpu.devices {
        write!(b, "  {} {} ({})", d.vendor, d.model, d.kind.as_str())?;
        if d.memory_bytes > 0 {
            write!(b, ", {} MB", mib(d.memory_bytes))?;
        } else if d.shared_memory {
            write!(b, ", shared memory")?;
        }
        if let Some(driver) = &d.driver_version {
            write!(b, ", driver {driver}")?;
        }
        writeln!(b)?;
    }
    writeln!(b)
}

fn write_npu(b: &mut String, npu: &NpuInfo) -> std::fmt::Result {
    writeln!(b, "NPU:")?;
    writeln!(b, "  Type: {}", npu.kind)?;
    writeln!(b, "  Available: {}", yes_no(npu.available))?;
    writeln!(b, "  Detection Method: {}", npu.detection_method.as_str())?;
    if !npu.note.is_empty() {
        writeln!(b, "  Note: {}", npu.note)?;
    }
    writeln!(b)
}
