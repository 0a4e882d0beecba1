use crate::capability::Capabilities;
use serde::{Deserialize, Serialize};

/// Percentage (0-100) of `used` over `total`.
/// Returns 0 if total is 0 to avoid division by zero.
pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((used as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

/// One best-effort snapshot of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: OsInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub storage: Vec<StorageVolume>,
    pub gpu: Option<GpuInfo>,
    pub npu: Option<NpuInfo>,
    pub capabilities: Capabilities,
}

/// Operating system information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub kernel: String,
    pub arch: String,
    /// Distribution id such as `ubuntu` or `macos`.
    pub distribution: String,
}

/// CPU information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// Brand string; empty when no source reported one.
    pub model: String,
    pub vendor: String,
    pub logical_cores: u32,
    pub physical_cores: Option<u32>,
    pub max_frequency_mhz: Option<u64>,
    /// Sorted, deduplicated instruction-set feature flags.
    pub features: Vec<String>,
}

/// Memory information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
    pub swap: Option<SwapInfo>,
}

impl MemoryInfo {
    /// Derives used bytes and percentage from total and available so the
    /// three numbers can never disagree.
    pub fn from_totals(total_bytes: u64, available_bytes: u64) -> Self {
        let available_bytes = available_bytes.min(total_bytes);
        let used_bytes = total_bytes - available_bytes;
        Self {
            total_bytes,
            available_bytes,
            used_bytes,
            used_percent: percent(used_bytes, total_bytes),
            swap: None,
        }
    }
}

/// Swap usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
}

impl SwapInfo {
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        let used_bytes = used_bytes.min(total_bytes);
        Self {
            total_bytes,
            used_bytes,
            used_percent: percent(used_bytes, total_bytes),
        }
    }
}

/// One mounted filesystem with usage figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub mountpoint: String,
    pub device: String,
    pub filesystem: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
    pub read_only: bool,
    /// Only set by the opt-in SMART extras probe.
    pub smart_healthy: Option<bool>,
}

/// GPU devices found by every probe that answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub devices: Vec<GpuDevice>,
}

/// GPU information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuDevice {
    pub vendor: String,
    pub model: String,
    pub kind: GpuKind,
    pub driver_version: Option<String>,
    /// Dedicated memory; 0 means shared/unified or unknown.
    pub memory_bytes: u64,
    pub shared_memory: bool,
    /// Probe that reported the device (e.g. `nvidia-smi`, `lspci`).
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuKind {
    Integrated,
    Discrete,
    Unknown,
}

impl GpuKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integrated => "integrated",
            Self::Discrete => "discrete",
            Self::Unknown => "unknown",
        }
    }
}

/// NPU (neural processing unit) detection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpuInfo {
    /// `true` when the OS exposes a usable device, `false` when the NPU is
    /// only inferred from the CPU model.
    pub available: bool,
    /// e.g. `Apple Neural Engine`, `Intel AI Boost`, `AMD Ryzen AI`.
    pub kind: String,
    pub detection_method: NpuDetectionMethod,
    /// What the detection method cannot tell.
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpuDetectionMethod {
    CpuModel,
    AccelDevice,
    Platform,
}

impl NpuDetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CpuModel => "cpu_model",
            Self::AccelDevice => "accel_device",
            Self::Platform => "platform",
        }
    }
}
