use crate::capability::{Capability, CapabilityDelta};
use crate::error::{ProbeError, ProbeResult};
use crate::model::CpuInfo;
use crate::probe::ProbeResultExt;
use std::num::NonZeroUsize;
use sysinfo::{CpuRefreshKind, System};

#[cfg(target_os = "linux")]
const CPUINFO_PATH: &str = "/proc/cpuinfo";
#[cfg(target_os = "linux")]
const MAX_FREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";

/// Fields read from `/proc/cpuinfo`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CpuinfoFields {
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub flags: Vec<String>,
}

/// Brand, vendor and per-CPU frequencies as reported by `sysinfo`.
struct SysinfoCpu {
    brand: String,
    vendor: String,
    count: usize,
    max_frequency_mhz: u64,
}

fn probe_sysinfo() -> SysinfoCpu {
    let mut sys = System::new();
    sys.refresh_cpu_specifics(CpuRefreshKind::nothing().with_frequency());
    let cpus = sys.cpus();

    SysinfoCpu {
        brand: cpus
            .first()
            .map(|c| c.brand().trim().to_owned())
            .unwrap_or_default(),
        vendor: cpus
            .first()
            .map(|c| c.vendor_id().trim().to_owned())
            .unwrap_or_default(),
        count: cpus.len(),
        max_frequency_mhz: cpus.iter().map(sysinfo::Cpu::frequency).max().unwrap_or(0),
    }
}

/// Logical core count. Cannot fail: falls back to 1.
fn logical_cores(sysinfo_count: usize) -> u32 {
    let count = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(sysinfo_count)
        .max(1);
    // CPU count is always small, safe to truncate
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn probe_physical_cores() -> ProbeResult<u32> {
    let count = System::physical_core_count()
        .filter(|&n| n > 0)
        .ok_or_else(|| ProbeError::unavailable("sysinfo", "physical core count not reported"))?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

#[cfg(target_os = "linux")]
fn probe_max_frequency(sysinfo_mhz: u64) -> ProbeResult<u64> {
    match crate::probe::read_source(MAX_FREQ_PATH).and_then(|raw| parse_khz_as_mhz(&raw)) {
        Ok(mhz) => Ok(mhz),
        Err(e) if sysinfo_mhz > 0 => {
            tracing::trace!(error = %e, "cpufreq unavailable, using sysinfo frequency");
            Ok(sysinfo_mhz)
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(target_os = "linux"))]
fn probe_max_frequency(sysinfo_mhz: u64) -> ProbeResult<u64> {
    if sysinfo_mhz > 0 {
        Ok(sysinfo_mhz)
    } else {
        // Common on Apple Silicon
        Err(ProbeError::unavailable("sysinfo", "frequency not reported"))
    }
}

pub(crate) fn parse_khz_as_mhz(raw: &str) -> ProbeResult<u64> {
    let khz: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ProbeError::malformed("cpuinfo_max_freq", e))?;
    if khz == 0 {
        return Err(ProbeError::malformed("cpuinfo_max_freq", "zero frequency"));
    }
    Ok(khz / 1000)
}

/// Parse the first processor block of `/proc/cpuinfo`.
///
/// x86 reports `flags`, ARM reports `Features`.
pub(crate) fn parse_cpuinfo(text: &str) -> CpuinfoFields {
    let mut fields = CpuinfoFields::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key {
            "model name" | "cpu model" if fields.model.is_none() => {
                fields.model = Some(value.to_owned());
            }
            "vendor_id" if fields.vendor.is_none() => {
                fields.vendor = Some(value.to_owned());
            }
            "flags" | "Features" if fields.flags.is_empty() => {
                fields.flags = value.split_whitespace().map(str::to_owned).collect();
            }
            _ => {}
        }
    }

    fields.flags.sort();
    fields.flags.dedup();
    fields
}

#[cfg(target_os = "linux")]
fn probe_cpuinfo() -> ProbeResult<CpuinfoFields> {
    crate::probe::read_source(CPUINFO_PATH).map(|text| parse_cpuinfo(&text))
}

#[cfg(not(target_os = "linux"))]
fn probe_cpuinfo() -> ProbeResult<CpuinfoFields> {
    Err(ProbeError::unavailable("/proc/cpuinfo", "not a Linux host"))
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn runtime_features() -> Vec<String> {
    let mut found = Vec::new();
    macro_rules! detect {
        ($($feature:tt),* $(,)?) => {
            $(
                if std::arch::is_x86_feature_detected!($feature) {
                    found.push($feature.to_owned());
                }
            )*
        };
    }
    detect!(
        "aes", "avx", "avx2", "avx512f", "bmi1", "bmi2", "fma", "pclmulqdq", "popcnt", "sha",
        "sse2", "sse3", "sse4.1", "sse4.2", "ssse3",
    );
    found
}

#[cfg(target_arch = "aarch64")]
fn runtime_features() -> Vec<String> {
    let mut found = Vec::new();
    macro_rules! detect {
        ($($feature:tt),* $(,)?) => {
            $(
                if std::arch::is_aarch64_feature_detected!($feature) {
                    found.push($feature.to_owned());
                }
            )*
        };
    }
    detect!("aes", "crc", "dotprod", "fp16", "lse", "neon", "sha2", "sve");
    found
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn runtime_features() -> Vec<String> {
    Vec::new()
}

fn probe_features(cpuinfo: Option<&CpuinfoFields>) -> ProbeResult<Vec<String>> {
    if let Some(fields) = cpuinfo
        && !fields.flags.is_empty()
    {
        return Ok(fields.flags.clone());
    }
    let mut features = runtime_features();
    if features.is_empty() {
        return Err(ProbeError::unavailable(
            "runtime feature detection",
            "no features detected for this architecture",
        ));
    }
    features.sort();
    Ok(features)
}

/// CPU brand string, used by the NPU collector for model-based inference.
pub fn cpu_model() -> String {
    let brand = probe_sysinfo().brand;
    if !brand.is_empty() {
        return brand;
    }
    probe_cpuinfo()
        .available("cpu_model")
        .and_then(|f| f.model)
        .unwrap_or_default()
}

/// Collect CPU information. Always succeeds at the domain level.
pub fn collect() -> (CpuInfo, CapabilityDelta) {
    let sysinfo_cpu = probe_sysinfo();
    let cpuinfo = probe_cpuinfo().available("cpuinfo");

    let mut info = CpuInfo {
        model: sysinfo_cpu.brand,
        vendor: sysinfo_cpu.vendor,
        logical_cores: logical_cores(sysinfo_cpu.count),
        ..CpuInfo::default()
    };

    if let Some(fields) = &cpuinfo {
        if info.model.is_empty()
            && let Some(model) = &fields.model
        {
            info.model.clone_from(model);
        }
        if info.vendor.is_empty()
            && let Some(vendor) = &fields.vendor
        {
            info.vendor.clone_from(vendor);
        }
    }

    info.physical_cores = probe_physical_cores().available("cpu_physical_cores");
    info.max_frequency_mhz =
        probe_max_frequency(sysinfo_cpu.max_frequency_mhz).available("cpu_frequency");
    info.features = probe_features(cpuinfo.as_ref())
        .available("cpu_features")
        .unwrap_or_default();

    let delta = CapabilityDelta::new()
        .with(Capability::Cpu, true)
        .with(Capability::CpuPhysicalCores, info.physical_cores.is_some())
        .with(Capability::CpuFrequency, info.max_frequency_mhz.is_some())
        .with(Capability::CpuFeatures, !info.features.is_empty());

    tracing::debug!(
        model = %info.model,
        logical = info.logical_cores,
        physical = ?info.physical_cores,
        features = info.features.len(),
        "collected CPU info"
    );

    (info, delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    const X86_CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz
flags\t\t: fpu vme sse2 avx2 sse2 aes

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz
flags\t\t: fpu vme sse2 avx2 aes
";

    const ARM_CPUINFO: &str = "\
processor\t: 0
BogoMIPS\t: 48.00
Features\t: fp asimd evtstrm aes pmull sha1 sha2 crc32
CPU implementer\t: 0x41
";

    #[test]
    fn parses_x86_block() {
        let fields = parse_cpuinfo(X86_CPUINFO);
        assert_eq!(
            fields.model.as_deref(),
            Some("Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz")
        );
        assert_eq!(fields.vendor.as_deref(), Some("GenuineIntel"));
        assert_eq!(fields.flags, vec!["aes", "avx2", "fpu", "sse2", "vme"]);
    }

    #[test]
    fn parses_arm_features() {
        let fields = parse_cpuinfo(ARM_CPUINFO);
        assert!(fields.model.is_none());
        assert!(fields.flags.contains(&"asimd".to_owned()));
        assert!(fields.flags.contains(&"sha2".to_owned()));
    }

    #[test]
    fn empty_cpuinfo_yields_defaults() {
        assert_eq!(parse_cpuinfo(""), CpuinfoFields::default());
    }

    #[test]
    fn khz_conversion() {
        assert_eq!(parse_khz_as_mhz("4500000\n").unwrap(), 4500);
        assert!(parse_khz_as_mhz("fast").is_err());
        assert!(parse_khz_as_mhz("0").is_err());
    }

    #[test]
    fn logical_cores_never_zero() {
        assert!(logical_cores(0) >= 1);
    }

    #[test]
    fn collect_is_consistent_with_capabilities() {
        let (info, delta) = collect();
        assert!(info.logical_cores >= 1);

        for (cap, ok) in delta.iter() {
            match cap {
                Capability::Cpu => assert!(ok),
                Capability::CpuPhysicalCores => assert_eq!(ok, info.physical_cores.is_some()),
                Capability::CpuFrequency => assert_eq!(ok, info.max_frequency_mhz.is_some()),
                Capability::CpuFeatures => assert_eq!(ok, !info.features.is_empty()),
                other => panic!("unexpected capability {other}"),
            }
        }
    }
}
