//! Storage volume collection.
//!
//! Mounted filesystems are enumerated first, then usage is queried for each
//! mountpoint on its own. A mountpoint whose usage query fails is dropped,
//! so a partial failure shortens the list instead of polluting it.

use crate::capability::{Capability, CapabilityDelta};
use crate::error::{ProbeError, ProbeResult};
use crate::model::{StorageVolume, percent};
use crate::probe::ProbeResultExt;
use crate::tool::ToolRunner;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Kernel and virtual filesystems that carry no user storage.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "overlay",
    "proc",
    "pstore",
    "ramfs",
    "rpc_pipefs",
    "securityfs",
    "squashfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

const SMARTCTL: &str = "smartctl";
const SMARTCTL_HEALTH_ARGS: &[&str] = &["-H", "-j"];

/// A mounted filesystem as reported by the enumeration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub filesystem: String,
    pub read_only: bool,
    /// Usage figures already known from enumeration, if the source has them.
    pub reported: Option<Usage>,
}

/// Usage figures for one mountpoint, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_bytes: u64,
    /// Free blocks including those reserved for the superuser.
    pub free_bytes: u64,
    /// Free blocks available to unprivileged users.
    pub available_bytes: u64,
}

/// Enumerates mounts and queries their usage independently.
pub trait StorageSource: Send + Sync {
    /// # Errors
    /// Returns a probe error if the mount table cannot be read at all.
    fn mounts(&self) -> ProbeResult<Vec<MountEntry>>;

    /// # Errors
    /// Returns a probe error if usage for this mountpoint cannot be queried.
    fn usage(&self, mount: &MountEntry) -> ProbeResult<Usage>;
}

pub fn is_pseudo_filesystem(filesystem: &str) -> bool {
    PSEUDO_FILESYSTEMS.contains(&filesystem)
}

/// Usage of the filesystem mounted at `mountpoint`, via `statvfs(2)`.
#[cfg(unix)]
#[allow(clippy::useless_conversion)] // block counter widths differ per platform
pub(crate) fn statvfs_usage(mountpoint: &str) -> ProbeResult<Usage> {
    let stat = nix::sys::statvfs::statvfs(mountpoint)
        .map_err(|e| ProbeError::unavailable(mountpoint, e))?;
    let fragment = u64::from(stat.fragment_size());
    Ok(Usage {
        total_bytes: u64::from(stat.blocks()).saturating_mul(fragment),
        free_bytes: u64::from(stat.blocks_free()).saturating_mul(fragment),
        available_bytes: u64::from(stat.blocks_available()).saturating_mul(fragment),
    })
}

fn to_volume(mount: MountEntry, usage: Usage) -> StorageVolume {
    let total = usage.total_bytes;
    let free = usage.free_bytes.min(total);
    let used = total - free;
    StorageVolume {
        mountpoint: mount.mountpoint,
        device: mount.device,
        filesystem: mount.filesystem,
        total_bytes: total,
        used_bytes: used,
        available_bytes: usage.available_bytes.min(total),
        used_percent: percent(used, total),
        read_only: mount.read_only,
        smart_healthy: None,
    }
}

/// Keep only the last mount for each mountpoint; later mounts shadow
/// earlier ones.
fn dedup_mountpoints(mounts: Vec<MountEntry>) -> Vec<MountEntry> {
    let mut seen = HashSet::new();
    let mut unique: Vec<MountEntry> = mounts
        .into_iter()
        .rev()
        .filter(|m| seen.insert(m.mountpoint.clone()))
        .collect();
    unique.reverse();
    unique
}

/// Collect storage volumes. Always succeeds at the domain level; an
/// unreadable mount table yields an empty list.
pub fn collect(source: &dyn StorageSource) -> (Vec<StorageVolume>, CapabilityDelta) {
    let mounts = source.mounts().available("storage_mounts").unwrap_or_default();

    let volumes: Vec<StorageVolume> = dedup_mountpoints(mounts)
        .into_iter()
        .filter(|m| !is_pseudo_filesystem(&m.filesystem))
        .filter_map(|m| match source.usage(&m) {
            Ok(usage) => Some(to_volume(m, usage)),
            Err(e) => {
                tracing::debug!(mountpoint = %m.mountpoint, error = %e, "dropping volume");
                None
            }
        })
        .collect();

    tracing::debug!(volumes = volumes.len(), "collected storage info");

    let delta = CapabilityDelta::new()
        .with(Capability::Storage, true)
        .with(Capability::StorageSmart, false);
    (volumes, delta)
}

/// Parse `smartctl -H -j` output into the overall health verdict.
pub(crate) fn parse_smartctl_health(json: &str) -> ProbeResult<bool> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ProbeError::malformed("smartctl", e))?;
    value
        .get("smart_status")
        .and_then(|s| s.get("passed"))
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| ProbeError::malformed("smartctl", "missing smart_status.passed"))
}

/// Opt-in SMART health pass. Usually requires elevated privileges; without
/// them every query fails and no verdict is returned.
///
/// Devices are queried concurrently, so the pass takes about one tool
/// timeout however many devices there are.
pub async fn probe_smart(volumes: &[StorageVolume], runner: &ToolRunner) -> HashMap<String, bool> {
    query_health(volumes, runner, SMARTCTL, SMARTCTL_HEALTH_ARGS).await
}

async fn query_health(
    volumes: &[StorageVolume],
    runner: &ToolRunner,
    program: &str,
    args: &[&str],
) -> HashMap<String, bool> {
    let devices: BTreeSet<&str> = volumes
        .iter()
        .map(|v| v.device.as_str())
        .filter(|device| device.starts_with("/dev/"))
        .collect();

    let queries = devices.into_iter().map(|device| async move {
        let mut full_args = args.to_vec();
        full_args.push(device);
        let verdict = match runner.run(program, &full_args).await {
            Ok(out) => parse_smartctl_health(&out).available("storage_smart"),
            Err(e) => {
                crate::probe::log_unavailable("storage_smart", &e);
                None
            }
        };
        verdict.map(|healthy| (device.to_owned(), healthy))
    });

    join_all(queries).await.into_iter().flatten().collect()
}

/// Record SMART verdicts on the volumes they belong to.
pub fn apply_smart(volumes: &mut [StorageVolume], verdicts: &HashMap<String, bool>) -> CapabilityDelta {
    for volume in &mut *volumes {
        volume.smart_healthy = verdicts.get(&volume.device).copied();
    }
    let any = volumes.iter().any(|v| v.smart_healthy.is_some());
    CapabilityDelta::new().with(Capability::StorageSmart, any)
}
