use crate::error::{ProbeError, ProbeResult};
use crate::storage_collector::{MountEntry, StorageSource, Usage};
use sysinfo::Disks;

/// Mount enumeration through `sysinfo::Disks`, for hosts without a
/// `/proc` mount table.
#[derive(Debug, Default)]
pub struct SysinfoDisksSource;

impl StorageSource for SysinfoDisksSource {
    fn mounts(&self) -> ProbeResult<Vec<MountEntry>> {
        let disks = Disks::new_with_refreshed_list();
        if disks.list().is_empty() {
            return Err(ProbeError::unavailable("sysinfo", "no disks reported"));
        }

        let mounts = disks
            .list()
            .iter()
            .map(|disk| MountEntry {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                filesystem: disk.file_system().to_string_lossy().into_owned(),
                read_only: disk.is_read_only(),
                reported: Some(Usage {
                    total_bytes: disk.total_space(),
                    free_bytes: disk.available_space(),
                    available_bytes: disk.available_space(),
                }),
            })
            .collect();
        Ok(mounts)
    }

    #[cfg(unix)]
    fn usage(&self, mount: &MountEntry) -> ProbeResult<Usage> {
        crate::storage_collector::statvfs_usage(&mount.mountpoint)
    }

    #[cfg(not(unix))]
    fn usage(&self, mount: &MountEntry) -> ProbeResult<Usage> {
        mount
            .reported
            .ok_or_else(|| ProbeError::unavailable(&mount.mountpoint, "no usage reported"))
    }
}
