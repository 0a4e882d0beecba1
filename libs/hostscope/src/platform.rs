//! Per-platform probe selection.

use crate::gpu_collector::{GpuProbe, NvidiaSmiProbe, RocmSmiProbe};
use crate::storage_collector::StorageSource;
use std::sync::Arc;

/// The probes a collection run uses. [`PlatformProbes::current`] picks the
/// implementations for the host; tests substitute their own.
#[derive(Clone)]
pub struct PlatformProbes {
    pub storage: Arc<dyn StorageSource>,
    /// GPU probes in priority order.
    pub gpu: Vec<Arc<dyn GpuProbe>>,
}

impl PlatformProbes {
    pub fn current() -> Self {
        Self {
            storage: storage_source(),
            gpu: gpu_probes(),
        }
    }
}

impl std::fmt::Debug for PlatformProbes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gpu: Vec<&str> = self.gpu.iter().map(|p| p.name()).collect();
        f.debug_struct("PlatformProbes").field("gpu", &gpu).finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
fn storage_source() -> Arc<dyn StorageSource> {
    Arc::new(crate::storage_collector_linux::ProcMountsSource)
}

#[cfg(not(target_os = "linux"))]
fn storage_source() -> Arc<dyn StorageSource> {
    Arc::new(crate::storage_collector_sysinfo::SysinfoDisksSource)
}

fn gpu_probes() -> Vec<Arc<dyn GpuProbe>> {
    #[cfg_attr(
        not(any(target_os = "linux", target_os = "macos", target_os = "windows")),
        allow(unused_mut)
    )]
    let mut probes: Vec<Arc<dyn GpuProbe>> = vec![Arc::new(NvidiaSmiProbe), Arc::new(RocmSmiProbe)];

    #[cfg(target_os = "linux")]
    probes.push(Arc::new(crate::gpu_collector_linux::LinuxPciProbe));
    #[cfg(target_os = "macos")]
    probes.push(Arc::new(crate::gpu_collector_macos::SystemProfilerProbe));
    #[cfg(target_os = "windows")]
    probes.push(Arc::new(crate::gpu_collector_windows::WmicProbe));

    probes
}
