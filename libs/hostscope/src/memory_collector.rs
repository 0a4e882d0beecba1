use crate::capability::{Capability, CapabilityDelta};
use crate::error::{ProbeError, ProbeResult};
use crate::model::{MemoryInfo, SwapInfo};
use crate::probe::ProbeResultExt;
use sysinfo::{MemoryRefreshKind, System};

fn probe_swap(sys: &System) -> ProbeResult<SwapInfo> {
    let total = sys.total_swap();
    if total == 0 {
        return Err(ProbeError::unavailable("sysinfo", "no swap configured"));
    }
    Ok(SwapInfo::new(total, sys.used_swap()))
}

/// Collect RAM and swap figures. Used bytes and percentages are derived
/// from total and available, never taken from the source.
pub fn collect() -> (MemoryInfo, CapabilityDelta) {
    let mut sys = System::new();
    sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram().with_swap());

    let mut info = MemoryInfo::from_totals(sys.total_memory(), sys.available_memory());
    info.swap = probe_swap(&sys).available("swap");

    tracing::debug!(
        total = info.total_bytes,
        available = info.available_bytes,
        swap = info.swap.is_some(),
        "collected memory info"
    );

    let delta = CapabilityDelta::new()
        .with(Capability::Memory, true)
        .with(Capability::Swap, info.swap.is_some());
    (info, delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_total_is_reported() {
        let (info, delta) = collect();
        assert!(info.total_bytes > 0);
        assert_eq!(info.used_bytes, info.total_bytes - info.available_bytes);
        assert!((0.0..=100.0).contains(&info.used_percent));
        assert!(
            delta
                .iter()
                .any(|(cap, ok)| cap == Capability::Swap && ok == info.swap.is_some())
        );
    }
}
