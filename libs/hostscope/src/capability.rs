//! Capability ledger.
//!
//! A flat, fixed-schema record of which facts a collection run actually
//! obtained. Keys are declared up front by [`Capability`]; collectors only
//! flip values, they never invent keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every capability the ledger knows about, in serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Os,
    Cpu,
    CpuPhysicalCores,
    CpuFrequency,
    CpuFeatures,
    Memory,
    Swap,
    Storage,
    StorageSmart,
    Gpu,
    GpuDetails,
    Npu,
}

impl Capability {
    pub const ALL: [Self; 12] = [
        Self::Os,
        Self::Cpu,
        Self::CpuPhysicalCores,
        Self::CpuFrequency,
        Self::CpuFeatures,
        Self::Memory,
        Self::Swap,
        Self::Storage,
        Self::StorageSmart,
        Self::Gpu,
        Self::GpuDetails,
        Self::Npu,
    ];

    /// Facts drawn from guaranteed runtime sources. Always `true`.
    pub const CORE: [Self; 4] = [Self::Os, Self::Cpu, Self::Memory, Self::Storage];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::Cpu => "cpu",
            Self::CpuPhysicalCores => "cpu_physical_cores",
            Self::CpuFrequency => "cpu_frequency",
            Self::CpuFeatures => "cpu_features",
            Self::Memory => "memory",
            Self::Swap => "swap",
            Self::Storage => "storage",
            Self::StorageSmart => "storage_smart",
            Self::Gpu => "gpu",
            Self::GpuDetails => "gpu_details",
            Self::Npu => "npu",
        }
    }

    pub fn is_core(self) -> bool {
        Self::CORE.contains(&self)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability changes reported by one domain collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityDelta(Vec<(Capability, bool)>);

impl CapabilityDelta {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, capability: Capability, available: bool) -> Self {
        self.set(capability, available);
        self
    }

    pub fn set(&mut self, capability: Capability, available: bool) {
        self.0.push((capability, available));
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, bool)> + '_ {
        self.0.iter().copied()
    }
}

/// The ledger itself: one boolean per declared [`Capability`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Capability, bool>", into = "BTreeMap<Capability, bool>")]
pub struct Capabilities(BTreeMap<Capability, bool>);

impl Capabilities {
    /// Ledger with every key declared, core keys `true`, the rest `false`.
    pub fn new() -> Self {
        let flags = Capability::ALL
            .iter()
            .map(|&cap| (cap, cap.is_core()))
            .collect();
        Self(flags)
    }

    pub fn get(&self, capability: Capability) -> bool {
        self.0.get(&capability).copied().unwrap_or(false)
    }

    pub fn set(&mut self, capability: Capability, available: bool) {
        // Core facts are guaranteed by the runtime and stay on.
        let value = available || capability.is_core();
        self.0.insert(capability, value);
    }

    pub fn merge(&mut self, delta: &CapabilityDelta) {
        for (capability, available) in delta.iter() {
            self.set(capability, available);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, bool)> + '_ {
        self.0.iter().map(|(cap, value)| (*cap, *value))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<Capability, bool>> for Capabilities {
    fn from(decoded: BTreeMap<Capability, bool>) -> Self {
        let mut ledger = Self::new();
        for (capability, available) in decoded {
            ledger.set(capability, available);
        }
        ledger
    }
}

impl From<Capabilities> for BTreeMap<Capability, bool> {
    fn from(ledger: Capabilities) -> Self {
        ledger.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ledger_declares_every_key() {
        let ledger = Capabilities::new();
        assert_eq!(ledger.iter().count(), Capability::ALL.len());
        for cap in Capability::ALL {
            assert_eq!(ledger.get(cap), cap.is_core(), "{cap}");
        }
    }

    #[test]
    fn merge_only_flips_values() {
        let mut ledger = Capabilities::new();
        let delta = CapabilityDelta::new()
            .with(Capability::Gpu, true)
            .with(Capability::GpuDetails, false);
        ledger.merge(&delta);

        assert!(ledger.get(Capability::Gpu));
        assert!(!ledger.get(Capability::GpuDetails));
        assert_eq!(ledger.iter().count(), Capability::ALL.len());
    }

    #[test]
    fn core_capabilities_cannot_be_cleared() {
        let mut ledger = Capabilities::new();
        ledger.merge(&CapabilityDelta::new().with(Capability::Storage, false));
        assert!(ledger.get(Capability::Storage));
    }

    #[test]
    fn serializes_as_flat_snake_case_map() {
        let mut ledger = Capabilities::new();
        ledger.set(Capability::CpuPhysicalCores, true);
        let json = serde_json::to_value(&ledger).unwrap();

        assert_eq!(json["cpu_physical_cores"], true);
        assert_eq!(json["gpu"], false);
        assert_eq!(json["storage_smart"], false);
        assert_eq!(json.as_object().unwrap().len(), Capability::ALL.len());
    }

    #[test]
    fn partial_map_decodes_into_full_schema() {
        let ledger: Capabilities = serde_json::from_str(r#"{"gpu": true}"#).unwrap();
        assert!(ledger.get(Capability::Gpu));
        assert!(ledger.get(Capability::Os));
        assert!(!ledger.get(Capability::Npu));
        assert_eq!(ledger.iter().count(), Capability::ALL.len());
    }
}
