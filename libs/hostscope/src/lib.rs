#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Host snapshot library
//!
//! Collects a best-effort snapshot of the machine the code runs on:
//! - OS, CPU, memory and storage, which are always reported
//! - GPU and NPU, which may legitimately be absent
//! - A capability ledger recording which facts were actually obtained
//!
//! Collection never fails because of the environment. A missing tool, an
//! unreadable file or a timeout leaves the fact absent and its capability
//! `false`.

mod cpu_collector;
mod memory_collector;
mod npu_collector;
mod os_collector;
mod probe;
mod storage_collector;

// Platform-specific probes
#[cfg(target_os = "linux")]
mod gpu_collector_linux;
#[cfg(target_os = "macos")]
mod gpu_collector_macos;
#[cfg(target_os = "windows")]
mod gpu_collector_windows;
#[cfg(target_os = "linux")]
mod storage_collector_linux;
#[cfg(not(target_os = "linux"))]
mod storage_collector_sysinfo;

pub mod capability;
pub mod config;
pub mod error;
pub mod format;
pub mod gpu_collector;
pub mod model;
pub mod platform;
pub mod tool;

mod collector;

pub use capability::{Capabilities, Capability, CapabilityDelta};
pub use collector::SystemCollector;
pub use config::CollectorConfig;
pub use error::{CollectError, FormatError, ProbeError, ProbeResult};
pub use format::{OutputFormat, render};
pub use gpu_collector::GpuProbe;
pub use model::*;
pub use platform::PlatformProbes;
pub use storage_collector::{MountEntry, StorageSource, Usage};
pub use tool::ToolRunner;
