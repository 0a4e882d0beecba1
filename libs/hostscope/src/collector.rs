use crate::capability::{Capabilities, Capability, CapabilityDelta};
use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::model::{CpuInfo, GpuInfo, MemoryInfo, NpuInfo, OsInfo, StorageVolume, SystemInfo};
use crate::platform::PlatformProbes;
use crate::tool::ToolRunner;
use crate::{
    cpu_collector, gpu_collector, memory_collector, npu_collector, os_collector, storage_collector,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Main collector for system snapshots
#[derive(Debug, Clone)]
pub struct SystemCollector {
    config: CollectorConfig,
    probes: PlatformProbes,
}

impl SystemCollector {
    /// Collector using the probes for the current platform.
    ///
    /// # Errors
    /// Returns `CollectError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectError> {
        Self::with_probes(config, PlatformProbes::current())
    }

    /// Collector using caller-supplied probes.
    ///
    /// # Errors
    /// Returns `CollectError::InvalidConfig` if the configuration is invalid.
    pub fn with_probes(config: CollectorConfig, probes: PlatformProbes) -> Result<Self, CollectError> {
        config.validate()?;
        Ok(Self { config, probes })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Take one snapshot. Never fails: anything that could not be determined
    /// is absent and its capability is `false`.
    ///
    /// Cancelling `cancel` stops in-flight external tools; the snapshot is
    /// still returned with whatever the core collectors produced.
    pub async fn collect(&self, cancel: &CancellationToken) -> SystemInfo {
        let started = Instant::now();
        let runner = ToolRunner::new(self.config.tool_timeout, cancel.child_token());

        let (os, cpu, memory, storage, gpu, npu) = tokio::join!(
            run_blocking("os", os_collector::collect, fallback_os),
            run_blocking("cpu", cpu_collector::collect, fallback_cpu),
            run_blocking("memory", memory_collector::collect, fallback_memory),
            self.collect_storage(&runner),
            self.collect_gpu(&runner),
            self.collect_npu(&runner),
        );

        let mut capabilities = Capabilities::new();
        for delta in [&os.1, &cpu.1, &memory.1, &storage.1, &gpu.1, &npu.1] {
            capabilities.merge(delta);
        }

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis(),
            cancelled = cancel.is_cancelled(),
            "system snapshot collected"
        );

        SystemInfo {
            os: os.0,
            cpu: cpu.0,
            memory: memory.0,
            storage: storage.0,
            gpu: gpu.0,
            npu: npu.0,
            capabilities,
        }
    }

    async fn collect_storage(&self, runner: &ToolRunner) -> (Vec<StorageVolume>, CapabilityDelta) {
        let source = Arc::clone(&self.probes.storage);
        let (mut volumes, mut delta) = run_blocking(
            "storage",
            move || storage_collector::collect(source.as_ref()),
            || (Vec::new(), CapabilityDelta::new()),
        )
        .await;

        if self.config.extras {
            let verdicts = bounded(
                "storage_smart",
                runner,
                storage_collector::probe_smart(&volumes, runner),
            )
            .await
            .unwrap_or_default();
            let smart = storage_collector::apply_smart(&mut volumes, &verdicts);
            for (capability, available) in smart.iter() {
                delta.set(capability, available);
            }
        }
        (volumes, delta)
    }

    async fn collect_gpu(&self, runner: &ToolRunner) -> (Option<GpuInfo>, CapabilityDelta) {
        let absent = || {
            (
                None,
                CapabilityDelta::new()
                    .with(Capability::Gpu, false)
                    .with(Capability::GpuDetails, false),
            )
        };
        if !self.config.gpu {
            tracing::debug!("GPU detection disabled");
            return absent();
        }

        gpu_collector::collect(&self.probes.gpu, runner).await
    }

    async fn collect_npu(&self, runner: &ToolRunner) -> (Option<NpuInfo>, CapabilityDelta) {
        let absent = || (None, CapabilityDelta::new().with(Capability::Npu, false));
        if !self.config.npu {
            tracing::debug!("NPU detection disabled");
            return absent();
        }

        let detect = run_blocking(
            "npu",
            || npu_collector::collect(&cpu_collector::cpu_model()),
            absent,
        );
        bounded("npu", runner, detect).await.unwrap_or_else(absent)
    }
}

/// Run an optional collector under the tool timeout and cancellation token.
async fn bounded<T>(
    domain: &'static str,
    runner: &ToolRunner,
    work: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        () = runner.cancel_token().cancelled() => {
            tracing::debug!(domain, "collector cancelled");
            None
        }
        result = tokio::time::timeout(runner.timeout(), work) => match result {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::debug!(
                    domain,
                    timeout = %humantime::format_duration(runner.timeout()),
                    "collector timed out"
                );
                None
            }
        }
    }
}

/// Run a synchronous collector on the blocking pool. A panicking collector
/// yields `fallback` instead of tearing down the snapshot.
async fn run_blocking<T, F, D>(domain: &'static str, work: F, fallback: D) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    D: FnOnce() -> T,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(domain, error = %e, "collector task failed");
            fallback()
        }
    }
}

fn fallback_os() -> (OsInfo, CapabilityDelta) {
    let info = OsInfo {
        name: std::env::consts::OS.to_owned(),
        version: "unknown".to_owned(),
        kernel: "unknown".to_owned(),
        arch: std::env::consts::ARCH.to_owned(),
        distribution: std::env::consts::OS.to_owned(),
    };
    (info, CapabilityDelta::new())
}

fn fallback_cpu() -> (CpuInfo, CapabilityDelta) {
    let info = CpuInfo {
        logical_cores: 1,
        ..CpuInfo::default()
    };
    (info, CapabilityDelta::new())
}

fn fallback_memory() -> (MemoryInfo, CapabilityDelta) {
    (MemoryInfo::default(), CapabilityDelta::new())
}
