use crate::config::{AppConfig, CliOverrides};
use anyhow::{Context, Result};
use clap::Args;
use hostscope::{Capability, OutputFormat, SystemCollector, SystemInfo};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collect and print a snapshot of this machine
#[derive(Args, Debug, Clone, Default)]
pub struct SystemArgs {
    /// Output format: text, json or yaml
    #[arg(short, long, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Timeout for each external tool, e.g. "5s" or "250ms"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Skip GPU detection
    #[arg(long)]
    pub no_gpu: bool,

    /// Skip NPU detection
    #[arg(long)]
    pub no_npu: bool,

    /// Also run privileged extras such as SMART health checks
    #[arg(long)]
    pub extras: bool,
}

impl SystemArgs {
    pub fn overrides(&self, verbose: u8) -> CliOverrides {
        CliOverrides {
            verbose,
            tool_timeout: self.timeout,
            no_gpu: self.no_gpu,
            no_npu: self.no_npu,
            extras: self.extras,
        }
    }

    pub async fn run(&self, config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
        let collector = SystemCollector::new(config.collector.clone())?;

        let info = collector.collect(cancel).await;
        let mut rendered = hostscope::render(&info, self.output)
            .with_context(|| format!("failed to render snapshot as {}", self.output))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }

        std::io::stdout()
            .lock()
            .write_all(rendered.as_bytes())
            .context("failed to write snapshot to stdout")?;

        if self.output == OutputFormat::Text {
            for note in unavailable_notes(&info, config) {
                eprintln!("note: {note}");
            }
        }
        Ok(())
    }
}

/// One-line hints about optional facts that were requested but not found.
pub fn unavailable_notes(info: &SystemInfo, config: &AppConfig) -> Vec<&'static str> {
    let caps = &info.capabilities;
    let mut notes = Vec::new();
    if config.collector.gpu && !caps.get(Capability::Gpu) {
        notes.push("GPU information unavailable");
    }
    if config.collector.npu && !caps.get(Capability::Npu) {
        notes.push("no NPU detected");
    }
    if config.collector.extras && !caps.get(Capability::StorageSmart) {
        notes.push("SMART health unavailable (smartctl missing or insufficient privileges)");
    }
    notes
}
