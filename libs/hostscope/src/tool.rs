//! Bounded execution of external tools.
//!
//! Every external-tool probe goes through [`ToolRunner`]. The child is
//! spawned with `kill_on_drop`, so when the timeout fires or the caller
//! cancels, the pending wait is dropped and the process is killed and reaped.

use crate::error::{ProbeError, ProbeResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Runs external tools under a shared timeout and cancellation token.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
    cancel: CancellationToken,
}

impl ToolRunner {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `program` with `args` and return its stdout.
    ///
    /// Missing binaries and non-zero exits map to `SourceUnavailable`,
    /// non-UTF-8 output to `SourceMalformed`.
    pub async fn run(&self, program: &str, args: &[&str]) -> ProbeResult<String> {
        if self.cancel.is_cancelled() {
            return Err(ProbeError::cancelled(program));
        }

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::unavailable(program, e))?;

        tracing::trace!(program, ?args, pid = ?child.id(), "spawned external tool");

        let output = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(program, "external tool cancelled, killing process");
                return Err(ProbeError::cancelled(program));
            }
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ProbeError::unavailable(program, e)),
                Err(_) => {
                    tracing::debug!(
                        program,
                        timeout = %humantime::format_duration(self.timeout),
                        "external tool timed out, killing process"
                    );
                    return Err(ProbeError::timeout(program, self.timeout));
                }
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().next().unwrap_or_default().trim();
            return Err(ProbeError::unavailable(
                program,
                format!("exited with {}: {detail}", output.status),
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| ProbeError::malformed(program, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runner(timeout: Duration) -> ToolRunner {
        ToolRunner::new(timeout, CancellationToken::new())
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let err = runner(Duration::from_secs(1))
            .run("hostscope-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::SourceUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let out = runner(Duration::from_secs(5))
            .run("sh", &["-c", "echo hello"])
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_unavailable() {
        let err = runner(Duration::from_secs(5))
            .run("sh", &["-c", "echo boom >&2; exit 3"])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let started = Instant::now();
        let err = runner(Duration::from_millis(50))
            .run("sleep", &["5"])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::SourceTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_stops_tool() {
        let cancel = CancellationToken::new();
        let runner = ToolRunner::new(Duration::from_secs(30), cancel.clone());
        let started = Instant::now();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        trigger.await.unwrap();

        assert!(matches!(err, ProbeError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn already_cancelled_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ToolRunner::new(Duration::from_secs(1), cancel)
            .run("hostscope-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Cancelled { .. }));
    }
}
