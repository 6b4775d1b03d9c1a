//! virsh execution engine.
//!
//! Wraps `tokio::process::Command` to invoke `virsh --connect <uri>` and
//! classifies its stderr into the crate's error kinds.

use crate::error::{LibvirtError, LibvirtErrorKind, LibvirtResult};
use crate::types::LibvirtConfig;
use log::{debug, trace, warn};
use std::time::Duration;
use tokio::process::Command;

/// Result of a virsh invocation.
#[derive(Debug, Clone)]
pub struct VirshOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl VirshOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty trimmed stdout lines (the shape of `list --name`).
    pub fn lines(&self) -> Vec<String> {
        parse_name_list(&self.stdout)
    }
}

/// Parse one-name-per-line output, dropping blank lines.
pub fn parse_name_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Map a failed invocation's stderr to an error.
pub fn classify_failure(stderr: &str, exit_code: i32) -> LibvirtError {
    let msg = if stderr.trim().is_empty() {
        format!("virsh exited with code {}", exit_code)
    } else {
        stderr.trim().to_string()
    };

    if msg.contains("failed to get domain") || msg.contains("Domain not found") {
        return LibvirtError::new(LibvirtErrorKind::VmNotFound, msg);
    }
    if msg.contains("failed to connect to the hypervisor")
        || msg.contains("Failed to connect socket")
    {
        return LibvirtError::connection(msg);
    }
    if msg.contains("Permission denied") || msg.contains("authentication") {
        return LibvirtError::access_denied(msg);
    }
    LibvirtError::control_plane(msg)
}

// ─── Executor ────────────────────────────────────────────────────────

/// virsh executor bound to one connection URI.
pub struct VirshExecutor {
    config: LibvirtConfig,
}

impl VirshExecutor {
    pub fn new(config: &LibvirtConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Execute `virsh --connect <uri> <args…>` and return raw output.
    pub async fn run(&self, args: &[&str]) -> LibvirtResult<VirshOutput> {
        debug!("virsh -c {} {}", self.config.uri, args.join(" "));

        // Output is parsed by its English labels and messages.
        let child = Command::new(&self.config.virsh_path)
            .env("LC_ALL", "C")
            .arg("--connect")
            .arg(&self.config.uri)
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LibvirtError::tool_missing(&self.config.virsh_path)
                } else {
                    LibvirtError::with_details(
                        LibvirtErrorKind::ControlPlaneError,
                        "Failed to spawn virsh",
                        e.to_string(),
                    )
                }
            })?;

        let waited = child.wait_with_output();
        let output = match self.config.command_timeout_seconds {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), waited)
                .await
                .map_err(|_| LibvirtError::timeout(&format!("virsh {}", args.join(" "))))?,
            None => waited.await,
        }
        .map_err(|e| {
            LibvirtError::with_details(
                LibvirtErrorKind::ControlPlaneError,
                "virsh process failed",
                e.to_string(),
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        trace!("virsh stdout ({} bytes)", stdout.len());
        if !stderr.trim().is_empty() {
            warn!("virsh stderr: {}", stderr.trim());
        }

        Ok(VirshOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Execute and assert success.
    pub async fn run_ok(&self, args: &[&str]) -> LibvirtResult<VirshOutput> {
        let output = self.run(args).await?;
        if !output.success() {
            return Err(classify_failure(&output.stderr, output.exit_code));
        }
        Ok(output)
    }

    /// Execute and return the non-empty stdout lines.
    pub async fn run_lines(&self, args: &[&str]) -> LibvirtResult<Vec<String>> {
        Ok(self.run_ok(args).await?.lines())
    }

    /// Run a command that produces no useful output.
    pub async fn run_void(&self, args: &[&str]) -> LibvirtResult<()> {
        self.run_ok(args).await?;
        Ok(())
    }
}
