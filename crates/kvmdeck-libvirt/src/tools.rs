//! External provisioning tools (`qemu-img`, `virt-install`).

use crate::error::{LibvirtError, LibvirtErrorKind, LibvirtResult};
use log::{debug, warn};
use tokio::process::Command;

/// Output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external program to completion.
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    /// Spawn `program` with `args` and wait for it.
    ///
    /// A missing executable is `ToolMissing`; a non-zero exit is returned as
    /// output, not as an error.
    async fn run(&self, program: &str, args: &[String]) -> LibvirtResult<ToolOutput>;
}

/// [`ToolRunner`] backed by real processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessToolRunner;

#[async_trait::async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, program: &str, args: &[String]) -> LibvirtResult<ToolOutput> {
        debug!("exec {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LibvirtError::tool_missing(program)
                } else {
                    LibvirtError::with_details(
                        LibvirtErrorKind::ProvisioningStepError,
                        format!("Failed to run '{}'", program),
                        e.to_string(),
                    )
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.trim().is_empty() {
            warn!("{} stderr: {}", program, stderr.trim());
        }
        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
