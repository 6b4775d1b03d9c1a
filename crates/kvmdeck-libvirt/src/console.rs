//! Console viewer launch.
//!
//! The viewer is spawned on a separate tokio task so the caller never waits
//! for the external process. The result travels back as a [`VmEvent`].

use crate::error::{LibvirtError, LibvirtErrorKind};
use crate::types::{LibvirtConfig, VmEvent};
use chrono::Utc;
use log::{debug, info, warn};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

/// Spawns `virt-viewer --connect <uri> <vm>`.
#[derive(Clone)]
pub struct ConsoleLauncher {
    viewer_path: String,
    uri: String,
    events: UnboundedSender<VmEvent>,
}

impl ConsoleLauncher {
    pub fn new(config: &LibvirtConfig, events: UnboundedSender<VmEvent>) -> Self {
        Self {
            viewer_path: config.viewer_path.clone(),
            uri: config.uri.clone(),
            events,
        }
    }

    pub fn args(&self, vm: &str) -> Vec<String> {
        vec!["--connect".into(), self.uri.clone(), vm.to_string()]
    }

    /// Fire and forget. Must be called from within a tokio runtime.
    pub fn launch(&self, vm: &str) {
        let program = self.viewer_path.clone();
        let args = self.args(vm);
        let events = self.events.clone();
        let vm = vm.to_string();

        tokio::spawn(async move {
            let spawned = Command::new(&program)
                .args(&args)
                .stdin(std::process::Stdio::null())
                .spawn();

            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    let error = if e.kind() == std::io::ErrorKind::NotFound {
                        LibvirtError::tool_missing(&program)
                    } else {
                        LibvirtError::with_details(
                            LibvirtErrorKind::ConsoleLaunchFailed,
                            format!("Could not open the console of VM '{}'", vm),
                            e.to_string(),
                        )
                    };
                    warn!("{}", error);
                    let _ = events.send(VmEvent::ConsoleFailed {
                        vm,
                        error,
                        timestamp: Utc::now(),
                    });
                    return;
                }
            };

            let pid = child.id();
            info!("Console viewer for '{}' started (pid {:?})", vm, pid);
            let _ = events.send(VmEvent::ConsoleLaunched {
                vm: vm.clone(),
                pid,
                timestamp: Utc::now(),
            });

            match child.wait().await {
                Ok(status) => debug!("Console viewer for '{}' exited: {}", vm, status),
                Err(e) => warn!("Console viewer for '{}' could not be awaited: {}", vm, e),
            }
        });
    }
}
