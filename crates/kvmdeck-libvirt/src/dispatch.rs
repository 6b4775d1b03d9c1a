//! Lifecycle action dispatch: start, stop, reboot, delete, view console.
//!
//! Delete reclaims only file-backed disks with `device="disk"`. Media
//! attached as cdrom, floppy or lun (install ISOs in particular) is left on
//! the filesystem.

use crate::console::ConsoleLauncher;
use crate::control::ControlPlane;
use crate::descriptor;
use crate::error::{LibvirtError, LibvirtErrorKind, LibvirtResult};
use crate::types::{ActionOutcome, DeleteSummary, FailedRemoval, VmAction};
use log::{info, warn};

/// Validates pre-conditions and invokes the matching control-plane call.
pub struct ActionDispatcher;

impl ActionDispatcher {
    /// Run one action against one VM.
    ///
    /// Unknown names fail with `VmNotFound` before any mutation. Control-plane
    /// failures are wrapped with the action verb and the VM name.
    pub async fn dispatch(
        cp: &dyn ControlPlane,
        console: &ConsoleLauncher,
        name: &str,
        action: VmAction,
    ) -> LibvirtResult<ActionOutcome> {
        let active = cp.is_active(name).await?;

        let result = match action {
            VmAction::Start => Self::start(cp, name, active).await,
            VmAction::Stop => Self::stop(cp, name, active).await,
            VmAction::Reboot => Self::reboot(cp, name, active).await,
            VmAction::Delete { confirmed } => Self::delete(cp, name, active, confirmed).await,
            VmAction::ViewConsole => Self::view_console(console, name, active),
        };

        result.map_err(|e| match e.kind {
            LibvirtErrorKind::StateConflict | LibvirtErrorKind::NotConfirmed => e,
            _ => LibvirtError::action_failed(action.verb(), name, e),
        })
    }

    async fn start(cp: &dyn ControlPlane, name: &str, active: bool) -> LibvirtResult<ActionOutcome> {
        if active {
            return Ok(ActionOutcome::AlreadyRunning);
        }
        info!("Starting VM '{}'", name);
        cp.start(name).await?;
        Ok(ActionOutcome::Started)
    }

    async fn stop(cp: &dyn ControlPlane, name: &str, active: bool) -> LibvirtResult<ActionOutcome> {
        if !active {
            return Ok(ActionOutcome::AlreadyStopped);
        }
        info!("Force-stopping VM '{}'", name);
        cp.force_stop(name).await?;
        Ok(ActionOutcome::Stopped)
    }

    async fn reboot(cp: &dyn ControlPlane, name: &str, active: bool) -> LibvirtResult<ActionOutcome> {
        if !active {
            return Err(LibvirtError::invalid_state(name, "reboot", "running"));
        }
        info!("Rebooting VM '{}'", name);
        cp.reboot(name).await?;
        Ok(ActionOutcome::Rebooted)
    }

    /// Capture disks, stop if needed, undefine, then reclaim the disks.
    async fn delete(
        cp: &dyn ControlPlane,
        name: &str,
        active: bool,
        confirmed: bool,
    ) -> LibvirtResult<ActionOutcome> {
        if !confirmed {
            return Err(LibvirtError::not_confirmed(name));
        }

        // The descriptor is gone once the definition is removed.
        let xml = cp.descriptor(name).await?;
        let paths = descriptor::introspect(&xml).reclaimable_paths();
        info!("Deleting VM '{}' ({} disk image(s))", name, paths.len());

        if active {
            cp.force_stop(name).await?;
        }
        cp.undefine(name).await?;

        Ok(ActionOutcome::Deleted(reclaim_disks(&paths).await))
    }

    fn view_console(
        console: &ConsoleLauncher,
        name: &str,
        active: bool,
    ) -> LibvirtResult<ActionOutcome> {
        if !active {
            return Err(LibvirtError::invalid_state(name, "view the console of", "running"));
        }
        console.launch(name);
        Ok(ActionOutcome::ConsoleLaunching)
    }
}

/// Delete each path independently; a missing file is not an error.
pub async fn reclaim_disks(paths: &[String]) -> DeleteSummary {
    let mut summary = DeleteSummary::default();
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("Removed disk image {}", path);
                summary.removed.push(path.clone());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                summary.already_missing.push(path.clone());
            }
            Err(e) => {
                warn!("Could not remove disk image {}: {}", path, e);
                summary.failed.push(FailedRemoval {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    summary
}
