//! Error types for the libvirt management crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds for libvirt operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LibvirtErrorKind {
    /// The control plane cannot be reached (fatal at startup).
    ConnectionError,
    /// The target VM is not known to the control plane.
    VmNotFound,
    /// The requested action is invalid for the current VM state.
    StateConflict,
    /// A destructive action was invoked without confirmation.
    NotConfirmed,
    /// A start / stop / reboot / undefine / query call failed.
    ControlPlaneError,
    /// A creation request is malformed.
    ValidationError,
    /// Disk allocation or the installer failed.
    ProvisioningStepError,
    /// An external executable (virsh, qemu-img, virt-install, virt-viewer) is not installed.
    ToolMissing,
    /// The console viewer could not be started for another reason.
    ConsoleLaunchFailed,
    /// Insufficient privileges on the control plane.
    AccessDenied,
    /// A control-plane call exceeded the configured timeout.
    Timeout,
    /// Output from an external tool could not be parsed.
    ParseError,
    /// A filesystem operation failed.
    IoError,
    /// A generic / uncategorised error.
    Other,
}

/// libvirt management error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibvirtError {
    pub kind: LibvirtErrorKind,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl fmt::Display for LibvirtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(ref d) = self.details {
            write!(f, ": {}", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for LibvirtError {}

impl LibvirtError {
    pub fn new(kind: LibvirtErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        kind: LibvirtErrorKind,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn connection(details: impl Into<String>) -> Self {
        Self::with_details(
            LibvirtErrorKind::ConnectionError,
            "Could not connect to the libvirt control plane",
            details,
        )
    }

    pub fn vm_not_found(name: &str) -> Self {
        Self::new(
            LibvirtErrorKind::VmNotFound,
            format!("VM '{}' not found", name),
        )
    }

    pub fn invalid_state(vm: &str, action: &str, required: &str) -> Self {
        Self::new(
            LibvirtErrorKind::StateConflict,
            format!("Cannot {} VM '{}': it must be {}", action, vm, required),
        )
    }

    pub fn not_confirmed(vm: &str) -> Self {
        Self::new(
            LibvirtErrorKind::NotConfirmed,
            format!("Deleting VM '{}' requires confirmation", vm),
        )
    }

    pub fn control_plane(stderr: impl Into<String>) -> Self {
        Self::new(LibvirtErrorKind::ControlPlaneError, stderr)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(LibvirtErrorKind::ValidationError, message)
    }

    pub fn tool_missing(tool: &str) -> Self {
        Self::new(
            LibvirtErrorKind::ToolMissing,
            format!("'{}' is not installed or not on PATH", tool),
        )
    }

    pub fn timeout(op: &str) -> Self {
        Self::new(
            LibvirtErrorKind::Timeout,
            format!("Operation '{}' timed out", op),
        )
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(LibvirtErrorKind::ParseError, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(LibvirtErrorKind::AccessDenied, message)
    }

    pub fn io(message: impl Into<String>, err: &std::io::Error) -> Self {
        Self::with_details(LibvirtErrorKind::IoError, message, err.to_string())
    }

    /// Wrap a failure of a lifecycle action, keeping the source kind and
    /// moving the underlying message into `details`.
    pub fn action_failed(action: &str, vm: &str, source: LibvirtError) -> Self {
        let details = match source.details {
            Some(d) => format!("{}: {}", source.message, d),
            None => source.message,
        };
        Self::with_details(
            source.kind,
            format!("Failed to {} VM '{}'", action, vm),
            details,
        )
    }
}

/// Convert a `LibvirtError` into a plain `String` for command returns.
impl From<LibvirtError> for String {
    fn from(e: LibvirtError) -> String {
        e.to_string()
    }
}

/// Convenience alias.
pub type LibvirtResult<T> = Result<T, LibvirtError>;
