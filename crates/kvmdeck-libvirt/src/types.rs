//! Shared types for the libvirt management crate.
//!
//! Covers VM state enums, the inventory mapping, detail records, lifecycle
//! actions and their outcomes, creation requests, OS profiles, provisioning
//! reports, configuration, and the events sent to the presentation layer.

use crate::error::LibvirtError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ─── VM State ────────────────────────────────────────────────────────

/// Runtime state of a libvirt domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VmState {
    Running,
    Shutoff,
    Paused,
    Blocked,
    ShuttingDown,
    Crashed,
    Suspended,
    NoState,
    Unknown,
}

impl Default for VmState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl VmState {
    /// Parse from the numeric `virDomainState` code.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::NoState,
            1 => Self::Running,
            2 => Self::Blocked,
            3 => Self::Paused,
            4 => Self::ShuttingDown,
            5 => Self::Shutoff,
            6 => Self::Crashed,
            7 => Self::Suspended,
            _ => Self::Unknown,
        }
    }

    /// Parse from the state string printed by `virsh dominfo` / `domstate`.
    pub fn from_virsh(s: &str) -> Self {
        match s.trim() {
            "running" => Self::Running,
            "idle" | "blocked" => Self::Blocked,
            "paused" => Self::Paused,
            "in shutdown" => Self::ShuttingDown,
            "shut off" => Self::Shutoff,
            "crashed" => Self::Crashed,
            "pmsuspended" => Self::Suspended,
            "no state" => Self::NoState,
            _ => Self::Unknown,
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Shutoff => "Shut off",
            Self::Paused => "Paused",
            Self::Blocked => "Blocked",
            Self::ShuttingDown => "Shutting down",
            Self::Crashed => "Crashed",
            Self::Suspended => "Suspended",
            Self::NoState => "No state",
            Self::Unknown => "Unknown",
        }
    }
}

/// Coarse status used by the inventory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmStatus {
    Running,
    Shutoff,
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Shutoff => write!(f, "Shutoff"),
        }
    }
}

// ─── Inventory ───────────────────────────────────────────────────────

/// Name → coarse status mapping, recomputed on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(BTreeMap<String, VmStatus>);

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the status of a VM.
    pub fn insert(&mut self, name: impl Into<String>, status: VmStatus) {
        self.0.insert(name.into(), status);
    }

    pub fn get(&self, name: &str) -> Option<VmStatus> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, VmStatus)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ─── Graphics / Disks ────────────────────────────────────────────────

/// Graphics channel declared by a domain descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphicsKind {
    Spice,
    Vnc,
    Other,
    None,
}

impl Default for GraphicsKind {
    fn default() -> Self {
        Self::None
    }
}

impl GraphicsKind {
    pub fn from_type_attr(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("spice") => Self::Spice,
            Some("vnc") => Self::Vnc,
            _ => Self::Other,
        }
    }

    /// Whether the bundled console viewer can attach to this channel.
    pub fn is_remote_display(&self) -> bool {
        matches!(self, Self::Spice | Self::Vnc)
    }
}

/// `device` attribute of a `<disk>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiskDevice {
    Disk,
    Cdrom,
    Floppy,
    Lun,
    Other,
}

impl DiskDevice {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            None | Some("disk") => Self::Disk,
            Some("cdrom") => Self::Cdrom,
            Some("floppy") => Self::Floppy,
            Some("lun") => Self::Lun,
            Some(_) => Self::Other,
        }
    }
}

/// A file-backed disk found in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSource {
    pub path: String,
    pub device: DiskDevice,
}

// ─── Live Info / Detail ──────────────────────────────────────────────

/// Raw live info as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub state: VmState,
    pub max_memory_kib: u64,
    pub used_memory_kib: u64,
    pub vcpus: u32,
    pub cpu_time_ns: u64,
}

/// Full detail record of a single VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    pub name: String,
    pub state: VmState,
    #[serde(rename = "ramAllocatedMB")]
    pub ram_allocated_mb: u64,
    #[serde(rename = "ramUsedMB")]
    pub ram_used_mb: u64,
    pub vcpu_count: u32,
    pub cpu_time_seconds: u64,
    pub disk_paths: Vec<String>,
    pub graphics_type: GraphicsKind,
}

impl VirtualMachine {
    /// First file-backed disk, or "unknown".
    pub fn primary_disk(&self) -> &str {
        self.disk_paths
            .first()
            .map(String::as_str)
            .unwrap_or(crate::descriptor::UNKNOWN_DISK)
    }
}

/// Result of one detail poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DetailSnapshot {
    Live(VirtualMachine),
    Degraded { message: String },
}

// ─── Actions ─────────────────────────────────────────────────────────

/// Lifecycle action requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum VmAction {
    Start,
    Stop,
    Reboot,
    Delete { confirmed: bool },
    ViewConsole,
}

impl VmAction {
    /// Verb used in messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reboot => "reboot",
            Self::Delete { .. } => "delete",
            Self::ViewConsole => "view the console of",
        }
    }
}

/// Paths handled by the disk reclamation step of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub removed: Vec<String>,
    pub already_missing: Vec<String>,
    pub failed: Vec<FailedRemoval>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRemoval {
    pub path: String,
    pub error: String,
}

/// Successful (or no-op) outcome of a dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ActionOutcome {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
    Rebooted,
    Deleted(DeleteSummary),
    ConsoleLaunching,
}

/// What the presentation layer receives after a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub vm: String,
    pub action: VmAction,
    pub outcome: Result<ActionOutcome, LibvirtError>,
    /// Inventory refreshed after the action; `None` if the refresh failed.
    pub inventory: Option<Inventory>,
}

// ─── Provisioning ────────────────────────────────────────────────────

/// Fixed set of OS profiles offered by the creation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OsProfile {
    Ubuntu2204,
    Debian12,
    LinuxMint,
    GenericLinux2022,
    CentOsStream9,
}

impl Default for OsProfile {
    fn default() -> Self {
        Self::Ubuntu2204
    }
}

impl OsProfile {
    pub const ALL: [OsProfile; 5] = [
        Self::Ubuntu2204,
        Self::Debian12,
        Self::LinuxMint,
        Self::GenericLinux2022,
        Self::CentOsStream9,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ubuntu2204 => "Ubuntu 22.04",
            Self::Debian12 => "Debian 12",
            Self::LinuxMint => "Linux Mint (Ubuntu based)",
            Self::GenericLinux2022 => "Generic Linux 2022",
            Self::CentOsStream9 => "CentOS Stream 9",
        }
    }

    /// Short identifier accepted on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ubuntu2204 => "ubuntu22.04",
            Self::Debian12 => "debian12",
            Self::LinuxMint => "linuxmint",
            Self::GenericLinux2022 => "linux2022",
            Self::CentOsStream9 => "centosstream9",
        }
    }

    /// osinfo name passed to the installer's OS detection.
    pub fn osinfo_hint(&self) -> &'static str {
        match self {
            Self::Ubuntu2204 | Self::LinuxMint => "ubuntu22.04",
            Self::Debian12 => "debian12",
            Self::GenericLinux2022 => "linux2022",
            Self::CentOsStream9 => "centosstream9",
        }
    }

    /// Accept either the key or the label (case-insensitive).
    pub fn lookup(value: &str) -> Option<Self> {
        let v = value.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(v) || p.label().eq_ignore_ascii_case(v))
    }
}

/// Entry of the OS profile picker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfileInfo {
    pub profile: OsProfile,
    pub key: String,
    pub label: String,
    pub osinfo_hint: String,
}

impl From<OsProfile> for OsProfileInfo {
    fn from(p: OsProfile) -> Self {
        Self {
            profile: p,
            key: p.key().to_string(),
            label: p.label().to_string(),
            osinfo_hint: p.osinfo_hint().to_string(),
        }
    }
}

/// Raw creation form as entered by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmCreateForm {
    pub name: String,
    pub ram_mb: String,
    pub vcpus: String,
    #[serde(default)]
    pub os_profile: OsProfile,
    pub install_media_path: String,
}

impl Default for VmCreateForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            ram_mb: "2048".into(),
            vcpus: "2".into(),
            os_profile: OsProfile::default(),
            install_media_path: String::new(),
        }
    }
}

/// Validated creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmCreationRequest {
    pub name: String,
    pub ram_mb: u32,
    pub vcpu_count: u32,
    pub os_profile: OsProfile,
    pub install_media_path: PathBuf,
    pub disk_path: PathBuf,
}

/// Post-create graphics verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum GraphicsCheck {
    Supported { graphics: GraphicsKind },
    /// The VM exists and is usable but remote display may not work.
    Unsupported { graphics: GraphicsKind, warning: String },
    /// The descriptor could not be read; creation still stands.
    Unverified { reason: String },
}

impl GraphicsCheck {
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Supported { .. } => None,
            Self::Unsupported { warning, .. } => Some(warning),
            Self::Unverified { reason } => Some(reason),
        }
    }
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReport {
    pub name: String,
    pub disk_path: PathBuf,
    pub graphics: GraphicsCheck,
    pub inventory: Option<Inventory>,
}

// ─── Events ──────────────────────────────────────────────────────────

/// Notifications pushed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VmEvent {
    DetailUpdated {
        vm: String,
        snapshot: DetailSnapshot,
        timestamp: DateTime<Utc>,
    },
    ConsoleLaunched {
        vm: String,
        pid: Option<u32>,
        timestamp: DateTime<Utc>,
    },
    ConsoleFailed {
        vm: String,
        error: LibvirtError,
        timestamp: DateTime<Utc>,
    },
}

// ─── Configuration ───────────────────────────────────────────────────

/// Default libvirt URI (system instance).
pub const DEFAULT_URI: &str = "qemu:///system";
/// Default directory holding provisioned disk images.
pub const DEFAULT_IMAGE_DIR: &str = "/var/lib/libvirt/images";

/// Connection and tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibvirtConfig {
    /// libvirt connection URI.
    pub uri: String,
    pub virsh_path: String,
    pub qemu_img_path: String,
    pub virt_install_path: String,
    pub viewer_path: String,
    /// Base directory of provisioned disk images.
    pub image_dir: PathBuf,
    /// Interval between detail polls of the selected VM.
    pub poll_interval_ms: u64,
    /// Per-call timeout for virsh; `None` waits indefinitely.
    pub command_timeout_seconds: Option<u64>,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.into(),
            virsh_path: "virsh".into(),
            qemu_img_path: "qemu-img".into(),
            virt_install_path: "virt-install".into(),
            viewer_path: "virt-viewer".into(),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            poll_interval_ms: 1000,
            command_timeout_seconds: None,
        }
    }
}
