//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use kvmdeck_libvirt::types::{LibvirtConfig, OsProfile, VmAction, VmCreateForm};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kvmdeck")]
#[command(about = "Manage local libvirt virtual machines")]
#[command(version)]
pub struct Cli {
    /// libvirt connection URI.
    #[arg(short, long, env = "KVMDECK_URI", global = true)]
    pub uri: Option<String>,

    /// Config file path.
    #[arg(short, long, env = "KVMDECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for new disk images.
    #[arg(long, global = true)]
    pub image_dir: Option<PathBuf>,

    /// Per-call virsh timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Log level.
    #[arg(long, env = "RUST_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every VM with its status.
    List,
    /// Show the details of one VM.
    Info {
        name: String,
        /// Keep refreshing until interrupted.
        #[arg(short, long)]
        watch: bool,
    },
    /// Start a VM.
    Start { name: String },
    /// Power off a VM immediately.
    Stop { name: String },
    /// Reboot a running VM.
    Reboot { name: String },
    /// Remove a VM and delete its disk images.
    Delete {
        name: String,
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Open the graphical console of a running VM.
    Console { name: String },
    /// Allocate a disk and install a new VM.
    Create(CreateArgs),
    /// List the OS profiles accepted by `create --os`.
    OsProfiles,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    /// Memory in MB.
    #[arg(long, default_value = "2048")]
    pub ram: String,

    #[arg(long, default_value = "2")]
    pub vcpus: String,

    /// OS profile key or label (see `os-profiles`).
    #[arg(long = "os", default_value = "ubuntu22.04", value_parser = parse_os_profile)]
    pub os: OsProfile,

    /// Installation media (ISO image).
    #[arg(long)]
    pub iso: String,
}

impl From<CreateArgs> for VmCreateForm {
    fn from(args: CreateArgs) -> Self {
        Self {
            name: args.name,
            ram_mb: args.ram,
            vcpus: args.vcpus,
            os_profile: args.os,
            install_media_path: args.iso,
        }
    }
}

fn parse_os_profile(value: &str) -> Result<OsProfile, String> {
    OsProfile::lookup(value).ok_or_else(|| {
        let keys: Vec<&str> = OsProfile::ALL.iter().map(|p| p.key()).collect();
        format!("unknown OS profile '{}' (expected one of: {})", value, keys.join(", "))
    })
}

impl Command {
    /// The lifecycle action this subcommand maps to, if any.
    ///
    /// `delete` without `--yes` maps to an unconfirmed delete; the caller
    /// asks before dispatching.
    pub fn action(&self) -> Option<(&str, VmAction)> {
        match self {
            Self::Start { name } => Some((name.as_str(), VmAction::Start)),
            Self::Stop { name } => Some((name.as_str(), VmAction::Stop)),
            Self::Reboot { name } => Some((name.as_str(), VmAction::Reboot)),
            Self::Delete { name, yes } => Some((name.as_str(), VmAction::Delete { confirmed: *yes })),
            Self::Console { name } => Some((name.as_str(), VmAction::ViewConsole)),
            _ => None,
        }
    }

    /// Whether the command needs a control-plane connection.
    pub fn needs_connection(&self) -> bool {
        !matches!(self, Self::OsProfiles)
    }
}

impl Cli {
    /// Command-line values override the config file.
    pub fn apply_overrides(&self, mut config: LibvirtConfig) -> LibvirtConfig {
        if let Some(ref uri) = self.uri {
            config.uri = uri.clone();
        }
        if let Some(ref dir) = self.image_dir {
            config.image_dir = dir.clone();
        }
        if let Some(secs) = self.timeout {
            config.command_timeout_seconds = Some(secs);
        }
        config
    }
}
