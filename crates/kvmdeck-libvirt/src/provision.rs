//! VM provisioning: validate the form, allocate the disk image, run the
//! installer, then check the graphics channel of the new domain.
//!
//! There is no rollback. If the installer fails after the disk image has
//! been allocated, the image stays at its deterministic path and the error
//! says so.

use crate::control::ControlPlane;
use crate::descriptor;
use crate::error::{LibvirtError, LibvirtErrorKind, LibvirtResult};
use crate::inventory::InventorySync;
use crate::tools::{ToolOutput, ToolRunner};
use crate::types::{
    GraphicsCheck, LibvirtConfig, ProvisionReport, VmCreateForm, VmCreationRequest,
};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Image format of allocated disks.
pub const DISK_FORMAT: &str = "qcow2";
/// Size of allocated disks.
pub const DISK_SIZE: &str = "10G";
/// Graphics channel requested from the installer.
pub const GRAPHICS_REQUEST: &str = "spice";
/// Network attachment requested from the installer.
pub const NETWORK: &str = "network=default";

pub struct Provisioner;

impl Provisioner {
    /// Deterministic disk location for a VM name.
    pub fn disk_path_for(image_dir: &Path, name: &str) -> PathBuf {
        image_dir.join(format!("{}.{}", name, DISK_FORMAT))
    }

    /// Check the form without side effects.
    pub async fn validate(
        config: &LibvirtConfig,
        form: &VmCreateForm,
    ) -> LibvirtResult<VmCreationRequest> {
        let name = form.name.trim();
        let ram = form.ram_mb.trim();
        let vcpus = form.vcpus.trim();
        let media = form.install_media_path.trim();

        if name.is_empty() || ram.is_empty() || vcpus.is_empty() || media.is_empty() {
            return Err(LibvirtError::validation(
                "Name, RAM, vCPUs and installation media are all required",
            ));
        }
        if name.starts_with('.') || name.contains('/') || name.contains('\\') {
            return Err(LibvirtError::validation(format!(
                "Invalid VM name '{}': it is used as a file name",
                name
            )));
        }
        // The disk path goes into the installer's comma-separated `--disk` value.
        if name.contains(',') {
            return Err(LibvirtError::validation(format!(
                "Invalid VM name '{}': commas are not allowed",
                name
            )));
        }
        let ram_mb = parse_positive(ram, "RAM (MB)")?;
        let vcpu_count = parse_positive(vcpus, "vCPUs")?;

        let media_is_file = tokio::fs::metadata(media)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !media_is_file {
            return Err(LibvirtError::validation(format!(
                "Installation media '{}' does not exist or is not a file",
                media
            )));
        }

        let disk_path = Self::disk_path_for(&config.image_dir, name);
        if tokio::fs::try_exists(&disk_path).await.unwrap_or(false) {
            return Err(LibvirtError::validation(format!(
                "Disk image {} already exists",
                disk_path.display()
            )));
        }

        Ok(VmCreationRequest {
            name: name.to_string(),
            ram_mb,
            vcpu_count,
            os_profile: form.os_profile,
            install_media_path: PathBuf::from(media),
            disk_path,
        })
    }

    pub fn disk_args(disk_path: &Path) -> Vec<String> {
        vec![
            "create".into(),
            "-f".into(),
            DISK_FORMAT.into(),
            disk_path.to_string_lossy().to_string(),
            DISK_SIZE.into(),
        ]
    }

    pub fn install_args(uri: &str, req: &VmCreationRequest) -> Vec<String> {
        vec![
            "--connect".into(),
            uri.to_string(),
            "--name".into(),
            req.name.clone(),
            "--ram".into(),
            req.ram_mb.to_string(),
            "--vcpus".into(),
            req.vcpu_count.to_string(),
            "--disk".into(),
            format!(
                "path={},format={}",
                req.disk_path.display().to_string().replace(',', ",,"),
                DISK_FORMAT
            ),
            "--cdrom".into(),
            req.install_media_path.to_string_lossy().to_string(),
            "--osinfo".into(),
            format!("detect=on,name={}", req.os_profile.osinfo_hint()),
            "--graphics".into(),
            GRAPHICS_REQUEST.into(),
            "--network".into(),
            NETWORK.into(),
            "--noautoconsole".into(),
        ]
    }

    /// Run the whole workflow.
    pub async fn create(
        cp: &dyn ControlPlane,
        tools: &dyn ToolRunner,
        config: &LibvirtConfig,
        form: &VmCreateForm,
    ) -> LibvirtResult<ProvisionReport> {
        let req = Self::validate(config, form).await?;

        info!("Allocating disk image {}", req.disk_path.display());
        let out = tools
            .run(&config.qemu_img_path, &Self::disk_args(&req.disk_path))
            .await?;
        check_step(&out, format!("Disk allocation for VM '{}' failed", req.name))?;

        info!("Installing VM '{}' ({})", req.name, req.os_profile.label());
        let out = tools
            .run(&config.virt_install_path, &Self::install_args(&config.uri, &req))
            .await?;
        check_step(
            &out,
            format!(
                "Installation of VM '{}' failed; disk image {} was left in place",
                req.name,
                req.disk_path.display()
            ),
        )?;

        let inventory = match InventorySync::refresh(cp).await {
            Ok(inv) => Some(inv),
            Err(e) => {
                warn!("Inventory refresh after creating '{}' failed: {}", req.name, e);
                None
            }
        };
        let graphics = Self::verify_graphics(cp, &req.name).await;
        if let Some(w) = graphics.warning() {
            warn!("{}", w);
        }

        Ok(ProvisionReport {
            name: req.name,
            disk_path: req.disk_path,
            graphics,
            inventory,
        })
    }

    /// Inspect the new domain's graphics channel. Never fails.
    pub async fn verify_graphics(cp: &dyn ControlPlane, name: &str) -> GraphicsCheck {
        let xml = match cp.descriptor(name).await {
            Ok(xml) => xml,
            Err(e) => {
                return GraphicsCheck::Unverified {
                    reason: format!("Could not read the descriptor of VM '{}': {}", name, e),
                }
            }
        };
        let graphics = descriptor::introspect(&xml).graphics;
        if graphics.is_remote_display() {
            GraphicsCheck::Supported { graphics }
        } else {
            GraphicsCheck::Unsupported {
                graphics,
                warning: format!(
                    "VM '{}' was created but has no SPICE or VNC display; the console may not work",
                    name
                ),
            }
        }
    }
}

fn parse_positive(value: &str, field: &str) -> LibvirtResult<u32> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LibvirtError::validation(format!(
            "{} must be a positive integer, got '{}'",
            field, value
        ))),
    }
}

fn check_step(out: &ToolOutput, message: String) -> LibvirtResult<()> {
    if out.success() {
        return Ok(());
    }
    let stderr = out.stderr.trim();
    let details = if stderr.is_empty() {
        format!("exit code {}", out.exit_code)
    } else {
        stderr.to_string()
    };
    Err(LibvirtError::with_details(
        LibvirtErrorKind::ProvisioningStepError,
        message,
        details,
    ))
}
