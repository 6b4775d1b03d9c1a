//! # kvmdeck – libvirt VM lifecycle management
//!
//! Local virtual machine management against a libvirt control plane
//! (`qemu:///system` by default) through `virsh` and the usual helper tools.
//! Provides services for:
//!
//! - **Inventory** – active and defined domains merged into one name → status
//!   map, per-VM detail (state, memory, vCPUs, CPU time, disks, graphics)
//! - **Live detail** – a cancellable poller for the selected VM
//! - **Lifecycle** – start, force stop, reboot, confirmed delete with disk
//!   image reclamation, console viewer launch
//! - **Provisioning** – `qemu-img` disk allocation, `virt-install` with OS
//!   detection hints, post-create graphics verification
//! - **Descriptors** – tolerant domain XML introspection

pub mod types;
pub mod error;
pub mod virsh;
pub mod control;
pub mod descriptor;
pub mod tools;
pub mod inventory;
pub mod console;
pub mod dispatch;
pub mod provision;
pub mod service;
pub mod poller;
#[cfg(feature = "tauri")]
pub mod commands;

#[cfg(test)]
pub(crate) mod testing;
