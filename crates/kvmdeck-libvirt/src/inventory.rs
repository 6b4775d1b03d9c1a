//! Inventory synchronisation and per-VM detail.

use crate::control::ControlPlane;
use crate::descriptor;
use crate::error::LibvirtResult;
use crate::types::{DetailSnapshot, Inventory, VirtualMachine, VmStatus};
use log::{debug, warn};

/// Builds the inventory and detail records from the control plane.
pub struct InventorySync;

impl InventorySync {
    /// Name → coarse status. Active domains override defined ones.
    pub async fn refresh(cp: &dyn ControlPlane) -> LibvirtResult<Inventory> {
        let active = cp.list_active().await?;
        let defined = cp.list_defined().await?;

        let mut inventory = Inventory::new();
        for name in defined {
            inventory.insert(name, VmStatus::Shutoff);
        }
        for name in active {
            inventory.insert(name, VmStatus::Running);
        }
        debug!("Inventory refreshed: {} VMs", inventory.len());
        Ok(inventory)
    }

    /// Full detail record from live info plus the descriptor.
    pub async fn fetch_detail(cp: &dyn ControlPlane, name: &str) -> LibvirtResult<VirtualMachine> {
        let info = cp.domain_info(name).await?;
        let xml = cp.descriptor(name).await?;
        let desc = descriptor::introspect(&xml);

        Ok(VirtualMachine {
            name: name.to_string(),
            state: info.state,
            ram_allocated_mb: info.max_memory_kib / 1024,
            ram_used_mb: info.used_memory_kib / 1024,
            vcpu_count: info.vcpus,
            cpu_time_seconds: info.cpu_time_ns / 1_000_000_000,
            disk_paths: desc.disk_paths(),
            graphics_type: desc.graphics,
        })
    }

    /// Detail fetch for the poller: failures become a degraded snapshot.
    pub async fn snapshot(cp: &dyn ControlPlane, name: &str) -> DetailSnapshot {
        match Self::fetch_detail(cp, name).await {
            Ok(vm) => DetailSnapshot::Live(vm),
            Err(e) => {
                warn!("Detail poll for '{}' failed: {}", name, e);
                DetailSnapshot::Degraded {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeControlPlane, FakeDomain};
    use crate::types::{GraphicsKind, VmState};

    #[tokio::test]
    async fn refresh_merges_active_and_defined() {
        let cp = FakeControlPlane::new()
            .with(FakeDomain::running("web"))
            .with(FakeDomain::shutoff("db"));
        let inv = InventorySync::refresh(&cp).await.unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.get("web"), Some(VmStatus::Running));
        assert_eq!(inv.get("db"), Some(VmStatus::Shutoff));
    }

    #[tokio::test]
    async fn active_takes_precedence_over_defined() {
        let cp = FakeControlPlane::new().with(FakeDomain::running("web"));
        cp.also_report_defined("web");
        let inv = InventorySync::refresh(&cp).await.unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.get("web"), Some(VmStatus::Running));
    }

    #[tokio::test]
    async fn detail_converts_units() {
        let cp = FakeControlPlane::new().with(
            FakeDomain::running("web").with_disk("/images/web.qcow2"),
        );
        let vm = InventorySync::fetch_detail(&cp, "web").await.unwrap();
        assert_eq!(vm.state, VmState::Running);
        assert_eq!(vm.ram_allocated_mb, 2048);
        assert_eq!(vm.ram_used_mb, 1024);
        assert_eq!(vm.vcpu_count, 2);
        assert_eq!(vm.cpu_time_seconds, 42);
        assert_eq!(vm.primary_disk(), "/images/web.qcow2");
        assert_eq!(vm.graphics_type, GraphicsKind::Spice);
    }

    #[tokio::test]
    async fn snapshot_of_missing_vm_is_degraded() {
        let cp = FakeControlPlane::new();
        let snap = InventorySync::snapshot(&cp, "ghost").await;
        assert!(matches!(snap, DetailSnapshot::Degraded { .. }));
    }
}
