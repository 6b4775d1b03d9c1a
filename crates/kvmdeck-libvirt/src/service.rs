//! Aggregate service facade for the libvirt management crate.
//!
//! Owns the control-plane handle, the tool runner and the console launcher,
//! and delegates to the inventory, dispatch and provisioning managers.
//! Shared with the presentation layer via `VmServiceState`.

use crate::console::ConsoleLauncher;
use crate::control::{ControlPlane, VirshControlPlane};
use crate::dispatch::ActionDispatcher;
use crate::error::LibvirtResult;
use crate::inventory::InventorySync;
use crate::provision::Provisioner;
use crate::tools::{ProcessToolRunner, ToolRunner};
use crate::types::*;

use log::warn;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Alias for shared, serialized access to the service.
pub type VmServiceState = Arc<Mutex<VmService>>;

/// Central VM management service.
pub struct VmService {
    control: Box<dyn ControlPlane>,
    tools: Arc<dyn ToolRunner>,
    config: LibvirtConfig,
    console: ConsoleLauncher,
    events: UnboundedSender<VmEvent>,
    receiver: Option<UnboundedReceiver<VmEvent>>,
    inventory: Inventory,
}

impl VmService {
    /// Connect to the configured URI through `virsh`.
    ///
    /// Fails with `ConnectionError` when the control plane is unreachable.
    pub async fn connect(config: LibvirtConfig) -> LibvirtResult<Self> {
        let control = VirshControlPlane::connect(&config).await?;
        Ok(Self::with_parts(
            Box::new(control),
            Arc::new(ProcessToolRunner),
            config,
        ))
    }

    /// Assemble a service from explicit collaborators.
    pub fn with_parts(
        control: Box<dyn ControlPlane>,
        tools: Arc<dyn ToolRunner>,
        config: LibvirtConfig,
    ) -> Self {
        let (events, receiver) = unbounded_channel();
        Self {
            console: ConsoleLauncher::new(&config, events.clone()),
            control,
            tools,
            config,
            events,
            receiver: Some(receiver),
            inventory: Inventory::new(),
        }
    }

    /// Wrap into the shared state handle.
    pub fn into_state(self) -> VmServiceState {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &LibvirtConfig {
        &self.config
    }

    /// Receiver of console and detail events. Can be taken once.
    pub fn take_event_receiver(&mut self) -> Option<UnboundedReceiver<VmEvent>> {
        self.receiver.take()
    }

    pub fn event_sender(&self) -> UnboundedSender<VmEvent> {
        self.events.clone()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Inventory
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn refresh(&mut self) -> LibvirtResult<Inventory> {
        let inventory = InventorySync::refresh(self.control.as_ref()).await?;
        self.inventory = inventory.clone();
        Ok(inventory)
    }

    /// Inventory as of the last successful refresh.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub async fn detail(&self, name: &str) -> LibvirtResult<VirtualMachine> {
        InventorySync::fetch_detail(self.control.as_ref(), name).await
    }

    pub async fn detail_snapshot(&self, name: &str) -> DetailSnapshot {
        InventorySync::snapshot(self.control.as_ref(), name).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Actions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Dispatch an action and refresh the inventory, whatever the outcome.
    pub async fn dispatch(&mut self, name: &str, action: VmAction) -> ActionReport {
        let outcome =
            ActionDispatcher::dispatch(self.control.as_ref(), &self.console, name, action).await;
        ActionReport {
            vm: name.to_string(),
            action,
            outcome,
            inventory: self.refresh_after(action.verb()).await,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Provisioning
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn create_vm(&mut self, form: &VmCreateForm) -> LibvirtResult<ProvisionReport> {
        let report = Provisioner::create(
            self.control.as_ref(),
            self.tools.as_ref(),
            &self.config,
            form,
        )
        .await?;
        if let Some(ref inv) = report.inventory {
            self.inventory = inv.clone();
        }
        Ok(report)
    }

    pub fn os_profiles(&self) -> Vec<OsProfileInfo> {
        OsProfile::ALL.into_iter().map(OsProfileInfo::from).collect()
    }

    async fn refresh_after(&mut self, what: &str) -> Option<Inventory> {
        match self.refresh().await {
            Ok(inv) => Some(inv),
            Err(e) => {
                warn!("Inventory refresh after '{}' failed: {}", what, e);
                None
            }
        }
    }
}
