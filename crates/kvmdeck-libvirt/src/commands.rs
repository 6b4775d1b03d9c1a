//! Tauri command handlers for the libvirt management crate.
//!
//! Each command acquires the `VmServiceState` lock and delegates to the
//! service. Commands are prefixed with `kvm_`.

use crate::poller::DetailPoller;
use crate::service::VmServiceState;
use crate::types::*;
use log::debug;
use std::sync::Arc;
use tauri::{Emitter, State};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;

/// Event name used for every [`VmEvent`].
pub const EVENT_NAME: &str = "kvmdeck://event";

/// Managed state of the selected-VM poller.
pub type DetailPollerState = Arc<Mutex<DetailPoller>>;

/// Forward service events to the webview until the channel closes.
pub fn spawn_event_forwarder(app_handle: tauri::AppHandle, mut rx: UnboundedReceiver<VmEvent>) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = rx.recv().await {
            let _ = app_handle.emit(EVENT_NAME, &event);
        }
        debug!("VM event channel closed");
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tauri::command]
pub async fn kvm_refresh(state: State<'_, VmServiceState>) -> Result<Inventory, String> {
    let mut svc = state.lock().await;
    svc.refresh().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn kvm_get_vm(
    state: State<'_, VmServiceState>,
    name: String,
) -> Result<VirtualMachine, String> {
    let svc = state.lock().await;
    svc.detail(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn kvm_select_vm(
    poller: State<'_, DetailPollerState>,
    name: Option<String>,
) -> Result<(), String> {
    let mut poller = poller.lock().await;
    match name {
        Some(name) => poller.select(&name),
        None => poller.clear(),
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tauri::command]
pub async fn kvm_dispatch(
    state: State<'_, VmServiceState>,
    name: String,
    action: VmAction,
) -> Result<ActionReport, String> {
    let mut svc = state.lock().await;
    Ok(svc.dispatch(&name, action).await)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Provisioning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tauri::command]
pub async fn kvm_create_vm(
    state: State<'_, VmServiceState>,
    form: VmCreateForm,
) -> Result<ProvisionReport, String> {
    let mut svc = state.lock().await;
    svc.create_vm(&form).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn kvm_os_profiles(
    state: State<'_, VmServiceState>,
) -> Result<Vec<OsProfileInfo>, String> {
    let svc = state.lock().await;
    Ok(svc.os_profiles())
}

#[tauri::command]
pub async fn kvm_get_config(state: State<'_, VmServiceState>) -> Result<LibvirtConfig, String> {
    let svc = state.lock().await;
    Ok(svc.config().clone())
}
