//! Plain-text rendering of service results.

use kvmdeck_libvirt::types::*;

pub fn inventory(inv: &Inventory) -> String {
    if inv.is_empty() {
        return "No virtual machines defined.\n".to_string();
    }
    let width = inv.iter().map(|(name, _)| name.len()).max().unwrap_or(0).max(4);
    let mut out = format!("{:<width$}  STATUS\n", "NAME", width = width);
    for (name, status) in inv.iter() {
        out.push_str(&format!("{:<width$}  {}\n", name, status, width = width));
    }
    out
}

pub fn detail(vm: &VirtualMachine) -> String {
    let graphics = match vm.graphics_type {
        GraphicsKind::Spice => "spice",
        GraphicsKind::Vnc => "vnc",
        GraphicsKind::Other => "other",
        GraphicsKind::None => "none",
    };
    let mut out = String::new();
    out.push_str(&format!("Name:        {}\n", vm.name));
    out.push_str(&format!("State:       {}\n", vm.state.label()));
    out.push_str(&format!("RAM:         {} MB used / {} MB allocated\n", vm.ram_used_mb, vm.ram_allocated_mb));
    out.push_str(&format!("vCPUs:       {}\n", vm.vcpu_count));
    out.push_str(&format!("CPU time:    {} s\n", vm.cpu_time_seconds));
    out.push_str(&format!("Disk:        {}\n", vm.primary_disk()));
    for extra in vm.disk_paths.iter().skip(1) {
        out.push_str(&format!("             {}\n", extra));
    }
    out.push_str(&format!("Graphics:    {}\n", graphics));
    out
}

pub fn snapshot(snap: &DetailSnapshot) -> String {
    match snap {
        DetailSnapshot::Live(vm) => detail(vm),
        DetailSnapshot::Degraded { message } => format!("Details unavailable: {}\n", message),
    }
}

pub fn outcome(vm: &str, outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Started => format!("VM '{}' started.", vm),
        ActionOutcome::AlreadyRunning => format!("VM '{}' is already running.", vm),
        ActionOutcome::Stopped => format!("VM '{}' stopped.", vm),
        ActionOutcome::AlreadyStopped => format!("VM '{}' is already stopped.", vm),
        ActionOutcome::Rebooted => format!("VM '{}' is rebooting.", vm),
        ActionOutcome::ConsoleLaunching => format!("Opening the console of VM '{}'...", vm),
        ActionOutcome::Deleted(summary) => {
            let mut out = format!("VM '{}' deleted.", vm);
            for p in &summary.removed {
                out.push_str(&format!("\n  removed {}", p));
            }
            for p in &summary.already_missing {
                out.push_str(&format!("\n  already gone {}", p));
            }
            for f in &summary.failed {
                out.push_str(&format!("\n  could not remove {}: {}", f.path, f.error));
            }
            out
        }
    }
}

pub fn provision(report: &ProvisionReport) -> String {
    format!(
        "VM '{}' created with disk image {}.",
        report.name,
        report.disk_path.display()
    )
}

pub fn os_profiles(profiles: &[OsProfileInfo]) -> String {
    let mut out = format!("{:<15}{:<28}{}\n", "KEY", "LABEL", "OSINFO");
    for p in profiles {
        out.push_str(&format!("{:<15}{:<28}{}\n", p.key, p.label, p.osinfo_hint));
    }
    out
}
