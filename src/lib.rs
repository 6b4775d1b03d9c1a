//! kvmdeck command-line front end.
//!
//! Parses arguments, loads configuration, connects to libvirt and renders
//! the results of the `kvmdeck-libvirt` service.

pub mod cli;
pub mod config;
pub mod logging;
pub mod render;

use cli::{Cli, Command};
use kvmdeck_libvirt::error::LibvirtResult;
use kvmdeck_libvirt::poller::DetailPoller;
use kvmdeck_libvirt::service::VmService;
use kvmdeck_libvirt::types::*;
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;

/// Exit status when the control plane cannot be reached at startup.
pub const EXIT_CONNECTION: u8 = 1;
/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 2;

/// How long `console` waits for the viewer to report back.
const CONSOLE_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(cli: Cli) -> ExitCode {
    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => cli.apply_overrides(c),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    if !cli.command.needs_connection() {
        let profiles: Vec<OsProfileInfo> =
            OsProfile::ALL.into_iter().map(OsProfileInfo::from).collect();
        print_result(cli.json, &profiles, render::os_profiles(&profiles));
        return ExitCode::SUCCESS;
    }

    tracing::debug!(uri = %config.uri, "connecting");
    let svc = match VmService::connect(config).await {
        Ok(svc) => svc,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONNECTION);
        }
    };

    match execute(&cli, svc).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn execute(cli: &Cli, mut svc: VmService) -> LibvirtResult<()> {
    match &cli.command {
        Command::List => {
            let inv = svc.refresh().await?;
            print_result(cli.json, &inv, render::inventory(&inv));
        }
        Command::Info { name, watch: false } => {
            let vm = svc.detail(name).await?;
            print_result(cli.json, &vm, render::detail(&vm));
        }
        Command::Info { name, watch: true } => watch(cli.json, svc, name).await?,
        Command::Create(args) => {
            let report = svc.create_vm(&args.clone().into()).await?;
            if let Some(w) = report.graphics.warning() {
                eprintln!("warning: {}", w);
            }
            print_result(cli.json, &report, render::provision(&report));
        }
        other => {
            if let Some((name, action)) = other.action() {
                let stdin = std::io::BufReader::new(std::io::stdin());
                run_action(cli.json, &mut svc, name, action, stdin).await?;
            }
        }
    }
    Ok(())
}

async fn run_action(
    json: bool,
    svc: &mut VmService,
    name: &str,
    action: VmAction,
    input: impl std::io::BufRead + Send + 'static,
) -> LibvirtResult<()> {
    let action = match action {
        VmAction::Delete { confirmed: false } => {
            if !confirm_delete(name, input).await {
                println!("Delete of VM '{}' cancelled.", name);
                return Ok(());
            }
            VmAction::Delete { confirmed: true }
        }
        a => a,
    };

    let mut events = svc.take_event_receiver();
    let report = svc.dispatch(name, action).await;
    if json {
        print_json(&report);
    }
    let outcome = report.outcome?;
    if !json {
        println!("{}", render::outcome(name, &outcome));
    }

    if outcome == ActionOutcome::ConsoleLaunching {
        if let Some(rx) = events.as_mut() {
            wait_for_console(rx).await?;
        }
    }
    Ok(())
}

async fn wait_for_console(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<VmEvent>,
) -> LibvirtResult<()> {
    let report = tokio::time::timeout(CONSOLE_REPORT_TIMEOUT, async {
        while let Some(ev) = rx.recv().await {
            match ev {
                VmEvent::ConsoleFailed { error, .. } => return Err(error),
                VmEvent::ConsoleLaunched { pid, .. } => {
                    tracing::info!(?pid, "console viewer started");
                    return Ok(());
                }
                VmEvent::DetailUpdated { .. } => {}
            }
        }
        Ok(())
    })
    .await;
    match report {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("console viewer did not report back");
            Ok(())
        }
    }
}

async fn confirm_delete(name: &str, input: impl std::io::BufRead + Send + 'static) -> bool {
    let prompt = format!("Delete VM '{}' and its disk images? [y/N] ", name);
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        eprint!("{}", prompt);
        let _ = std::io::stderr().flush();
        read_confirmation(input)
    })
    .await
    .unwrap_or(false)
}

/// Only an explicit yes confirms; EOF or a read error declines.
fn read_confirmation(mut input: impl std::io::BufRead) -> bool {
    let mut answer = String::new();
    input.read_line(&mut answer).is_ok()
        && matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Poll the VM until interrupted.
async fn watch(json: bool, mut svc: VmService, name: &str) -> LibvirtResult<()> {
    svc.detail(name).await?;
    let Some(mut rx) = svc.take_event_receiver() else {
        return Ok(());
    };
    let interval = Duration::from_millis(svc.config().poll_interval_ms);
    let sender = svc.event_sender();
    let mut poller = DetailPoller::new(svc.into_state(), sender, interval);
    poller.select(name);

    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Some(VmEvent::DetailUpdated { snapshot, timestamp, .. }) => {
                    if json {
                        print_json(&snapshot);
                    } else {
                        let local = timestamp.with_timezone(&chrono::Local);
                        println!("--- {}", local.format("%H:%M:%S"));
                        print!("{}", render::snapshot(&snapshot));
                    }
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.clear();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("error: could not encode result: {}", e),
    }
}

fn print_result<T: Serialize>(json: bool, value: &T, text: String) {
    if json {
        print_json(value);
    } else {
        print!("{}", text);
        if !text.ends_with('\n') {
            println!();
        }
    }
}
