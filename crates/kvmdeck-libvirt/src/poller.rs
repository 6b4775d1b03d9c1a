//! Live detail polling of the selected VM.
//!
//! One background task per selection. Each tick fetches a snapshot, sends it,
//! then sleeps for the interval, so a slow control plane never stacks up
//! overlapping queries. Selecting another VM (or clearing the selection)
//! aborts the previous task.

use crate::service::VmServiceState;
use crate::types::VmEvent;
use chrono::Utc;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub struct DetailPoller {
    state: VmServiceState,
    events: UnboundedSender<VmEvent>,
    interval: Duration,
    current: Option<(String, JoinHandle<()>)>,
}

impl DetailPoller {
    pub fn new(state: VmServiceState, events: UnboundedSender<VmEvent>, interval: Duration) -> Self {
        Self {
            state,
            events,
            interval,
            current: None,
        }
    }

    /// Start polling `name`, replacing any previous selection.
    pub fn select(&mut self, name: &str) {
        self.clear();

        let state = self.state.clone();
        let events = self.events.clone();
        let interval = self.interval;
        let vm = name.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let snapshot = {
                    let svc = state.lock().await;
                    svc.detail_snapshot(&vm).await
                };
                let sent = events.send(VmEvent::DetailUpdated {
                    vm: vm.clone(),
                    snapshot,
                    timestamp: Utc::now(),
                });
                if sent.is_err() {
                    debug!("Event receiver gone; detail polling of '{}' stops", vm);
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        debug!("Detail polling of '{}' started", name);
        self.current = Some((name.to_string(), handle));
    }

    /// Stop polling.
    pub fn clear(&mut self) {
        if let Some((name, handle)) = self.current.take() {
            handle.abort();
            debug!("Detail polling of '{}' stopped", name);
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.current.as_ref().map(|(name, _)| name.as_str())
    }
}

impl Drop for DetailPoller {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::VmService;
    use crate::testing::{FakeControlPlane, FakeDomain, FakeToolRunner};
    use crate::types::{DetailSnapshot, LibvirtConfig};
    use std::sync::Arc;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    const TICK: Duration = Duration::from_millis(20);

    fn setup(cp: &FakeControlPlane) -> (DetailPoller, UnboundedReceiver<VmEvent>) {
        let svc = VmService::with_parts(
            Box::new(cp.clone()),
            Arc::new(FakeToolRunner::new()),
            LibvirtConfig::default(),
        );
        let (tx, rx) = unbounded_channel();
        (DetailPoller::new(svc.into_state(), tx, TICK), rx)
    }

    async fn next(rx: &mut UnboundedReceiver<VmEvent>) -> (String, DetailSnapshot) {
        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match ev {
            VmEvent::DetailUpdated { vm, snapshot, .. } => (vm, snapshot),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn polls_repeatedly() {
        let cp = FakeControlPlane::new().with(FakeDomain::running("web"));
        let (mut poller, mut rx) = setup(&cp);
        poller.select("web");
        assert_eq!(poller.selected(), Some("web"));
        for _ in 0..3 {
            let (vm, snap) = next(&mut rx).await;
            assert_eq!(vm, "web");
            assert!(matches!(snap, DetailSnapshot::Live(_)));
        }
    }

    #[tokio::test]
    async fn degraded_poll_keeps_cycle_alive() {
        let cp = FakeControlPlane::new().with(FakeDomain::running("web"));
        let (mut poller, mut rx) = setup(&cp);
        poller.select("web");
        next(&mut rx).await;

        cp.remove("web");
        loop {
            if let (_, DetailSnapshot::Degraded { .. }) = next(&mut rx).await {
                break;
            }
        }

        cp.define(FakeDomain::running("web"));
        loop {
            if let (_, DetailSnapshot::Live(_)) = next(&mut rx).await {
                break;
            }
        }
    }

    #[tokio::test]
    async fn reselect_stops_previous_vm() {
        let cp = FakeControlPlane::new()
            .with(FakeDomain::running("web"))
            .with(FakeDomain::shutoff("db"));
        let (mut poller, mut rx) = setup(&cp);
        poller.select("web");
        next(&mut rx).await;
        poller.select("db");
        assert_eq!(poller.selected(), Some("db"));

        // Drain anything the aborted task sent before it stopped.
        tokio::time::sleep(TICK * 3).await;
        while rx.try_recv().is_ok() {}

        for _ in 0..3 {
            let (vm, _) = next(&mut rx).await;
            assert_eq!(vm, "db");
        }
    }

    #[tokio::test]
    async fn clear_stops_polling() {
        let cp = FakeControlPlane::new().with(FakeDomain::running("web"));
        let (mut poller, mut rx) = setup(&cp);
        poller.select("web");
        next(&mut rx).await;
        poller.clear();
        assert_eq!(poller.selected(), None);

        tokio::time::sleep(TICK * 2).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(TICK * 5).await;
        assert!(rx.try_recv().is_err());
    }
}
