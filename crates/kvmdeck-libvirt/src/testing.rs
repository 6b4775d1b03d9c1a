//! In-memory control plane and recording tool runner for tests.

use crate::control::ControlPlane;
use crate::error::{LibvirtError, LibvirtResult};
use crate::tools::{ToolOutput, ToolRunner};
use crate::types::{DomainInfo, VmState};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeDomain {
    pub name: String,
    pub active: bool,
    pub disks: Vec<String>,
    pub cdroms: Vec<String>,
    /// `None` omits the `<graphics>` element.
    pub graphics: Option<String>,
}

impl FakeDomain {
    pub fn running(name: &str) -> Self {
        Self {
            name: name.into(),
            active: true,
            disks: Vec::new(),
            cdroms: Vec::new(),
            graphics: Some("spice".into()),
        }
    }

    pub fn shutoff(name: &str) -> Self {
        Self {
            active: false,
            ..Self::running(name)
        }
    }

    pub fn with_disk(mut self, path: &str) -> Self {
        self.disks.push(path.into());
        self
    }

    pub fn with_cdrom(mut self, path: &str) -> Self {
        self.cdroms.push(path.into());
        self
    }

    pub fn with_graphics(mut self, graphics: Option<&str>) -> Self {
        self.graphics = graphics.map(str::to_string);
        self
    }

    fn xml(&self) -> String {
        let mut devices = String::new();
        for d in &self.disks {
            devices.push_str(&format!(
                "<disk type='file' device='disk'><source file='{}'/></disk>",
                d
            ));
        }
        for c in &self.cdroms {
            devices.push_str(&format!(
                "<disk type='file' device='cdrom'><source file='{}'/></disk>",
                c
            ));
        }
        if let Some(ref g) = self.graphics {
            devices.push_str(&format!("<graphics type='{}'/>", g));
        }
        format!(
            "<domain type='kvm'><name>{}</name><devices>{}</devices></domain>",
            self.name, devices
        )
    }

    fn info(&self) -> DomainInfo {
        DomainInfo {
            state: if self.active {
                VmState::Running
            } else {
                VmState::Shutoff
            },
            max_memory_kib: 2 * 1024 * 1024,
            used_memory_kib: 1024 * 1024,
            vcpus: 2,
            cpu_time_ns: if self.active { 42_700_000_000 } else { 0 },
        }
    }
}

#[derive(Default)]
struct FakeState {
    domains: BTreeMap<String, FakeDomain>,
    extra_defined: Vec<String>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// Shared-state fake; clones observe the same domains.
#[derive(Clone, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
}

const MUTATIONS: [&str; 4] = ["start", "force_stop", "reboot", "undefine"];

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, domain: FakeDomain) -> Self {
        self.define(domain);
        self
    }

    pub fn define(&self, domain: FakeDomain) {
        let mut s = self.state.lock().unwrap();
        s.domains.insert(domain.name.clone(), domain);
    }

    /// Make `list_defined` also report a name (even an active one).
    pub fn also_report_defined(&self, name: &str) {
        self.state.lock().unwrap().extra_defined.push(name.into());
    }

    /// Make every call of `op` fail.
    pub fn fail_on(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.into());
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().unwrap().domains.remove(name);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.state.lock().unwrap().domains.contains_key(name)
    }

    pub fn active(&self, name: &str) -> Option<bool> {
        self.state.lock().unwrap().domains.get(name).map(|d| d.active)
    }

    /// Every call, formatted as `op:name`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Only the calls that change existence or power state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATIONS.iter().any(|m| c.starts_with(&format!("{}:", m))))
            .collect()
    }

    fn record(&self, op: &str, name: &str) -> LibvirtResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("{}:{}", op, name));
        if s.failing.contains(op) {
            return Err(LibvirtError::control_plane(format!(
                "internal error: injected failure in {}",
                op
            )));
        }
        Ok(())
    }

    fn with_domain<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FakeDomain) -> LibvirtResult<T>,
    ) -> LibvirtResult<T> {
        let mut s = self.state.lock().unwrap();
        match s.domains.get_mut(name) {
            Some(d) => f(d),
            None => Err(LibvirtError::vm_not_found(name)),
        }
    }
}

#[async_trait::async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_active(&self) -> LibvirtResult<Vec<String>> {
        self.record("list_active", "*")?;
        let s = self.state.lock().unwrap();
        Ok(s.domains.values().filter(|d| d.active).map(|d| d.name.clone()).collect())
    }

    async fn list_defined(&self) -> LibvirtResult<Vec<String>> {
        self.record("list_defined", "*")?;
        let s = self.state.lock().unwrap();
        let mut names: Vec<String> =
            s.domains.values().filter(|d| !d.active).map(|d| d.name.clone()).collect();
        names.extend(s.extra_defined.iter().cloned());
        Ok(names)
    }

    async fn is_active(&self, name: &str) -> LibvirtResult<bool> {
        self.record("is_active", name)?;
        self.with_domain(name, |d| Ok(d.active))
    }

    async fn domain_info(&self, name: &str) -> LibvirtResult<DomainInfo> {
        self.record("domain_info", name)?;
        self.with_domain(name, |d| Ok(d.info()))
    }

    async fn descriptor(&self, name: &str) -> LibvirtResult<String> {
        self.record("descriptor", name)?;
        self.with_domain(name, |d| Ok(d.xml()))
    }

    async fn start(&self, name: &str) -> LibvirtResult<()> {
        self.record("start", name)?;
        self.with_domain(name, |d| {
            if d.active {
                return Err(LibvirtError::control_plane("Domain is already active"));
            }
            d.active = true;
            Ok(())
        })
    }

    async fn force_stop(&self, name: &str) -> LibvirtResult<()> {
        self.record("force_stop", name)?;
        self.with_domain(name, |d| {
            if !d.active {
                return Err(LibvirtError::control_plane("domain is not running"));
            }
            d.active = false;
            Ok(())
        })
    }

    async fn reboot(&self, name: &str) -> LibvirtResult<()> {
        self.record("reboot", name)?;
        self.with_domain(name, |d| {
            if !d.active {
                return Err(LibvirtError::control_plane("domain is not running"));
            }
            Ok(())
        })
    }

    async fn undefine(&self, name: &str) -> LibvirtResult<()> {
        self.record("undefine", name)?;
        let mut s = self.state.lock().unwrap();
        let active = s.domains.get(name).map(|d| d.active);
        match active {
            None => Err(LibvirtError::vm_not_found(name)),
            Some(true) => Err(LibvirtError::control_plane(
                "Requested operation is not valid: domain is still running",
            )),
            Some(false) => {
                s.domains.remove(name);
                Ok(())
            }
        }
    }
}

// ─── Tool runner ─────────────────────────────────────────────────────

#[derive(Default)]
struct ToolState {
    invocations: Vec<(String, Vec<String>)>,
    failing: HashSet<String>,
    missing: HashSet<String>,
}

/// Records invocations; `qemu-img create` writes the image file and a
/// successful installer defines the domain on the attached fake.
#[derive(Clone, Default)]
pub struct FakeToolRunner {
    state: Arc<Mutex<ToolState>>,
    control: Option<FakeControlPlane>,
    graphics: Option<String>,
}

impl FakeToolRunner {
    pub fn new() -> Self {
        Self {
            graphics: Some("spice".into()),
            ..Self::default()
        }
    }

    /// Define the installed VM on `cp` with the given graphics type.
    pub fn installing_into(mut self, cp: &FakeControlPlane, graphics: Option<&str>) -> Self {
        self.control = Some(cp.clone());
        self.graphics = graphics.map(str::to_string);
        self
    }

    pub fn fail(&self, program: &str) {
        self.state.lock().unwrap().failing.insert(program.into());
    }

    pub fn missing(&self, program: &str) {
        self.state.lock().unwrap().missing.insert(program.into());
    }

    pub fn invocations(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|(p, _)| p).collect()
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[async_trait::async_trait]
impl ToolRunner for FakeToolRunner {
    async fn run(&self, program: &str, args: &[String]) -> LibvirtResult<ToolOutput> {
        {
            let mut s = self.state.lock().unwrap();
            s.invocations.push((program.to_string(), args.to_vec()));
            if s.missing.contains(program) {
                return Err(LibvirtError::tool_missing(program));
            }
            if s.failing.contains(program) {
                return Ok(ToolOutput {
                    stdout: String::new(),
                    stderr: format!("{}: simulated failure", program),
                    exit_code: 1,
                });
            }
        }

        if program.ends_with("qemu-img") {
            if let Some(path) = args.iter().rev().nth(1) {
                std::fs::write(path, b"QFI\xfb").map_err(|e| LibvirtError::io("write image", &e))?;
            }
        } else if program.ends_with("virt-install") {
            if let (Some(cp), Some(name)) = (&self.control, arg_after(args, "--name")) {
                let mut domain = FakeDomain::shutoff(name).with_graphics(self.graphics.as_deref());
                if let Some(disk) = arg_after(args, "--disk") {
                    let path = disk
                        .trim_start_matches("path=")
                        .split(',')
                        .next()
                        .unwrap_or_default();
                    domain = domain.with_disk(path);
                }
                if let Some(media) = arg_after(args, "--cdrom") {
                    domain = domain.with_cdrom(media);
                }
                cp.define(domain);
            }
        }

        Ok(ToolOutput::default())
    }
}
