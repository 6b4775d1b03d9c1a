//! Control-plane seam.
//!
//! [`ControlPlane`] lists the hypervisor operations the manager relies on.
//! [`VirshControlPlane`] implements them against libvirt through `virsh`.

use crate::error::{LibvirtError, LibvirtResult};
use crate::types::{DomainInfo, LibvirtConfig, VmState};
use crate::virsh::VirshExecutor;
use log::info;
use regex::Regex;
use std::sync::OnceLock;

/// Operations of the hypervisor control plane.
///
/// Every per-VM call returns a `VmNotFound` error for unknown names.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Names of running (active) domains.
    async fn list_active(&self) -> LibvirtResult<Vec<String>>;

    /// Names of defined but inactive domains.
    async fn list_defined(&self) -> LibvirtResult<Vec<String>>;

    /// Liveness of a domain; doubles as the lookup-by-name.
    async fn is_active(&self, name: &str) -> LibvirtResult<bool>;

    async fn domain_info(&self, name: &str) -> LibvirtResult<DomainInfo>;

    /// Domain descriptor (XML) as text.
    async fn descriptor(&self, name: &str) -> LibvirtResult<String>;

    async fn start(&self, name: &str) -> LibvirtResult<()>;

    /// Hard power-off.
    async fn force_stop(&self, name: &str) -> LibvirtResult<()>;

    async fn reboot(&self, name: &str) -> LibvirtResult<()>;

    /// Remove the definition. The domain must be inactive.
    async fn undefine(&self, name: &str) -> LibvirtResult<()>;
}

// ─── virsh implementation ────────────────────────────────────────────

/// libvirt control plane driven through `virsh`.
pub struct VirshControlPlane {
    virsh: VirshExecutor,
}

impl VirshControlPlane {
    /// Open the connection, verifying that the URI is reachable.
    pub async fn connect(config: &LibvirtConfig) -> LibvirtResult<Self> {
        let virsh = VirshExecutor::new(config);
        let output = virsh.run(&["uri"]).await?;
        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                format!("virsh exited with code {}", output.exit_code)
            } else {
                output.stderr.trim().to_string()
            };
            return Err(LibvirtError::connection(detail));
        }
        info!("Connected to libvirt at {}", output.stdout.trim());
        Ok(Self { virsh })
    }
}

#[async_trait::async_trait]
impl ControlPlane for VirshControlPlane {
    async fn list_active(&self) -> LibvirtResult<Vec<String>> {
        self.virsh.run_lines(&["list", "--name"]).await
    }

    async fn list_defined(&self) -> LibvirtResult<Vec<String>> {
        self.virsh.run_lines(&["list", "--inactive", "--name"]).await
    }

    async fn is_active(&self, name: &str) -> LibvirtResult<bool> {
        let out = self.virsh.run_ok(&["domid", name]).await?;
        Ok(parse_domid(&out.stdout))
    }

    async fn domain_info(&self, name: &str) -> LibvirtResult<DomainInfo> {
        let out = self.virsh.run_ok(&["dominfo", name]).await?;
        parse_dominfo(&out.stdout)
    }

    async fn descriptor(&self, name: &str) -> LibvirtResult<String> {
        Ok(self.virsh.run_ok(&["dumpxml", name]).await?.stdout)
    }

    async fn start(&self, name: &str) -> LibvirtResult<()> {
        self.virsh.run_void(&["start", name]).await
    }

    async fn force_stop(&self, name: &str) -> LibvirtResult<()> {
        self.virsh.run_void(&["destroy", name]).await
    }

    async fn reboot(&self, name: &str) -> LibvirtResult<()> {
        self.virsh.run_void(&["reboot", name]).await
    }

    async fn undefine(&self, name: &str) -> LibvirtResult<()> {
        self.virsh.run_void(&["undefine", name]).await
    }
}

// ─── Output parsing ──────────────────────────────────────────────────

/// `virsh domid` prints a numeric id for active domains and `-` otherwise.
pub fn parse_domid(stdout: &str) -> bool {
    stdout.trim().parse::<u32>().is_ok()
}

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([^:]+?)\s*:\s*(.*?)\s*$").expect("valid regex"))
}

fn kib_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*KiB$").expect("valid regex"))
}

fn cpu_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\.(\d+))?s$").expect("valid regex"))
}

/// Parse the key/value listing printed by `virsh dominfo`.
pub fn parse_dominfo(stdout: &str) -> LibvirtResult<DomainInfo> {
    let mut info = DomainInfo::default();
    let mut saw_state = false;

    for line in stdout.lines() {
        let Some(caps) = field_regex().captures(line) else {
            continue;
        };
        let value = &caps[2];
        match &caps[1] {
            "State" => {
                info.state = VmState::from_virsh(value);
                saw_state = true;
            }
            "CPU(s)" => {
                info.vcpus = value
                    .parse()
                    .map_err(|_| LibvirtError::parse(format!("Bad CPU(s) value '{}'", value)))?;
            }
            "CPU time" => info.cpu_time_ns = parse_cpu_time_ns(value)?,
            "Max memory" => info.max_memory_kib = parse_kib(value)?,
            "Used memory" => info.used_memory_kib = parse_kib(value)?,
            _ => {}
        }
    }

    if !saw_state {
        return Err(LibvirtError::parse("dominfo output has no State field"));
    }
    Ok(info)
}

fn parse_kib(value: &str) -> LibvirtResult<u64> {
    kib_regex()
        .captures(value)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| LibvirtError::parse(format!("Bad memory value '{}'", value)))
}

/// `12.5s` → 12 500 000 000 ns.
fn parse_cpu_time_ns(value: &str) -> LibvirtResult<u64> {
    let caps = cpu_time_regex()
        .captures(value)
        .ok_or_else(|| LibvirtError::parse(format!("Bad CPU time value '{}'", value)))?;
    let secs: u64 = caps[1]
        .parse()
        .map_err(|_| LibvirtError::parse(format!("Bad CPU time value '{}'", value)))?;
    let frac_ns = match caps.get(2) {
        Some(m) => {
            let digits: String = m.as_str().chars().take(9).collect();
            let scale = 10u64.pow(9 - digits.len() as u32);
            digits.parse::<u64>().unwrap_or(0) * scale
        }
        None => 0,
    };
    Ok(secs * 1_000_000_000 + frac_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING: &str = "\
Id:             3
Name:           vm1
UUID:           0b8d2c0e-5c1f-4a43-9d3e-3a0f9b7d6d55
OS Type:        hvm
State:          running
CPU(s):         2
CPU time:       12.5s
Max memory:     2097152 KiB
Used memory:    1048576 KiB
Persistent:     yes
Autostart:      disable
Managed save:   no
Security model: apparmor
Security DOI:   0
";

    const SHUTOFF: &str = "\
Id:             -
Name:           vm2
State:          shut off
CPU(s):         1
Max memory:     1048576 KiB
Used memory:    1048576 KiB
";

    #[test]
    fn dominfo_running() {
        let info = parse_dominfo(RUNNING).unwrap();
        assert_eq!(info.state, VmState::Running);
        assert_eq!(info.vcpus, 2);
        assert_eq!(info.cpu_time_ns, 12_500_000_000);
        assert_eq!(info.max_memory_kib, 2_097_152);
        assert_eq!(info.used_memory_kib, 1_048_576);
    }

    #[test]
    fn dominfo_shutoff_has_no_cpu_time() {
        let info = parse_dominfo(SHUTOFF).unwrap();
        assert_eq!(info.state, VmState::Shutoff);
        assert_eq!(info.cpu_time_ns, 0);
    }

    #[test]
    fn dominfo_without_state_is_parse_error() {
        let err = parse_dominfo("Name: vm\n").unwrap_err();
        assert_eq!(err.kind, crate::error::LibvirtErrorKind::ParseError);
    }

    #[test]
    fn cpu_time_without_fraction() {
        assert_eq!(parse_cpu_time_ns("7s").unwrap(), 7_000_000_000);
        assert!(parse_cpu_time_ns("seven").is_err());
    }

    #[test]
    fn domid_active_vs_inactive() {
        assert!(parse_domid("3\n"));
        assert!(!parse_domid("-\n"));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use crate::error::LibvirtErrorKind;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};
        use tempfile::TempDir;

        /// Install a shell script as `virsh`. `$1 $2` are `--connect <uri>`.
        fn scripted_virsh(body: &str) -> (TempDir, LibvirtConfig) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("virsh");
            {
                let mut f = std::fs::File::create(&path).unwrap();
                writeln!(f, "#!/bin/sh\nshift 2\n{}", body).unwrap();
                f.sync_all().unwrap();
            }
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            let cfg = LibvirtConfig {
                virsh_path: path.to_string_lossy().to_string(),
                ..LibvirtConfig::default()
            };
            (dir, cfg)
        }

        // Prints translated labels unless the C locale is forced.
        const HOST: &str = r#"
case "$1" in
  uri) echo qemu:///system ;;
  list)
    if [ "$2" = "--inactive" ]; then echo db; else echo web; fi ;;
  domid)
    case "$2" in
      web) echo 3 ;;
      db) echo - ;;
      *) echo "error: failed to get domain '$2'" >&2; exit 1 ;;
    esac ;;
  dominfo)
    if [ "$LC_ALL" != "C" ]; then
      printf 'Estado:         ejecutando\nCPU(s):         2\n'
      exit 0
    fi
    printf 'State:          running\nCPU(s):         2\nCPU time:       1.5s\nMax memory:     2097152 KiB\nUsed memory:    1048576 KiB\n' ;;
  *) echo "error: unexpected command $1" >&2; exit 1 ;;
esac"#;

        #[tokio::test]
        async fn lists_route_to_active_and_inactive() {
            let (_dir, cfg) = scripted_virsh(HOST);
            let cp = VirshControlPlane::connect(&cfg).await.unwrap();
            assert_eq!(cp.list_active().await.unwrap(), vec!["web".to_string()]);
            assert_eq!(cp.list_defined().await.unwrap(), vec!["db".to_string()]);
        }

        #[tokio::test]
        async fn liveness_from_domid() {
            let (_dir, cfg) = scripted_virsh(HOST);
            let cp = VirshControlPlane::connect(&cfg).await.unwrap();
            assert!(cp.is_active("web").await.unwrap());
            assert!(!cp.is_active("db").await.unwrap());
            let err = cp.is_active("ghost").await.unwrap_err();
            assert_eq!(err.kind, LibvirtErrorKind::VmNotFound);
        }

        #[tokio::test]
        async fn dominfo_is_read_in_the_c_locale() {
            let (_dir, cfg) = scripted_virsh(HOST);
            let cp = VirshControlPlane::connect(&cfg).await.unwrap();
            let info = cp.domain_info("web").await.unwrap();
            assert_eq!(info.state, VmState::Running);
            assert_eq!(info.cpu_time_ns, 1_500_000_000);
        }

        #[tokio::test]
        async fn failed_uri_check_is_connection_error() {
            let (_dir, cfg) = scripted_virsh(
                "echo 'error: failed to connect to the hypervisor' >&2\nexit 1",
            );
            let err = VirshControlPlane::connect(&cfg).await.err().unwrap();
            assert_eq!(err.kind, LibvirtErrorKind::ConnectionError);
            assert!(err.details.unwrap().contains("failed to connect"));
        }

        #[tokio::test]
        async fn slow_call_times_out() {
            let (_dir, mut cfg) = scripted_virsh("sleep 10");
            cfg.command_timeout_seconds = Some(1);
            let started = Instant::now();
            let err = VirshExecutor::new(&cfg).run(&["list"]).await.unwrap_err();
            assert_eq!(err.kind, LibvirtErrorKind::Timeout);
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
