//! Linux HAL implementation using real system calls and Ubuntu tooling.

use super::{
    parse_added_rules, parse_ufw_status, FileOps, FirewallOps, FirewallRule, FirewallStatus,
    HostInfoOps, Invocation, NetOps, OsReleaseInfo, PackageOps, Policy, Privilege, ProcessOps,
    ServiceAction, ServiceOps, SysctlOps, UserOps, UserSpec,
};
use crate::hal::package_ops::{install_invocation, status_is_installed, update_invocation};
use crate::{HalError, HalResult};
use nix::unistd::{Gid, Group, Uid, User};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Ubuntu hosts.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PROC_SYS: &str = "/proc/sys";
const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

fn map_spawn_err(program: &str, err: std::io::Error) -> HalError {
    match err.kind() {
        std::io::ErrorKind::NotFound => HalError::CommandNotFound(program.to_string()),
        std::io::ErrorKind::PermissionDenied => HalError::PermissionDenied(program.to_string()),
        _ => HalError::Io(err),
    }
}

fn map_io_err(path: &Path, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        return HalError::PermissionDenied(path.display().to_string());
    }
    HalError::Io(err)
}

fn map_nix_err(path: &Path, err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied(path.display().to_string()),
        other => HalError::Nix(other),
    }
}

fn exit_failed(program: &str, status: ExitStatus, stderr: &[u8]) -> HalError {
    match status.code() {
        Some(127) => HalError::CommandNotFound(program.to_string()),
        Some(126) => HalError::PermissionDenied(program.to_string()),
        code => HalError::CommandFailed {
            program: program.to_string(),
            code,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        },
    }
}

fn current_user() -> Option<String> {
    User::from_uid(Uid::effective())
        .ok()
        .flatten()
        .map(|u| u.name)
}

/// Build the std `Command` for an invocation, switching identity through `runuser`.
fn build_command(inv: &Invocation) -> Command {
    let switch_to = match &inv.privilege {
        Privilege::User(user) if current_user().as_deref() != Some(user.as_str()) => Some(user),
        _ => None,
    };

    let mut cmd = match switch_to {
        Some(user) => {
            let mut cmd = Command::new("runuser");
            cmd.args(["-u", user, "--", "env"]);
            for (k, v) in &inv.env {
                cmd.arg(format!("{k}={v}"));
            }
            cmd.arg(&inv.program);
            cmd
        }
        None => {
            let mut cmd = Command::new(&inv.program);
            cmd.envs(inv.env.iter().map(|(k, v)| (k, v)));
            cmd
        }
    };
    cmd.args(&inv.args);
    if let Some(cwd) = &inv.cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

fn wait_child(
    program: &str,
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> HalResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };
    match child.wait_timeout(timeout)? {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

fn run_captured(inv: &Invocation) -> HalResult<Output> {
    let mut cmd = build_command(inv);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!("exec: {}", inv.display());
    let mut child = cmd.spawn().map_err(|e| map_spawn_err(&inv.program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = wait_child(&inv.program, &mut child, inv.timeout);
    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status: status?,
        stdout,
        stderr,
    })
}

fn run_streaming(inv: &Invocation) -> HalResult<ExitStatus> {
    let mut cmd = build_command(inv);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    log::debug!("exec (streaming): {}", inv.display());
    let mut child = cmd.spawn().map_err(|e| map_spawn_err(&inv.program, e))?;
    wait_child(&inv.program, &mut child, inv.timeout)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file");
    path.with_file_name(format!(".{file_name}.namada-setup.tmp"))
}

fn probe(program: &str, args: &[&str]) -> Invocation {
    Invocation::new(program)
        .args(args.iter().copied())
        .timeout(PROBE_TIMEOUT)
}

impl ProcessOps for LinuxHal {
    fn command_output(&self, inv: &Invocation) -> HalResult<Output> {
        if inv.stream {
            let status = run_streaming(inv)?;
            return Ok(Output {
                status,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }
        run_captured(inv)
    }

    fn command_status(&self, inv: &Invocation) -> HalResult<()> {
        let output = self.command_output(inv)?;
        if !output.status.success() {
            return Err(exit_failed(&inv.program, output.status, &output.stderr));
        }
        Ok(())
    }

    fn find_binary(&self, name: &str) -> HalResult<Option<PathBuf>> {
        if name.contains('/') {
            let path = PathBuf::from(name);
            return Ok(is_executable(&path).then_some(path));
        }
        let Some(path_var) = std::env::var_os("PATH") else {
            return Ok(None);
        };
        Ok(std::env::split_paths(&path_var)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate)))
    }
}

impl UserOps for LinuxHal {
    fn user_exists(&self, name: &str) -> HalResult<bool> {
        Ok(User::from_name(name)?.is_some())
    }

    fn group_exists(&self, name: &str) -> HalResult<bool> {
        Ok(Group::from_name(name)?.is_some())
    }

    fn user_in_group(&self, user: &str, group: &str) -> HalResult<bool> {
        let (Some(u), Some(g)) = (User::from_name(user)?, Group::from_name(group)?) else {
            return Ok(false);
        };
        Ok(u.gid == g.gid || g.mem.iter().any(|m| m == user))
    }

    fn home_dir(&self, name: &str) -> HalResult<Option<PathBuf>> {
        Ok(User::from_name(name)?.map(|u| u.dir))
    }

    fn password_set(&self, name: &str) -> HalResult<bool> {
        if !self.user_exists(name)? {
            return Ok(false);
        }
        let stdout = self.command_stdout(&probe("passwd", &["-S", name]))?;
        Ok(stdout
            .as_deref()
            .and_then(|line| line.split_whitespace().nth(1))
            == Some("P"))
    }

    fn create_user(&self, spec: &UserSpec) -> HalResult<()> {
        self.command_status(&Invocation::new("useradd").args(spec.useradd_args()))
    }

    fn add_user_to_group(&self, user: &str, group: &str) -> HalResult<()> {
        self.command_status(&Invocation::new("usermod").args(["-aG", group, user]))
    }

    fn set_password_interactive(&self, name: &str) -> HalResult<()> {
        self.command_status(&Invocation::new("passwd").arg(name).streaming())
    }
}

impl FileOps for LinuxHal {
    fn path_exists(&self, path: &Path) -> HalResult<bool> {
        path.try_exists().map_err(|e| map_io_err(path, e))
    }

    fn read_to_string(&self, path: &Path) -> HalResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(map_io_err(path, err)),
        }
    }

    fn owner(&self, path: &Path) -> HalResult<Option<String>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(map_io_err(path, err)),
        };
        let uid = metadata.uid();
        Ok(Some(
            User::from_uid(Uid::from_raw(uid))?
                .map(|u| u.name)
                .unwrap_or_else(|| uid.to_string()),
        ))
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> HalResult<()> {
        let tmp_path = temp_path(path);
        let mut file = File::create(&tmp_path).map_err(|e| map_io_err(&tmp_path, e))?;
        file.write_all(contents)?;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.sync_all()?;
        fs::rename(&tmp_path, path).map_err(|e| map_io_err(path, e))?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                dir.sync_all().ok();
            }
        }
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> HalResult<()> {
        fs::create_dir_all(path).map_err(|e| map_io_err(path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| map_io_err(path, e))
    }

    fn chown(&self, path: &Path, user: &str, group: &str, recursive: bool) -> HalResult<()> {
        let uid = User::from_name(user)?
            .ok_or_else(|| HalError::UnknownUser(user.to_string()))?
            .uid;
        let gid: Gid = Group::from_name(group)?
            .ok_or_else(|| HalError::Other(format!("No such group: {group}")))?
            .gid;

        if !recursive {
            return nix::unistd::chown(path, Some(uid), Some(gid)).map_err(|e| map_nix_err(path, e));
        }
        for entry in walkdir::WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| HalError::Other(e.to_string()))?;
            std::os::unix::fs::lchown(entry.path(), Some(uid.as_raw()), Some(gid.as_raw()))
                .map_err(|e| map_io_err(entry.path(), e))?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> HalResult<()> {
        fs::rename(from, to).map_err(|e| map_io_err(to, e))
    }

    fn remove_file(&self, path: &Path) -> HalResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(map_io_err(path, err)),
        }
    }

    fn install_file(&self, src: &Path, dst: &Path, mode: u32) -> HalResult<()> {
        // Copy beside the destination and rename so a running binary is never truncated.
        let tmp_path = temp_path(dst);
        fs::copy(src, &tmp_path).map_err(|e| map_io_err(src, e))?;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode))?;
        fs::rename(&tmp_path, dst).map_err(|e| map_io_err(dst, e))
    }
}

impl SysctlOps for LinuxHal {
    fn sysctl_value(&self, key: &str) -> HalResult<Option<String>> {
        let path = Path::new(PROC_SYS).join(key.replace('.', "/"));
        self.read_to_string(&path)
            .map(|value| value.map(|v| v.trim().to_string()))
    }

    fn reload_sysctl(&self) -> HalResult<()> {
        self.command_status(&Invocation::new("sysctl").arg("--system"))
    }
}

impl ServiceOps for LinuxHal {
    fn unit_active(&self, unit: &str) -> HalResult<bool> {
        let output = self.command_output(&probe("systemctl", &["is-active", "--quiet", unit]))?;
        Ok(output.status.success())
    }

    fn unit_enabled(&self, unit: &str) -> HalResult<bool> {
        let output = self.command_output(&probe("systemctl", &["is-enabled", "--quiet", unit]))?;
        Ok(output.status.success())
    }

    fn daemon_reload(&self) -> HalResult<()> {
        self.command_status(&Invocation::new("systemctl").arg("daemon-reload"))
    }

    fn service_action(&self, unit: &str, action: ServiceAction) -> HalResult<()> {
        self.command_status(
            &Invocation::new("systemctl")
                .args(action.systemctl_args().iter().copied())
                .arg(unit),
        )
    }

    fn unit_status(&self, unit: &str) -> HalResult<String> {
        let output =
            self.command_output(&probe("systemctl", &["status", "--no-pager", "--full", unit]))?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn journal(&self, unit: &str, lines: u32, follow: bool) -> HalResult<()> {
        let mut inv = Invocation::new("journalctl")
            .args(["-u", unit, "-n"])
            .arg(lines.to_string())
            .arg("--no-pager")
            .streaming();
        if follow {
            inv = inv.arg("--follow");
        }
        self.command_status(&inv)
    }
}

impl FirewallOps for LinuxHal {
    fn firewall_status(&self) -> HalResult<FirewallStatus> {
        match self.command_stdout(&probe("ufw", &["status", "verbose"])) {
            Ok(stdout) => Ok(stdout.as_deref().map(parse_ufw_status).unwrap_or_default()),
            Err(HalError::CommandNotFound(_)) => Ok(FirewallStatus::default()),
            Err(err) => Err(err),
        }
    }

    fn firewall_rules(&self) -> HalResult<Vec<String>> {
        match self.command_stdout(&probe("ufw", &["show", "added"])) {
            Ok(stdout) => Ok(stdout.as_deref().map(parse_added_rules).unwrap_or_default()),
            Err(HalError::CommandNotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn set_default_policy(&self, incoming: Policy, outgoing: Policy) -> HalResult<()> {
        for (policy, direction) in [(incoming, "incoming"), (outgoing, "outgoing")] {
            self.command_status(
                &Invocation::new("ufw")
                    .arg("default")
                    .arg(policy.to_string())
                    .arg(direction),
            )?;
        }
        Ok(())
    }

    fn add_rule(&self, rule: &FirewallRule) -> HalResult<()> {
        self.command_status(&Invocation::new("ufw").args(rule.ufw_args()))
    }

    fn enable_firewall(&self) -> HalResult<()> {
        self.command_status(&Invocation::new("ufw").args(["--force", "enable"]))
    }
}

impl PackageOps for LinuxHal {
    fn package_installed(&self, name: &str) -> HalResult<bool> {
        let stdout = self.command_stdout(&probe("dpkg-query", &["-W", "-f=${Status}", name]))?;
        Ok(stdout.as_deref().map(status_is_installed).unwrap_or(false))
    }

    fn update_index(&self) -> HalResult<()> {
        self.command_status(&update_invocation())
    }

    fn install_packages(&self, pkgs: &[String]) -> HalResult<()> {
        if pkgs.is_empty() {
            return Ok(());
        }
        self.command_status(&install_invocation(pkgs))
    }
}

impl HostInfoOps for LinuxHal {
    fn os_release(&self) -> HalResult<OsReleaseInfo> {
        for path in OS_RELEASE_PATHS {
            if let Some(content) = self.read_to_string(Path::new(path))? {
                return Ok(crate::os_release::parse_os_release(&content));
            }
        }
        Ok(OsReleaseInfo::default())
    }

    fn effective_uid(&self) -> u32 {
        Uid::effective().as_raw()
    }
}

impl NetOps for LinuxHal {
    fn fetch(&self, url: &str) -> HalResult<Vec<u8>> {
        let download_err = |reason: String| HalError::Download {
            url: url.to_string(),
            reason,
        };
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("namada-setup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| download_err(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_err(e.to_string()))?;
        let bytes = response.bytes().map_err(|e| download_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
