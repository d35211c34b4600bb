//! Fake HAL implementation for testing.
//!
//! Unlike a pure recorder, this keeps an in-memory model of the host (users, files, kernel
//! parameters, packages, units, firewall) so guards observe the effects of earlier actions
//! and re-runs can be asserted to be no-ops.

use super::{
    FileOps, FirewallOps, FirewallRule, FirewallStatus, HostInfoOps, Invocation, NetOps,
    OsReleaseInfo, PackageOps, Policy, Privilege, ProcessOps, ServiceAction, ServiceOps,
    SysctlOps, UserOps, UserSpec,
};
use crate::{HalError, HalResult};
use std::collections::{BTreeMap, BTreeSet};
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        privilege: Privilege,
    },
    CreateUser {
        name: String,
    },
    AddToGroup {
        user: String,
        group: String,
    },
    SetPassword {
        user: String,
    },
    WriteFile {
        path: PathBuf,
    },
    CreateDir {
        path: PathBuf,
    },
    Chown {
        path: PathBuf,
        user: String,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
    },
    RemoveFile {
        path: PathBuf,
    },
    InstallFile {
        src: PathBuf,
        dst: PathBuf,
    },
    ReloadSysctl,
    DaemonReload,
    Service {
        unit: String,
        action: ServiceAction,
    },
    FirewallDefaults {
        incoming: Policy,
        outgoing: Policy,
    },
    FirewallRule {
        rule: String,
    },
    FirewallEnable,
    UpdateIndex,
    InstallPackages {
        pkgs: Vec<String>,
    },
    Fetch {
        url: String,
    },
}

impl Operation {
    /// The external program a real host would run for this operation.
    pub fn program(&self) -> &str {
        match self {
            Operation::Command { program, .. } => program,
            Operation::CreateUser { .. } => "useradd",
            Operation::AddToGroup { .. } => "usermod",
            Operation::SetPassword { .. } => "passwd",
            Operation::WriteFile { .. }
            | Operation::CreateDir { .. }
            | Operation::Chown { .. }
            | Operation::Rename { .. }
            | Operation::RemoveFile { .. }
            | Operation::InstallFile { .. } => "fs",
            Operation::ReloadSysctl => "sysctl",
            Operation::DaemonReload | Operation::Service { .. } => "systemctl",
            Operation::FirewallDefaults { .. }
            | Operation::FirewallRule { .. }
            | Operation::FirewallEnable => "ufw",
            Operation::UpdateIndex | Operation::InstallPackages { .. } => "apt-get",
            Operation::Fetch { .. } => "fetch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeUser {
    pub home: PathBuf,
    pub shell: String,
    pub primary_group: String,
    pub password_set: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeFile {
    pub contents: Vec<u8>,
    pub mode: u32,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDir {
    pub mode: u32,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeUnit {
    pub enabled: bool,
    pub active: bool,
}

/// In-memory model of the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeHost {
    pub users: BTreeMap<String, FakeUser>,
    /// group -> supplementary members
    pub groups: BTreeMap<String, BTreeSet<String>>,
    pub files: BTreeMap<PathBuf, FakeFile>,
    pub dirs: BTreeMap<PathBuf, FakeDir>,
    pub sysctl: BTreeMap<String, String>,
    pub packages: BTreeSet<String>,
    /// package -> units it ships
    pub package_units: BTreeMap<String, Vec<String>>,
    pub units: BTreeMap<String, FakeUnit>,
    pub firewall: FirewallStatus,
    pub firewall_rules: Vec<String>,
    pub path_dirs: Vec<PathBuf>,
    pub downloads: BTreeMap<String, Vec<u8>>,
    pub offline: bool,
    pub os_release: OsReleaseInfo,
    pub euid: u32,
}

fn unit_key(unit: &str) -> String {
    unit.strip_suffix(".service").unwrap_or(unit).to_string()
}

fn not_found(path: &Path) -> HalError {
    HalError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{}: No such file or directory", path.display()),
    ))
}

impl FakeHost {
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let mut current = PathBuf::new();
        for component in path.as_ref().components() {
            current.push(component);
            self.dirs.entry(current.clone()).or_insert(FakeDir {
                mode: 0o755,
                owner: "root".to_string(),
            });
        }
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>, mode: u32) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files.insert(
            path.to_path_buf(),
            FakeFile {
                contents: contents.as_ref().to_vec(),
                mode,
                owner: "root".to_string(),
            },
        );
    }

    pub fn add_executable(&mut self, path: impl AsRef<Path>) {
        self.add_file(path, b"#!/bin/sh\n", 0o755);
    }

    pub fn add_group(&mut self, name: &str) {
        self.groups.entry(name.to_string()).or_default();
    }

    pub fn add_user(&mut self, name: &str, home: impl Into<PathBuf>) {
        let home = home.into();
        self.add_group(name);
        self.add_dir(&home);
        if let Some(dir) = self.dirs.get_mut(&home) {
            dir.owner = name.to_string();
        }
        self.users.insert(
            name.to_string(),
            FakeUser {
                home,
                shell: "/bin/bash".to_string(),
                primary_group: name.to_string(),
                password_set: false,
            },
        );
    }

    pub fn add_unit(&mut self, unit: &str, enabled: bool, active: bool) {
        self.units
            .insert(unit_key(unit), FakeUnit { enabled, active });
    }

    pub fn file_text(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .get(path.as_ref())
            .map(|f| String::from_utf8_lossy(&f.contents).to_string())
    }

    pub fn unit(&self, unit: &str) -> FakeUnit {
        self.units.get(&unit_key(unit)).copied().unwrap_or_default()
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.files
            .get(path)
            .map(|f| f.mode & 0o111 != 0)
            .unwrap_or(false)
    }

    fn unit_known(&self, unit: &str) -> bool {
        let key = unit_key(unit);
        self.units.contains_key(&key)
            || ["/etc/systemd/system", "/lib/systemd/system"]
                .iter()
                .any(|dir| self.files.contains_key(&Path::new(dir).join(format!("{key}.service"))))
    }

    fn apply_sysctl_files(&mut self) {
        let sources: Vec<String> = self
            .files
            .iter()
            .filter(|(path, _)| {
                path.as_path() == Path::new("/etc/sysctl.conf")
                    || (path.starts_with("/etc/sysctl.d")
                        && path.extension().and_then(|e| e.to_str()) == Some("conf"))
            })
            .map(|(_, file)| String::from_utf8_lossy(&file.contents).to_string())
            .collect();
        for content in sources {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    self.sysctl
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
    }
}

type CommandHandler = Arc<dyn Fn(&Invocation, &mut FakeHost) -> HalResult<Output> + Send + Sync>;
type FailureMatcher = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

#[derive(Default)]
struct FakeHalState {
    host: FakeHost,
    operations: Vec<Operation>,
    handlers: BTreeMap<String, CommandHandler>,
    failures: Vec<FailureMatcher>,
}

/// Fake HAL implementation that simulates a host without touching it.
#[derive(Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl std::fmt::Debug for FakeHal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHal")
            .field("operations", &self.operation_count())
            .finish()
    }
}

pub fn exit_status(code: i32) -> ExitStatus {
    #[cfg(unix)]
    {
        ExitStatus::from_raw(code << 8)
    }
    #[cfg(not(unix))]
    {
        let _ = code;
        unimplemented!("FakeHal exit statuses require unix")
    }
}

pub fn success_output(stdout: impl Into<Vec<u8>>) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.into(),
        stderr: Vec::new(),
    }
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh Ubuntu 24.04 host running as root.
    pub fn ubuntu() -> Self {
        let hal = Self::new();
        hal.with_host(|host| {
            host.os_release = OsReleaseInfo {
                id: Some("ubuntu".to_string()),
                version_id: Some("24.04".to_string()),
                version_codename: Some("noble".to_string()),
                pretty_name: Some("Ubuntu 24.04.1 LTS".to_string()),
            };
            host.euid = 0;
            host.path_dirs = ["/usr/local/sbin", "/usr/local/bin", "/usr/sbin", "/usr/bin"]
                .iter()
                .map(PathBuf::from)
                .collect();
            host.add_user("root", "/root");
            for group in ["sudo", "adm", "users"] {
                host.add_group(group);
            }
            for dir in [
                "/etc/sudoers.d",
                "/etc/sysctl.d",
                "/etc/ssh/sshd_config.d",
                "/etc/systemd/system",
                "/etc/apt/apt.conf.d",
                "/opt",
                "/var/lib",
                "/usr/local/bin",
            ] {
                host.add_dir(dir);
            }
            host.add_file(
                "/etc/fstab",
                "# /etc/fstab: static file system information.\nUUID=1234 / ext4 defaults 0 1\n",
                0o644,
            );
            for bin in [
                "/usr/bin/apt-get",
                "/usr/bin/dpkg-query",
                "/usr/bin/systemctl",
                "/usr/bin/journalctl",
                "/usr/sbin/useradd",
                "/usr/sbin/usermod",
                "/usr/sbin/runuser",
                "/usr/sbin/sysctl",
                "/usr/sbin/visudo",
                "/usr/bin/git",
                "/usr/bin/mount",
            ] {
                host.add_executable(bin);
            }
            for (key, value) in [
                ("kernel.kptr_restrict", "1"),
                ("kernel.dmesg_restrict", "0"),
                ("net.ipv4.tcp_syncookies", "1"),
                ("net.ipv4.conf.all.accept_redirects", "1"),
            ] {
                host.sysctl.insert(key.to_string(), value.to_string());
            }
            host.packages.insert("openssh-server".to_string());
            host.add_unit("ssh", true, true);
            host.package_units
                .insert("fail2ban".to_string(), vec!["fail2ban".to_string()]);
            host.package_units
                .insert("unattended-upgrades".to_string(), vec!["unattended-upgrades".to_string()]);
        });
        hal
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate the simulated host directly (test setup).
    pub fn with_host<R>(&self, f: impl FnOnce(&mut FakeHost) -> R) -> R {
        f(&mut self.lock().host)
    }

    /// Snapshot of the simulated host.
    pub fn host(&self) -> FakeHost {
        self.lock().host.clone()
    }

    /// Register the effect of running `program`.
    pub fn on_command(
        &self,
        program: &str,
        handler: impl Fn(&Invocation, &mut FakeHost) -> HalResult<Output> + Send + Sync + 'static,
    ) {
        self.lock()
            .handlers
            .insert(program.to_string(), Arc::new(handler));
    }

    /// Make every operation matching `matcher` fail with a non-zero exit.
    pub fn fail_when(&self, matcher: impl Fn(&Operation) -> bool + Send + Sync + 'static) {
        self.lock().failures.push(Arc::new(matcher));
    }

    /// Make every invocation of `program` fail with a non-zero exit.
    pub fn fail_command(&self, program: &str) {
        let program = program.to_string();
        self.fail_when(move |op| matches!(op, Operation::Command { program: p, .. } if *p == program));
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().host.offline = offline;
    }

    pub fn serve_download(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.lock().host.downloads.insert(url.to_string(), body.into());
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Command { program, args, .. } => {
                    Some(std::iter::once(program.clone()).chain(args.iter().cloned()).collect::<Vec<_>>().join(" "))
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Record a mutation and apply injected failures.
    fn record(&self, state: &mut FakeHalState, op: Operation) -> HalResult<()> {
        log::info!("FAKE HAL: {:?}", op);
        let failed = state.failures.iter().any(|m| m(&op));
        let program = op.program().to_string();
        state.operations.push(op);
        if failed {
            return Err(HalError::CommandFailed {
                program,
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn mutate(
        &self,
        op: Operation,
        f: impl FnOnce(&mut FakeHost) -> HalResult<()>,
    ) -> HalResult<()> {
        let mut state = self.lock();
        self.record(&mut state, op)?;
        f(&mut state.host)
    }
}

impl ProcessOps for FakeHal {
    fn command_output(&self, inv: &Invocation) -> HalResult<Output> {
        let mut state = self.lock();
        if let Privilege::User(user) = &inv.privilege {
            if !state.host.users.contains_key(user) {
                return Err(HalError::UnknownUser(user.clone()));
            }
        }
        let op = Operation::Command {
            program: inv.program.clone(),
            args: inv.args.clone(),
            privilege: inv.privilege.clone(),
        };
        if let Err(err) = self.record(&mut state, op) {
            if let HalError::CommandFailed { stderr, .. } = err {
                return Ok(Output {
                    status: exit_status(1),
                    stdout: Vec::new(),
                    stderr: stderr.into_bytes(),
                });
            }
            return Err(err);
        }
        let handler = state.handlers.get(&inv.program).cloned();
        match handler {
            Some(handler) => handler(inv, &mut state.host),
            None => Ok(success_output(Vec::new())),
        }
    }

    fn command_status(&self, inv: &Invocation) -> HalResult<()> {
        let output = self.command_output(inv)?;
        if !output.status.success() {
            return Err(HalError::CommandFailed {
                program: inv.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn find_binary(&self, name: &str) -> HalResult<Option<PathBuf>> {
        let state = self.lock();
        let host = &state.host;
        if name.contains('/') {
            let path = PathBuf::from(name);
            return Ok(host.is_executable(&path).then_some(path));
        }
        Ok(host
            .path_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| host.is_executable(candidate)))
    }
}

impl UserOps for FakeHal {
    fn user_exists(&self, name: &str) -> HalResult<bool> {
        Ok(self.lock().host.users.contains_key(name))
    }

    fn group_exists(&self, name: &str) -> HalResult<bool> {
        Ok(self.lock().host.groups.contains_key(name))
    }

    fn user_in_group(&self, user: &str, group: &str) -> HalResult<bool> {
        let state = self.lock();
        let Some(u) = state.host.users.get(user) else {
            return Ok(false);
        };
        Ok(u.primary_group == group
            || state
                .host
                .groups
                .get(group)
                .map(|members| members.contains(user))
                .unwrap_or(false))
    }

    fn home_dir(&self, name: &str) -> HalResult<Option<PathBuf>> {
        Ok(self.lock().host.users.get(name).map(|u| u.home.clone()))
    }

    fn password_set(&self, name: &str) -> HalResult<bool> {
        Ok(self
            .lock()
            .host
            .users
            .get(name)
            .map(|u| u.password_set)
            .unwrap_or(false))
    }

    fn create_user(&self, spec: &UserSpec) -> HalResult<()> {
        let spec = spec.clone();
        self.mutate(
            Operation::CreateUser {
                name: spec.name.clone(),
            },
            move |host| {
                if host.users.contains_key(&spec.name) {
                    return Err(HalError::CommandFailed {
                        program: "useradd".to_string(),
                        code: Some(9),
                        stderr: format!("useradd: user '{}' already exists", spec.name),
                    });
                }
                if let Some(missing) = spec.groups.iter().find(|g| !host.groups.contains_key(*g)) {
                    return Err(HalError::CommandFailed {
                        program: "useradd".to_string(),
                        code: Some(6),
                        stderr: format!("useradd: group '{missing}' does not exist"),
                    });
                }
                let home = spec
                    .home
                    .clone()
                    .unwrap_or_else(|| Path::new("/home").join(&spec.name));
                host.add_group(&spec.name);
                if spec.create_home {
                    host.add_dir(&home);
                    if let Some(dir) = host.dirs.get_mut(&home) {
                        dir.owner = spec.name.clone();
                        dir.mode = 0o750;
                    }
                }
                for group in &spec.groups {
                    host.groups
                        .entry(group.clone())
                        .or_default()
                        .insert(spec.name.clone());
                }
                host.users.insert(
                    spec.name.clone(),
                    FakeUser {
                        home,
                        shell: spec.shell.clone(),
                        primary_group: spec.name.clone(),
                        password_set: false,
                    },
                );
                Ok(())
            },
        )
    }

    fn add_user_to_group(&self, user: &str, group: &str) -> HalResult<()> {
        let (user, group) = (user.to_string(), group.to_string());
        self.mutate(
            Operation::AddToGroup {
                user: user.clone(),
                group: group.clone(),
            },
            move |host| {
                if !host.users.contains_key(&user) {
                    return Err(HalError::UnknownUser(user));
                }
                let Some(members) = host.groups.get_mut(&group) else {
                    return Err(HalError::CommandFailed {
                        program: "usermod".to_string(),
                        code: Some(6),
                        stderr: format!("usermod: group '{group}' does not exist"),
                    });
                };
                members.insert(user);
                Ok(())
            },
        )
    }

    fn set_password_interactive(&self, name: &str) -> HalResult<()> {
        let name = name.to_string();
        self.mutate(Operation::SetPassword { user: name.clone() }, move |host| {
            let user = host
                .users
                .get_mut(&name)
                .ok_or_else(|| HalError::UnknownUser(name.clone()))?;
            user.password_set = true;
            Ok(())
        })
    }
}

impl FileOps for FakeHal {
    fn path_exists(&self, path: &Path) -> HalResult<bool> {
        let state = self.lock();
        Ok(state.host.files.contains_key(path) || state.host.dirs.contains_key(path))
    }

    fn read_to_string(&self, path: &Path) -> HalResult<Option<String>> {
        Ok(self.lock().host.file_text(path))
    }

    fn owner(&self, path: &Path) -> HalResult<Option<String>> {
        let state = self.lock();
        Ok(state
            .host
            .files
            .get(path)
            .map(|f| f.owner.clone())
            .or_else(|| state.host.dirs.get(path).map(|d| d.owner.clone())))
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> HalResult<()> {
        let path_buf = path.to_path_buf();
        let contents = contents.to_vec();
        self.mutate(
            Operation::WriteFile {
                path: path_buf.clone(),
            },
            move |host| {
                let parent = path_buf.parent().unwrap_or(Path::new("/"));
                if !host.dirs.contains_key(parent) {
                    return Err(not_found(parent));
                }
                let owner = host
                    .files
                    .get(&path_buf)
                    .map(|f| f.owner.clone())
                    .unwrap_or_else(|| "root".to_string());
                host.files.insert(
                    path_buf,
                    FakeFile {
                        contents,
                        mode,
                        owner,
                    },
                );
                Ok(())
            },
        )
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> HalResult<()> {
        let path_buf = path.to_path_buf();
        self.mutate(
            Operation::CreateDir {
                path: path_buf.clone(),
            },
            move |host| {
                host.add_dir(&path_buf);
                if let Some(dir) = host.dirs.get_mut(&path_buf) {
                    dir.mode = mode;
                }
                Ok(())
            },
        )
    }

    fn chown(&self, path: &Path, user: &str, _group: &str, recursive: bool) -> HalResult<()> {
        let path_buf = path.to_path_buf();
        let user = user.to_string();
        self.mutate(
            Operation::Chown {
                path: path_buf.clone(),
                user: user.clone(),
            },
            move |host| {
                if !host.users.contains_key(&user) {
                    return Err(HalError::UnknownUser(user));
                }
                let selected = |p: &PathBuf| {
                    *p == path_buf || (recursive && p.starts_with(&path_buf))
                };
                let mut touched = false;
                for (p, file) in host.files.iter_mut() {
                    if selected(p) {
                        file.owner = user.clone();
                        touched = true;
                    }
                }
                for (p, dir) in host.dirs.iter_mut() {
                    if selected(p) {
                        dir.owner = user.clone();
                        touched = true;
                    }
                }
                if !touched {
                    return Err(not_found(&path_buf));
                }
                Ok(())
            },
        )
    }

    fn rename(&self, from: &Path, to: &Path) -> HalResult<()> {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        self.mutate(
            Operation::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            move |host| {
                let file = host.files.remove(&from).ok_or_else(|| not_found(&from))?;
                host.files.insert(to, file);
                Ok(())
            },
        )
    }

    fn remove_file(&self, path: &Path) -> HalResult<()> {
        let path = path.to_path_buf();
        self.mutate(Operation::RemoveFile { path: path.clone() }, move |host| {
            host.files.remove(&path);
            Ok(())
        })
    }

    fn install_file(&self, src: &Path, dst: &Path, mode: u32) -> HalResult<()> {
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        self.mutate(
            Operation::InstallFile {
                src: src.clone(),
                dst: dst.clone(),
            },
            move |host| {
                let mut file = host.files.get(&src).cloned().ok_or_else(|| not_found(&src))?;
                let parent = dst.parent().unwrap_or(Path::new("/"));
                if !host.dirs.contains_key(parent) {
                    return Err(not_found(parent));
                }
                file.mode = mode;
                file.owner = "root".to_string();
                host.files.insert(dst, file);
                Ok(())
            },
        )
    }
}

impl SysctlOps for FakeHal {
    fn sysctl_value(&self, key: &str) -> HalResult<Option<String>> {
        Ok(self.lock().host.sysctl.get(key).cloned())
    }

    fn reload_sysctl(&self) -> HalResult<()> {
        self.mutate(Operation::ReloadSysctl, |host| {
            host.apply_sysctl_files();
            Ok(())
        })
    }
}

impl ServiceOps for FakeHal {
    fn unit_active(&self, unit: &str) -> HalResult<bool> {
        Ok(self.lock().host.unit(unit).active)
    }

    fn unit_enabled(&self, unit: &str) -> HalResult<bool> {
        Ok(self.lock().host.unit(unit).enabled)
    }

    fn daemon_reload(&self) -> HalResult<()> {
        self.mutate(Operation::DaemonReload, |_| Ok(()))
    }

    fn service_action(&self, unit: &str, action: ServiceAction) -> HalResult<()> {
        let unit = unit.to_string();
        self.mutate(
            Operation::Service {
                unit: unit.clone(),
                action,
            },
            move |host| {
                if !host.unit_known(&unit) {
                    return Err(HalError::CommandFailed {
                        program: "systemctl".to_string(),
                        code: Some(5),
                        stderr: format!("Unit {}.service not found.", unit_key(&unit)),
                    });
                }
                let state = host.units.entry(unit_key(&unit)).or_default();
                match action {
                    ServiceAction::Start | ServiceAction::Restart => state.active = true,
                    ServiceAction::Stop => state.active = false,
                    ServiceAction::Enable => state.enabled = true,
                    ServiceAction::EnableNow => {
                        state.enabled = true;
                        state.active = true;
                    }
                }
                Ok(())
            },
        )
    }

    fn unit_status(&self, unit: &str) -> HalResult<String> {
        let state = self.lock().host.unit(unit);
        Ok(format!(
            "{}.service - fake unit\n     Loaded: loaded ({})\n     Active: {}\n",
            unit_key(unit),
            if state.enabled { "enabled" } else { "disabled" },
            if state.active { "active (running)" } else { "inactive (dead)" }
        ))
    }

    fn journal(&self, unit: &str, lines: u32, follow: bool) -> HalResult<()> {
        let mut args = vec![
            "-u".to_string(),
            unit.to_string(),
            "-n".to_string(),
            lines.to_string(),
        ];
        if follow {
            args.push("--follow".to_string());
        }
        let mut state = self.lock();
        self.record(
            &mut state,
            Operation::Command {
                program: "journalctl".to_string(),
                args,
                privilege: Privilege::Root,
            },
        )
    }
}

impl FirewallOps for FakeHal {
    fn firewall_status(&self) -> HalResult<FirewallStatus> {
        Ok(self.lock().host.firewall.clone())
    }

    fn firewall_rules(&self) -> HalResult<Vec<String>> {
        Ok(self.lock().host.firewall_rules.clone())
    }

    fn set_default_policy(&self, incoming: Policy, outgoing: Policy) -> HalResult<()> {
        self.mutate(
            Operation::FirewallDefaults { incoming, outgoing },
            move |host| {
                host.firewall.default_incoming = Some(incoming.to_string());
                host.firewall.default_outgoing = Some(outgoing.to_string());
                Ok(())
            },
        )
    }

    fn add_rule(&self, rule: &FirewallRule) -> HalResult<()> {
        let rule = rule.clone();
        self.mutate(
            Operation::FirewallRule {
                rule: rule.to_string(),
            },
            move |host| {
                // ufw skips rules that already exist.
                if !host.firewall_rules.iter().any(|line| rule.matches_added(line)) {
                    host.firewall_rules.push(rule.to_string());
                }
                Ok(())
            },
        )
    }

    fn enable_firewall(&self) -> HalResult<()> {
        self.mutate(Operation::FirewallEnable, |host| {
            host.firewall.active = true;
            if host.firewall.default_incoming.is_none() {
                host.firewall.default_incoming = Some("deny".to_string());
                host.firewall.default_outgoing = Some("allow".to_string());
            }
            Ok(())
        })
    }
}

impl PackageOps for FakeHal {
    fn package_installed(&self, name: &str) -> HalResult<bool> {
        Ok(self.lock().host.packages.contains(name))
    }

    fn update_index(&self) -> HalResult<()> {
        self.mutate(Operation::UpdateIndex, |host| {
            if host.offline {
                return Err(HalError::CommandFailed {
                    program: "apt-get".to_string(),
                    code: Some(100),
                    stderr: "Temporary failure resolving 'archive.ubuntu.com'".to_string(),
                });
            }
            Ok(())
        })
    }

    fn install_packages(&self, pkgs: &[String]) -> HalResult<()> {
        if pkgs.is_empty() {
            return Ok(());
        }
        let pkgs = pkgs.to_vec();
        self.mutate(
            Operation::InstallPackages { pkgs: pkgs.clone() },
            move |host| {
                if host.offline {
                    return Err(HalError::CommandFailed {
                        program: "apt-get".to_string(),
                        code: Some(100),
                        stderr: "Unable to fetch some archives".to_string(),
                    });
                }
                for pkg in pkgs {
                    for unit in host.package_units.get(&pkg).cloned().unwrap_or_default() {
                        host.units.entry(unit_key(&unit)).or_insert(FakeUnit {
                            enabled: true,
                            active: true,
                        });
                    }
                    host.packages.insert(pkg);
                }
                Ok(())
            },
        )
    }
}

impl HostInfoOps for FakeHal {
    fn os_release(&self) -> HalResult<OsReleaseInfo> {
        Ok(self.lock().host.os_release.clone())
    }

    fn effective_uid(&self) -> u32 {
        self.lock().host.euid
    }
}

impl NetOps for FakeHal {
    fn fetch(&self, url: &str) -> HalResult<Vec<u8>> {
        let mut state = self.lock();
        self.record(
            &mut state,
            Operation::Fetch {
                url: url.to_string(),
            },
        )?;
        let download_err = |reason: &str| HalError::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        if state.host.offline {
            return Err(download_err("network unreachable"));
        }
        state
            .host
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| download_err("HTTP status client error (404 Not Found)"))
    }
}
