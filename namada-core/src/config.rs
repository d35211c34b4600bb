//! Effective configuration for namada-setup.
//!
//! Every field has a default so that no file, or an empty one, yields a working setup.

use crate::errors::{Result, SetupError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/namada-setup/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub operator: OperatorConfig,
    pub hardening: HardeningConfig,
    pub build_env: BuildEnvConfig,
    pub sandbox: SandboxConfig,
    pub node: NodeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatorConfig {
    pub name: String,
    pub shell: String,
    pub groups: Vec<String>,
    /// authorized_keys copied to the operator (usually root's, installed by the provider).
    pub ssh_key_source: PathBuf,
    pub sudo_nopasswd: bool,
    /// Prompt for a login password (needed for sudo unless `sudo_nopasswd`).
    pub set_password: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            name: "operator".to_string(),
            shell: "/bin/bash".to_string(),
            groups: vec!["sudo".to_string()],
            ssh_key_source: PathBuf::from("/root/.ssh/authorized_keys"),
            sudo_nopasswd: false,
            set_password: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardeningConfig {
    pub packages: Vec<String>,
    pub ssh_port: u16,
    /// `ssh` on Ubuntu, `sshd` elsewhere.
    pub ssh_unit: String,
    pub p2p_port: u16,
    pub extra_tcp_ports: Vec<u16>,
    /// Merged over the built-in kernel hardening values.
    pub sysctl_overrides: BTreeMap<String, String>,
    pub harden_shm: bool,
    pub unattended_upgrades: bool,
    pub fail2ban_maxretry: u32,
    pub fail2ban_bantime: String,
    pub fail2ban_findtime: String,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            packages: [
                "ufw",
                "fail2ban",
                "python3-systemd",
                "unattended-upgrades",
                "build-essential",
                "pkg-config",
                "libssl-dev",
                "clang",
                "git",
                "curl",
                "ca-certificates",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ssh_port: 22,
            ssh_unit: "ssh".to_string(),
            p2p_port: 26656,
            extra_tcp_ports: Vec::new(),
            sysctl_overrides: BTreeMap::new(),
            harden_shm: true,
            unattended_upgrades: true,
            fail2ban_maxretry: 5,
            fail2ban_bantime: "1h".to_string(),
            fail2ban_findtime: "10m".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildEnvConfig {
    pub root: PathBuf,
    pub toolchain: String,
    pub profile: String,
    pub rustup_dist_server: String,
    pub cargo_jobs: Option<u32>,
}

impl Default for BuildEnvConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/opt/namada-build"),
            toolchain: "stable".to_string(),
            profile: "minimal".to_string(),
            rustup_dist_server: "https://static.rust-lang.org".to_string(),
            cargo_jobs: None,
        }
    }
}

impl BuildEnvConfig {
    pub fn layout(&self) -> BuildEnv {
        BuildEnv {
            root: self.root.clone(),
            cargo_home: self.root.join("cargo"),
            rustup_home: self.root.join("rustup"),
            downloads: self.root.join("downloads"),
            src: self.root.join("src"),
        }
    }
}

/// Resolved build environment. Passed explicitly into every build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnv {
    pub root: PathBuf,
    pub cargo_home: PathBuf,
    pub rustup_home: PathBuf,
    pub downloads: PathBuf,
    pub src: PathBuf,
}

impl BuildEnv {
    pub fn dirs(&self) -> [&Path; 5] {
        [
            &self.root,
            &self.cargo_home,
            &self.rustup_home,
            &self.downloads,
            &self.src,
        ]
    }

    pub fn cargo_bin(&self, name: &str) -> PathBuf {
        self.cargo_home.join("bin").join(name)
    }

    pub fn path_var(&self) -> String {
        format!(
            "{}:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
            self.cargo_home.join("bin").display()
        )
    }

    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            (
                "CARGO_HOME".to_string(),
                self.cargo_home.display().to_string(),
            ),
            (
                "RUSTUP_HOME".to_string(),
                self.rustup_home.display().to_string(),
            ),
            ("PATH".to_string(), self.path_var()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    pub crate_name: String,
    /// `None` installs the latest published release.
    pub version: Option<String>,
    pub binary_path: PathBuf,
    pub policy_path: PathBuf,
    pub build_packages: Vec<String>,
    pub mem_max: Option<String>,
    pub pid_max: Option<u32>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            crate_name: "syd".to_string(),
            version: None,
            binary_path: PathBuf::from("/usr/local/bin/syd"),
            policy_path: PathBuf::from("/etc/namada/namada.syd-3"),
            build_packages: vec!["libseccomp-dev".to_string(), "pkg-config".to_string()],
            mem_max: Some("16G".to_string()),
            pid_max: Some(512),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub user: String,
    pub base_dir: PathBuf,
    pub repo: String,
    pub tag: String,
    pub chain_id: String,
    pub bin_dir: PathBuf,
    pub binaries: Vec<String>,
    pub cargo_packages: Vec<String>,
    pub cometbft_version: String,
    pub service_name: String,
    pub log_level: String,
    pub cometbft_log_level: String,
    /// Overrides where `join-network` fetches the chain archive from.
    pub network_configs_server: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            user: "namada".to_string(),
            base_dir: PathBuf::from("/var/lib/namada"),
            repo: "https://github.com/anoma/namada.git".to_string(),
            tag: "v101.0.0".to_string(),
            chain_id: "namada.5f5de2dd1b88cba30586420".to_string(),
            bin_dir: PathBuf::from("/usr/local/bin"),
            binaries: ["namada", "namadan", "namadac", "namadaw"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cargo_packages: vec!["namada_apps".to_string()],
            cometbft_version: "0.37.15".to_string(),
            service_name: "namada".to_string(),
            log_level: "info".to_string(),
            cometbft_log_level: "p2p:none,pex:error".to_string(),
            network_configs_server: None,
        }
    }
}

impl NodeConfig {
    pub fn binary(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    pub fn unit_path(&self) -> PathBuf {
        Path::new("/etc/systemd/system").join(format!("{}.service", self.service_name))
    }

    /// `v101.0.0` -> `101.0.0`
    pub fn version(&self) -> &str {
        self.tag.trim_start_matches('v')
    }
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    SetupError::InvalidConfig(msg.into()).into()
}

/// Names accepted by `useradd` without `--badname`.
pub fn valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 32
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn require_absolute(field: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(invalid(format!(
            "{field} must be an absolute path (got {})",
            path.display()
        )));
    }
    Ok(())
}

fn require_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| invalid(format!("{field}: {value}: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(invalid(format!("{field} must be an http(s) URL (got {value})")));
    }
    Ok(())
}

fn require_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '/' || c == '"') {
        return Err(invalid(format!("{field} is empty or malformed: {value:?}")));
    }
    Ok(())
}

impl Config {
    /// Load from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let op = &self.operator;
        if !valid_username(&op.name) {
            return Err(invalid(format!("operator.name is not a valid user name: {:?}", op.name)));
        }
        if op.name == "root" {
            return Err(invalid("operator.name must not be root"));
        }
        for group in &op.groups {
            if !valid_username(group) {
                return Err(invalid(format!("operator.groups has an invalid group: {group:?}")));
            }
        }
        require_absolute("operator.shell", Path::new(&op.shell))?;
        require_absolute("operator.ssh_key_source", &op.ssh_key_source)?;

        let h = &self.hardening;
        if h.ssh_port == 0 || h.p2p_port == 0 || h.extra_tcp_ports.contains(&0) {
            return Err(invalid("ports must be between 1 and 65535"));
        }
        if h.ssh_port == h.p2p_port {
            return Err(invalid("hardening.ssh_port and hardening.p2p_port must differ"));
        }
        require_token("hardening.ssh_unit", &h.ssh_unit)?;
        for (key, value) in &h.sysctl_overrides {
            if !key.contains('.') || key.contains(char::is_whitespace) {
                return Err(invalid(format!("invalid sysctl key: {key:?}")));
            }
            if value.trim().is_empty() || value.contains('\n') {
                return Err(invalid(format!("invalid sysctl value for {key}: {value:?}")));
            }
        }

        let b = &self.build_env;
        require_absolute("build_env.root", &b.root)?;
        require_token("build_env.toolchain", &b.toolchain)?;
        require_token("build_env.profile", &b.profile)?;
        require_url("build_env.rustup_dist_server", &b.rustup_dist_server)?;
        if b.cargo_jobs == Some(0) {
            return Err(invalid("build_env.cargo_jobs must be at least 1"));
        }

        let s = &self.sandbox;
        require_token("sandbox.crate_name", &s.crate_name)?;
        if let Some(version) = &s.version {
            require_token("sandbox.version", version)?;
        }
        require_absolute("sandbox.binary_path", &s.binary_path)?;
        require_absolute("sandbox.policy_path", &s.policy_path)?;

        let n = &self.node;
        if !valid_username(&n.user) || n.user == "root" {
            return Err(invalid(format!("node.user is not a valid user name: {:?}", n.user)));
        }
        if n.user == op.name {
            return Err(invalid("node.user must differ from operator.name"));
        }
        require_absolute("node.base_dir", &n.base_dir)?;
        require_absolute("node.bin_dir", &n.bin_dir)?;
        require_url("node.repo", &n.repo)?;
        require_token("node.tag", &n.tag)?;
        require_token("node.chain_id", &n.chain_id)?;
        require_token("node.cometbft_version", &n.cometbft_version)?;
        require_token("node.service_name", &n.service_name)?;
        if n.binaries.is_empty() || !n.binaries.iter().any(|b| b == "namada") {
            return Err(invalid("node.binaries must include namada"));
        }
        if let Some(server) = &n.network_configs_server {
            require_url("node.network_configs_server", server)?;
        }
        Ok(())
    }
}
