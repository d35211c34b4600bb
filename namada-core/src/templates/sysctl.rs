use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::HardeningConfig;
use anyhow::{bail, Result};
use namada_hal::{normalize_sysctl_value, SystemHal};
use std::collections::BTreeMap;
use std::path::PathBuf;

const BASELINE: &[(&str, &str)] = &[
    ("kernel.kptr_restrict", "2"),
    ("kernel.dmesg_restrict", "1"),
    ("kernel.unprivileged_bpf_disabled", "1"),
    ("kernel.yama.ptrace_scope", "1"),
    ("net.core.bpf_jit_harden", "2"),
    ("fs.protected_hardlinks", "1"),
    ("fs.protected_symlinks", "1"),
    ("fs.suid_dumpable", "0"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("net.ipv4.conf.all.accept_redirects", "0"),
    ("net.ipv4.conf.default.accept_redirects", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
    ("net.ipv4.conf.all.accept_source_route", "0"),
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.all.log_martians", "1"),
    ("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
    ("net.ipv6.conf.all.accept_redirects", "0"),
    ("net.ipv6.conf.default.accept_redirects", "0"),
];

/// Kernel and network hardening drop-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysctlHardening {
    pub entries: BTreeMap<String, String>,
}

impl SysctlHardening {
    pub fn from_config(config: &HardeningConfig) -> Self {
        let mut entries: BTreeMap<String, String> = BASELINE
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        entries.extend(config.sysctl_overrides.clone());
        Self { entries }
    }

    /// Keys whose live value differs from the drop-in (or cannot be read).
    pub fn live_mismatches(&self, hal: &dyn SystemHal) -> Result<Vec<String>> {
        let mut mismatched = Vec::new();
        for (key, want) in &self.entries {
            let live = hal.sysctl_value(key)?;
            if live.as_deref().map(normalize_sysctl_value) != Some(normalize_sysctl_value(want)) {
                mismatched.push(key.clone());
            }
        }
        Ok(mismatched)
    }
}

impl ConfigTemplate for SysctlHardening {
    fn path(&self) -> PathBuf {
        PathBuf::from("/etc/sysctl.d/99-namada-hardening.conf")
    }

    fn render(&self) -> Result<String> {
        let mut out = MANAGED_HEADER.to_string();
        for (key, value) in &self.entries {
            out.push_str(&format!("{key} = {value}\n"));
        }
        Ok(out)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in &self.entries {
            if !key.contains('.') || key.contains(char::is_whitespace) {
                bail!("invalid sysctl key {key:?}");
            }
            if value.contains('\n') {
                bail!("invalid sysctl value for {key}");
            }
        }
        Ok(())
    }
}
