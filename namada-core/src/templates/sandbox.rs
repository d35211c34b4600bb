use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::Config;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Ports the ledger binds on loopback: RPC, ABCI, Prometheus.
const LOCAL_PORTS: &str = "26657-26661";

/// syd profile the node service runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub path: PathBuf,
    pub base_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub p2p_port: u16,
    pub mem_max: Option<String>,
    pub pid_max: Option<u32>,
}

impl SandboxPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.sandbox.policy_path.clone(),
            base_dir: config.node.base_dir.clone(),
            bin_dir: config.node.bin_dir.clone(),
            p2p_port: config.hardening.p2p_port,
            mem_max: config.sandbox.mem_max.clone(),
            pid_max: config.sandbox.pid_max,
        }
    }
}

impl ConfigTemplate for SandboxPolicy {
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn render(&self) -> Result<String> {
        let base = self.base_dir.display();
        let bin = self.bin_dir.display();
        let mut out = MANAGED_HEADER.to_string();
        for category in ["read", "stat", "write", "exec", "net"] {
            out.push_str(&format!("sandbox/{category}:on\n"));
        }
        for dir in ["/etc", "/usr", "/lib", "/lib64", "/proc", "/sys", "/dev"] {
            out.push_str(&format!("allow/read+{dir}/***\n"));
        }
        out.push_str(&format!("allow/read+{base}/***\n"));
        out.push_str("allow/stat+/***\n");
        out.push_str(&format!("allow/write+{base}/***\n"));
        out.push_str("allow/write+/dev/null\n");
        out.push_str("allow/write+/tmp/***\n");
        out.push_str(&format!("allow/exec+{bin}/namada*\n"));
        out.push_str(&format!("allow/exec+{bin}/cometbft\n"));
        out.push_str("allow/exec+/usr/lib/***\n");
        out.push_str("allow/exec+/lib/***\n");
        out.push_str(&format!("allow/net/bind+any!{}\n", self.p2p_port));
        out.push_str(&format!("allow/net/bind+loopback!{LOCAL_PORTS}\n"));
        out.push_str("allow/net/connect+any!1-65535\n");
        if let Some(mem) = &self.mem_max {
            out.push_str(&format!("sandbox/mem:on\nmem/max:{mem}\n"));
        }
        if let Some(pids) = self.pid_max {
            out.push_str(&format!("sandbox/pid:on\npid/max:{pids}\n"));
        }
        Ok(out)
    }

    fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() || !self.bin_dir.is_absolute() {
            bail!("sandbox policy paths must be absolute");
        }
        if self.base_dir == PathBuf::from("/") {
            bail!("refusing to allow writes to /");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_confines_writes_to_base_dir() {
        let policy = SandboxPolicy::from_config(&Config::default());
        let text = policy.render().unwrap();
        let writes: Vec<&str> = text.lines().filter(|l| l.starts_with("allow/write+")).collect();
        assert_eq!(
            writes,
            vec!["allow/write+/var/lib/namada/***", "allow/write+/dev/null", "allow/write+/tmp/***"]
        );
        assert!(text.contains("allow/net/bind+any!26656\n"));
        assert!(text.contains("mem/max:16G\n"));
    }

    #[test]
    fn root_base_dir_is_rejected() {
        let mut policy = SandboxPolicy::from_config(&Config::default());
        policy.base_dir = PathBuf::from("/");
        assert!(policy.validate().is_err());
    }
}
