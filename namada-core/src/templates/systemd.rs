use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::Config;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// The node's systemd unit; the ledger runs under the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUnit {
    pub path: PathBuf,
    pub user: String,
    pub working_dir: PathBuf,
    pub environment: Vec<(String, String)>,
    pub exec_start: Vec<String>,
}

impl NodeUnit {
    pub fn from_config(config: &Config) -> Self {
        let node = &config.node;
        let exec_start = vec![
            config.sandbox.binary_path.display().to_string(),
            "-P".to_string(),
            config.sandbox.policy_path.display().to_string(),
            "--".to_string(),
            node.binary("namada").display().to_string(),
            "--base-dir".to_string(),
            node.base_dir.display().to_string(),
            "node".to_string(),
            "ledger".to_string(),
            "run".to_string(),
        ];
        let environment = vec![
            ("NAMADA_LOG".to_string(), node.log_level.clone()),
            ("CMT_LOG_LEVEL".to_string(), node.cometbft_log_level.clone()),
            ("NAMADA_CMT_STDOUT".to_string(), "true".to_string()),
            (
                "PATH".to_string(),
                format!("{}:/usr/bin:/bin", node.bin_dir.display()),
            ),
        ];
        Self {
            path: node.unit_path(),
            user: node.user.clone(),
            working_dir: node.base_dir.clone(),
            environment,
            exec_start,
        }
    }
}

impl ConfigTemplate for NodeUnit {
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn render(&self) -> Result<String> {
        let mut out = MANAGED_HEADER.to_string();
        out.push_str("[Unit]\n");
        out.push_str("Description=Namada ledger node (sandboxed)\n");
        out.push_str("After=network-online.target\n");
        out.push_str("Wants=network-online.target\n\n");
        out.push_str("[Service]\n");
        out.push_str("Type=simple\n");
        out.push_str(&format!("User={0}\nGroup={0}\n", self.user));
        out.push_str(&format!(
            "WorkingDirectory={}\n",
            self.working_dir.display()
        ));
        for (key, value) in &self.environment {
            out.push_str(&format!("Environment=\"{key}={value}\"\n"));
        }
        out.push_str(&format!("ExecStart={}\n", self.exec_start.join(" ")));
        out.push_str("Restart=on-failure\n");
        out.push_str("RestartSec=10\n");
        out.push_str("TimeoutStopSec=120\n");
        out.push_str("LimitNOFILE=65535\n");
        out.push_str("ProtectSystem=full\n");
        out.push_str("PrivateTmp=true\n\n");
        out.push_str("[Install]\n");
        out.push_str("WantedBy=multi-user.target\n");
        Ok(out)
    }

    fn validate(&self) -> Result<()> {
        match self.exec_start.first() {
            Some(program) if program.starts_with('/') => {}
            _ => bail!("ExecStart must start with an absolute path"),
        }
        if let Some((key, _)) = self
            .environment
            .iter()
            .find(|(k, v)| k.contains('=') || v.contains(['"', '\n']))
        {
            bail!("unit environment entry {key} cannot be quoted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_is_wrapped_by_sandbox() {
        let unit = NodeUnit::from_config(&Config::default());
        assert_eq!(unit.path, PathBuf::from("/etc/systemd/system/namada.service"));
        let text = unit.render().unwrap();
        assert!(text.contains(
            "ExecStart=/usr/local/bin/syd -P /etc/namada/namada.syd-3 -- /usr/local/bin/namada --base-dir /var/lib/namada node ledger run\n"
        ));
        assert!(text.contains("User=namada\n"));
        assert!(text.contains("Environment=\"CMT_LOG_LEVEL=p2p:none,pex:error\"\n"));
        assert!(text.contains("WantedBy=multi-user.target\n"));
    }
}
