use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::HardeningConfig;
use anyhow::{bail, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail2banJail {
    pub ssh_port: u16,
    pub maxretry: u32,
    pub bantime: String,
    pub findtime: String,
}

impl Fail2banJail {
    pub fn from_config(config: &HardeningConfig) -> Self {
        Self {
            ssh_port: config.ssh_port,
            maxretry: config.fail2ban_maxretry,
            bantime: config.fail2ban_bantime.clone(),
            findtime: config.fail2ban_findtime.clone(),
        }
    }
}

impl ConfigTemplate for Fail2banJail {
    fn path(&self) -> PathBuf {
        PathBuf::from("/etc/fail2ban/jail.local")
    }

    fn render(&self) -> Result<String> {
        Ok(format!(
            "{MANAGED_HEADER}[DEFAULT]\n\
             bantime = {}\n\
             findtime = {}\n\
             maxretry = {}\n\
             backend = systemd\n\
             banaction = ufw\n\
             \n\
             [sshd]\n\
             enabled = true\n\
             port = {}\n",
            self.bantime, self.findtime, self.maxretry, self.ssh_port
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.maxretry == 0 {
            bail!("fail2ban maxretry must be at least 1");
        }
        for value in [&self.bantime, &self.findtime] {
            if value.is_empty() || value.contains(char::is_whitespace) {
                bail!("invalid fail2ban duration {value:?}");
            }
        }
        Ok(())
    }
}
