use super::{ConfigTemplate, MANAGED_HEADER};
use anyhow::Result;
use std::path::PathBuf;

/// Daily package list refresh and unattended security upgrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoUpgrades;

impl ConfigTemplate for AutoUpgrades {
    fn path(&self) -> PathBuf {
        PathBuf::from("/etc/apt/apt.conf.d/20auto-upgrades")
    }

    fn render(&self) -> Result<String> {
        Ok(format!(
            "{}APT::Periodic::Update-Package-Lists \"1\";\n\
             APT::Periodic::Unattended-Upgrade \"1\";\n\
             APT::Periodic::AutocleanInterval \"7\";\n",
            MANAGED_HEADER.replace('#', "//")
        ))
    }
}
