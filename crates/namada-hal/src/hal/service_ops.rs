//! Service manager (systemd) operations.

use crate::HalResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
    /// `enable --now`
    EnableNow,
}

impl ServiceAction {
    pub fn systemctl_args(self) -> &'static [&'static str] {
        match self {
            ServiceAction::Start => &["start"],
            ServiceAction::Stop => &["stop"],
            ServiceAction::Restart => &["restart"],
            ServiceAction::Enable => &["enable"],
            ServiceAction::EnableNow => &["enable", "--now"],
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.systemctl_args().join(" "))
    }
}

pub trait ServiceOps {
    fn unit_active(&self, unit: &str) -> HalResult<bool>;
    fn unit_enabled(&self, unit: &str) -> HalResult<bool>;
    fn daemon_reload(&self) -> HalResult<()>;
    fn service_action(&self, unit: &str, action: ServiceAction) -> HalResult<()>;
    /// `systemctl status` text (non-zero exits still return the text).
    fn unit_status(&self, unit: &str) -> HalResult<String>;
    /// Stream the unit's journal to stdout.
    fn journal(&self, unit: &str, lines: u32, follow: bool) -> HalResult<()>;
}
