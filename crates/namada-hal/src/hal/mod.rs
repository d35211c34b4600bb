//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for host operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod file_ops;
pub mod firewall_ops;
pub mod host_info_ops;
pub mod linux_hal;
pub mod net_ops;
pub mod package_ops;
pub mod process_ops;
pub mod service_ops;
pub mod sysctl_ops;
pub mod user_ops;

pub use fake_hal::{success_output, FakeHal, FakeHost, Operation};
pub use file_ops::FileOps;
pub use firewall_ops::{
    parse_added_rules, parse_ufw_status, FirewallOps, FirewallRule, FirewallStatus, Policy,
    Protocol, RuleAction,
};
pub use host_info_ops::{HostInfoOps, OsReleaseInfo};
pub use linux_hal::LinuxHal;
pub use net_ops::NetOps;
pub use package_ops::PackageOps;
pub use process_ops::{Invocation, Privilege, ProcessOps};
pub use service_ops::{ServiceAction, ServiceOps};
pub use sysctl_ops::{normalize_sysctl_value, SysctlOps};
pub use user_ops::{UserOps, UserSpec};

/// Complete HAL combining all host operation traits.
pub trait SystemHal:
    ProcessOps
    + UserOps
    + FileOps
    + SysctlOps
    + ServiceOps
    + FirewallOps
    + PackageOps
    + HostInfoOps
    + NetOps
    + Send
    + Sync
{
}

/// Automatically implement SystemHal for any type implementing all required traits.
impl<T> SystemHal for T where
    T: ProcessOps
        + UserOps
        + FileOps
        + SysctlOps
        + ServiceOps
        + FirewallOps
        + PackageOps
        + HostInfoOps
        + NetOps
        + Send
        + Sync
{
}
