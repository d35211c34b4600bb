//! Host information (read-only).

use crate::HalResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsReleaseInfo {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub version_codename: Option<String>,
    pub pretty_name: Option<String>,
}

pub trait HostInfoOps {
    fn os_release(&self) -> HalResult<OsReleaseInfo>;
    fn effective_uid(&self) -> u32;
}
