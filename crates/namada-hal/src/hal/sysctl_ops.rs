//! Kernel parameter access.

use crate::HalResult;

pub trait SysctlOps {
    /// Live value of `key` (e.g. `net.ipv4.tcp_syncookies`). Unknown key is `Ok(None)`.
    fn sysctl_value(&self, key: &str) -> HalResult<Option<String>>;
    /// Load every drop-in (`sysctl --system`).
    fn reload_sysctl(&self) -> HalResult<()>;
}

/// Collapse whitespace so tab-separated multi-values compare equal to their config form.
pub fn normalize_sysctl_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tabs() {
        assert_eq!(normalize_sysctl_value("4096\t87380\t6291456\n"), "4096 87380 6291456");
        assert_eq!(normalize_sysctl_value(" 1 "), "1");
    }
}
