//! `/etc/fstab` is shared with the rest of the system, so it is edited line-wise
//! instead of rendered whole.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub device: String,
    pub mount_point: String,
    pub fstype: String,
    pub options: String,
}

impl FstabEntry {
    pub fn hardened_shm() -> Self {
        Self {
            device: "tmpfs".to_string(),
            mount_point: "/dev/shm".to_string(),
            fstype: "tmpfs".to_string(),
            options: "defaults,noexec,nodev,nosuid".to_string(),
        }
    }

    fn mount_point_of(line: &str) -> Option<&str> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        line.split_whitespace().nth(1)
    }

    /// Some active line already mounts our mount point.
    pub fn present_in(&self, fstab: &str) -> bool {
        fstab
            .lines()
            .any(|line| Self::mount_point_of(line) == Some(self.mount_point.as_str()))
    }

    pub fn append_to(&self, fstab: &str) -> String {
        let mut out = fstab.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{self}\n"));
        out
    }
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} 0 0",
            self.device, self.mount_point, self.fstype, self.options
        )
    }
}
