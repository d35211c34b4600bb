//! Package manager (apt) operations.

use crate::process_ops::Invocation;
use crate::HalResult;

pub trait PackageOps {
    fn package_installed(&self, name: &str) -> HalResult<bool>;
    fn update_index(&self) -> HalResult<()>;
    fn install_packages(&self, pkgs: &[String]) -> HalResult<()>;
}

pub fn install_invocation(pkgs: &[String]) -> Invocation {
    Invocation::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .args(["install", "-y", "--no-install-recommends"])
        .args(pkgs.iter().cloned())
        .streaming()
}

pub fn update_invocation() -> Invocation {
    Invocation::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .arg("update")
        .streaming()
}

/// `dpkg-query -W -f='${Status}'` prints `install ok installed` for installed packages.
pub fn status_is_installed(status: &str) -> bool {
    status.trim() == "install ok installed"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_command_includes_packages() {
        let inv = install_invocation(&["ufw".to_string(), "fail2ban".to_string()]);
        assert_eq!(inv.program, "apt-get");
        assert_eq!(
            inv.args,
            vec!["install", "-y", "--no-install-recommends", "ufw", "fail2ban"]
        );
        assert!(inv
            .env
            .contains(&("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())));
    }

    #[test]
    fn update_command_is_expected() {
        assert_eq!(update_invocation().args, vec!["update"]);
    }

    #[test]
    fn dpkg_status_parsing() {
        assert!(status_is_installed("install ok installed"));
        assert!(!status_is_installed("deinstall ok config-files"));
        assert!(!status_is_installed(""));
    }
}
