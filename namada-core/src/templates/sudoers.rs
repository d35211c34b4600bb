use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::valid_username;
use anyhow::{bail, Result};
use namada_hal::Invocation;
use std::path::{Path, PathBuf};

/// `/etc/sudoers.d/90-namada-<user>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSudoers {
    pub user: String,
    pub nopasswd: bool,
}

impl ConfigTemplate for OperatorSudoers {
    fn path(&self) -> PathBuf {
        PathBuf::from(format!("/etc/sudoers.d/90-namada-{}", self.user))
    }

    fn mode(&self) -> u32 {
        0o440
    }

    fn render(&self) -> Result<String> {
        let rule = if self.nopasswd { "NOPASSWD: ALL" } else { "ALL" };
        Ok(format!("{MANAGED_HEADER}{} ALL=(ALL:ALL) {rule}\n", self.user))
    }

    fn validate(&self) -> Result<()> {
        if !valid_username(&self.user) {
            bail!("refusing to write sudoers rule for {:?}", self.user);
        }
        Ok(())
    }

    fn check_command(&self, staged: &Path) -> Option<Invocation> {
        Some(
            Invocation::new("visudo")
                .arg("-cf")
                .arg(staged.display().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::write;
    use namada_hal::FakeHal;

    #[test]
    fn renders_single_rule() {
        let t = OperatorSudoers { user: "operator".into(), nopasswd: false };
        let text = t.render().unwrap();
        assert!(text.ends_with("operator ALL=(ALL:ALL) ALL\n"));
        assert_eq!(text.lines().filter(|l| l.contains("ALL=")).count(), 1);
    }

    #[test]
    fn visudo_rejection_blocks_install() {
        let hal = FakeHal::ubuntu();
        hal.fail_command("visudo");
        let t = OperatorSudoers { user: "operator".into(), nopasswd: true };
        assert!(write(&hal, &t).is_err());
        assert!(hal.host().file_text(t.path()).is_none());
    }

    #[test]
    fn installed_with_restrictive_mode() {
        let hal = FakeHal::ubuntu();
        let t = OperatorSudoers { user: "operator".into(), nopasswd: false };
        write(&hal, &t).unwrap();
        assert_eq!(hal.host().files[&t.path()].mode, 0o440);
        assert!(hal
            .commands()
            .contains(&"visudo -cf /etc/sudoers.d/.90-namada-operator.staged".to_string()));
    }
}
