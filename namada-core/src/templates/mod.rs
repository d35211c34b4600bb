//! Typed configuration files.
//!
//! Every file namada-setup owns is a struct implementing [`ConfigTemplate`]; [`write`] is the
//! only place they reach the disk.

mod apt;
mod build_env;
mod fail2ban;
mod fstab;
mod sandbox;
mod sshd;
mod sudoers;
mod sysctl;
mod systemd;

pub use apt::AutoUpgrades;
pub use build_env::{BuildEnvFile, CargoConfig};
pub use fail2ban::Fail2banJail;
pub use fstab::FstabEntry;
pub use sandbox::SandboxPolicy;
pub use sshd::SshdHardening;
pub use sudoers::OperatorSudoers;
pub use sysctl::SysctlHardening;
pub use systemd::NodeUnit;

use anyhow::{anyhow, Context, Result};
use namada_hal::{Invocation, SystemHal};
use std::path::{Path, PathBuf};

pub const MANAGED_HEADER: &str = "# Managed by namada-setup. Local edits are overwritten.\n";

pub trait ConfigTemplate {
    fn path(&self) -> PathBuf;

    fn mode(&self) -> u32 {
        0o644
    }

    /// `(user, group)` applied after writing; root-owned when `None`.
    fn owner(&self) -> Option<(String, String)> {
        None
    }

    fn render(&self) -> Result<String>;

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Syntax check run against the staged copy before it replaces the live file.
    fn check_command(&self, _staged: &Path) -> Option<Invocation> {
        None
    }
}

/// `true` when the live file already has the rendered content and owner.
pub fn is_current(hal: &dyn SystemHal, template: &dyn ConfigTemplate) -> Result<bool> {
    let path = template.path();
    let rendered = template.render()?;
    if hal.read_to_string(&path)?.as_deref() != Some(rendered.as_str()) {
        return Ok(false);
    }
    match template.owner() {
        Some((user, _)) => Ok(hal.owner(&path)?.as_deref() == Some(user.as_str())),
        None => Ok(true),
    }
}

fn staged_path(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
    Ok(parent.join(format!(".{}.staged", name.to_string_lossy())))
}

/// Validate, compare and write. Returns `false` when the file was already current.
pub fn write(hal: &dyn SystemHal, template: &dyn ConfigTemplate) -> Result<bool> {
    template.validate()?;
    let path = template.path();
    if is_current(hal, template)? {
        log::info!("{} already up to date", path.display());
        return Ok(false);
    }
    let contents = template.render()?;
    if let Some(parent) = path.parent() {
        if !hal.path_exists(parent)? {
            hal.create_dir_all(parent, 0o755)?;
        }
    }

    let staged = staged_path(&path)?;
    match template.check_command(&staged) {
        Some(check) => {
            hal.write_file(&staged, contents.as_bytes(), template.mode())?;
            if let Err(err) = hal.command_status(&check) {
                let _ = hal.remove_file(&staged);
                return Err(anyhow::Error::new(err)
                    .context(format!("{} rejected by {}", path.display(), check.program)));
            }
            hal.rename(&staged, &path)
                .with_context(|| format!("Failed to install {}", path.display()))?;
        }
        None => hal
            .write_file(&path, contents.as_bytes(), template.mode())
            .with_context(|| format!("Failed to write {}", path.display()))?,
    }

    if let Some((user, group)) = template.owner() {
        hal.chown(&path, &user, &group, false)?;
    }
    log::info!("Wrote {}", path.display());
    Ok(true)
}
