use crate::config::{BuildEnv, Config};
use crate::errors::SetupError;
use anyhow::{bail, Context, Result};
use namada_hal::{Invocation, SystemHal};
use std::path::Path;
use std::time::Duration;

/// Probes are quick read-only commands; a hung probe should not hang the run.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a step needs: the host and the effective configuration.
pub struct ProvisionContext<'a> {
    pub hal: &'a dyn SystemHal,
    pub config: &'a Config,
    pub build_env: BuildEnv,
    /// A terminal is attached (password prompts are possible).
    pub interactive: bool,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(hal: &'a dyn SystemHal, config: &'a Config) -> Self {
        Self {
            hal,
            config,
            build_env: config.build_env.layout(),
            interactive: false,
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Run a mutating command, requiring exit status zero.
    pub fn run(&self, inv: Invocation) -> Result<()> {
        log::info!("Running: {}", inv.display());
        self.hal
            .command_status(&inv)
            .with_context(|| format!("`{}` failed", inv.display()))
    }

    /// Run a read-only probe; `None` when it exits non-zero.
    pub fn probe(&self, inv: Invocation) -> Result<Option<String>> {
        let inv = if inv.timeout.is_none() {
            inv.timeout(PROBE_TIMEOUT)
        } else {
            inv
        };
        Ok(self.hal.command_stdout(&inv)?)
    }

    pub fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.hal.path_exists(path)?)
    }

    pub fn executable(&self, path: &Path) -> Result<bool> {
        Ok(self.hal.find_binary(&path.display().to_string())?.is_some())
    }

    pub fn owned_by(&self, path: &Path, user: &str) -> Result<bool> {
        Ok(self.hal.owner(path)?.as_deref() == Some(user))
    }

    pub fn require_user(&self, user: &str, hint: &str) -> Result<()> {
        if !self.hal.user_exists(user)? {
            bail!("user '{user}' does not exist; {hint}");
        }
        Ok(())
    }

    pub fn require_operator(&self) -> Result<()> {
        self.require_user(
            &self.config.operator.name,
            "run `namada-setup operator` first",
        )
    }

    pub fn require_file(&self, path: &Path, hint: &str) -> Result<()> {
        if !self.exists(path)? {
            bail!("{} is missing; {hint}", path.display());
        }
        Ok(())
    }

    pub fn require_binary(&self, name: &str) -> Result<()> {
        if self.hal.find_binary(name)?.is_none() {
            return Err(SetupError::MissingBinary(name.to_string()).into());
        }
        Ok(())
    }

    pub fn require_package(&self, name: &str) -> Result<()> {
        if !self.hal.package_installed(name)? {
            bail!("package {name} is not installed; run `namada-setup harden` first");
        }
        Ok(())
    }
}
