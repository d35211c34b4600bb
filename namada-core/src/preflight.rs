use crate::errors::SetupError;
use crate::steps::WorkflowKind;
use anyhow::{anyhow, Result};
use namada_hal::SystemHal;

pub const SUPPORTED_RELEASES: &[&str] = &["22.04", "24.04"];

#[derive(Debug, Clone)]
pub struct PreflightConfig {
    pub require_root: bool,
    pub required_binaries: Vec<String>,
}

impl PreflightConfig {
    /// Dry runs only read host state, so they may run unprivileged.
    pub fn for_workflow(kind: WorkflowKind, dry_run: bool) -> Self {
        Self {
            require_root: !dry_run,
            required_binaries: kind
                .required_binaries()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

pub fn run(hal: &dyn SystemHal, cfg: &PreflightConfig) -> Result<()> {
    log::info!("🧪 Preflight checks");
    check_os_release(hal)?;
    check_root(hal, cfg)?;
    check_binaries(hal, cfg)?;
    log::info!("✅ Preflight complete");
    Ok(())
}

fn check_os_release(hal: &dyn SystemHal) -> Result<()> {
    let info = hal.os_release()?;
    let id = info
        .id
        .as_deref()
        .ok_or_else(|| anyhow!("/etc/os-release has no ID"))?;
    if id != "ubuntu" {
        let name = info.pretty_name.clone().unwrap_or_else(|| id.to_string());
        return Err(SetupError::UnsupportedOs(name).into());
    }
    match info.version_id.as_deref() {
        Some(version) if SUPPORTED_RELEASES.contains(&version) => {}
        other => log::warn!(
            "Ubuntu {} is untested; supported releases: {}",
            other.unwrap_or("unknown"),
            SUPPORTED_RELEASES.join(", ")
        ),
    }
    Ok(())
}

fn check_root(hal: &dyn SystemHal, cfg: &PreflightConfig) -> Result<()> {
    if hal.effective_uid() == 0 {
        return Ok(());
    }
    if cfg.require_root {
        return Err(SetupError::NotRoot.into());
    }
    log::warn!("Not running as root; some probes may report less than they should");
    Ok(())
}

fn check_binaries(hal: &dyn SystemHal, cfg: &PreflightConfig) -> Result<()> {
    let mut missing = Vec::new();
    for bin in &cfg.required_binaries {
        if hal.find_binary(bin)?.is_none() {
            missing.push(bin.clone());
        }
    }
    if !missing.is_empty() {
        return Err(SetupError::MissingBinary(missing.join(", ")).into());
    }
    Ok(())
}
