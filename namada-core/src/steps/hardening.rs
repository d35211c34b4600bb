//! Host hardening: packages, kernel parameters, /dev/shm, fail2ban, firewall, sshd.

use crate::context::{ProvisionContext, PROBE_TIMEOUT};
use crate::steps::operator;
use crate::templates::{
    self, AutoUpgrades, ConfigTemplate, Fail2banJail, FstabEntry, SshdHardening,
    SysctlHardening,
};
use anyhow::{bail, Result};
use namada_hal::{FirewallRule, Invocation, Policy, ServiceAction};
use namada_workflow::StepDefinition;
use std::path::Path;

pub const PACKAGES: &str = "system-packages";
pub const AUTO_UPGRADES: &str = "unattended-upgrades";
pub const SYSCTL: &str = "kernel-hardening";
pub const SHM: &str = "shm-mount-options";
pub const FAIL2BAN: &str = "fail2ban";
pub const FIREWALL: &str = "firewall";
pub const SSHD: &str = "ssh-hardening";

const FSTAB: &str = "/etc/fstab";

pub fn steps<'s, 'c>(ctx: &ProvisionContext<'c>) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
    let hardening = &ctx.config.hardening;
    let mut steps = vec![packages_step()];
    if hardening.unattended_upgrades {
        steps.push(auto_upgrades_step());
    }
    steps.push(sysctl_step());
    if hardening.harden_shm {
        steps.push(shm_step());
    }
    steps.push(fail2ban_step());
    steps.push(firewall_step());
    steps.push(sshd_step());
    steps
}

fn missing_packages(ctx: &ProvisionContext<'_>, wanted: &[String]) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for pkg in wanted {
        if !ctx.hal.package_installed(pkg)? {
            missing.push(pkg.clone());
        }
    }
    Ok(missing)
}

/// Install whatever in `wanted` is missing. Shared with the sandbox build dependencies.
pub fn install_missing(ctx: &ProvisionContext<'_>, wanted: &[String]) -> Result<()> {
    let missing = missing_packages(ctx, wanted)?;
    if missing.is_empty() {
        return Ok(());
    }
    log::info!("Installing packages: {}", missing.join(" "));
    ctx.hal.update_index()?;
    ctx.hal.install_packages(&missing)?;
    Ok(())
}

pub fn packages_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        PACKAGES,
        |ctx: &ProvisionContext<'c>| {
            Ok(missing_packages(ctx, &ctx.config.hardening.packages)?.is_empty())
        },
        |ctx: &ProvisionContext<'c>, _| install_missing(ctx, &ctx.config.hardening.packages),
    )
}

pub fn auto_upgrades_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        AUTO_UPGRADES,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &AutoUpgrades),
        |ctx: &ProvisionContext<'c>, _| templates::write(ctx.hal, &AutoUpgrades).map(|_| ()),
    )
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_package("unattended-upgrades"))
}

fn sysctl_live(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let template = SysctlHardening::from_config(&ctx.config.hardening);
    let mismatched = template.live_mismatches(ctx.hal)?;
    if !mismatched.is_empty() {
        log::debug!("sysctl values not live: {}", mismatched.join(", "));
    }
    Ok(mismatched.is_empty())
}

pub fn sysctl_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        SYSCTL,
        |ctx: &ProvisionContext<'c>| {
            let template = SysctlHardening::from_config(&ctx.config.hardening);
            Ok(templates::is_current(ctx.hal, &template)? && sysctl_live(ctx)?)
        },
        |ctx: &ProvisionContext<'c>, _| {
            let template = SysctlHardening::from_config(&ctx.config.hardening);
            templates::write(ctx.hal, &template)?;
            ctx.hal.reload_sysctl()?;
            Ok(())
        },
    )
}

fn shm_present(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let fstab = ctx.hal.read_to_string(Path::new(FSTAB))?.unwrap_or_default();
    Ok(FstabEntry::hardened_shm().present_in(&fstab))
}

pub fn shm_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(SHM, shm_present, |ctx: &ProvisionContext<'c>, _| {
        let entry = FstabEntry::hardened_shm();
        let fstab = ctx.hal.read_to_string(Path::new(FSTAB))?.unwrap_or_default();
        ctx.hal
            .write_file(Path::new(FSTAB), entry.append_to(&fstab).as_bytes(), 0o644)?;
        let remount = Invocation::new("mount")
            .args(["-o", "remount"])
            .arg(entry.mount_point.clone())
            .timeout(PROBE_TIMEOUT);
        if let Err(err) = ctx.hal.command_status(&remount) {
            log::warn!(
                "Could not remount {} ({err}); new options apply after reboot",
                entry.mount_point
            );
        }
        Ok(())
    })
}

fn fail2ban_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let jail = Fail2banJail::from_config(&ctx.config.hardening);
    Ok(templates::is_current(ctx.hal, &jail)?
        && ctx.hal.unit_enabled("fail2ban")?
        && ctx.hal.unit_active("fail2ban")?)
}

pub fn fail2ban_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(FAIL2BAN, fail2ban_ready, |ctx: &ProvisionContext<'c>, _| {
        let jail = Fail2banJail::from_config(&ctx.config.hardening);
        let changed = templates::write(ctx.hal, &jail)?;
        ctx.hal.service_action("fail2ban", ServiceAction::EnableNow)?;
        if changed {
            ctx.hal.service_action("fail2ban", ServiceAction::Restart)?;
        }
        Ok(())
    })
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_package("fail2ban"))
}

/// SSH is rate limited and listed first so enabling the firewall never drops the session.
pub fn firewall_rules(ctx: &ProvisionContext<'_>) -> Vec<FirewallRule> {
    let hardening = &ctx.config.hardening;
    let mut rules = vec![
        FirewallRule::limit_tcp(hardening.ssh_port, "ssh"),
        FirewallRule::allow_tcp(hardening.p2p_port, "namada p2p"),
    ];
    rules.extend(
        hardening
            .extra_tcp_ports
            .iter()
            .map(|port| FirewallRule::allow_tcp(*port, "namada-setup extra")),
    );
    rules
}

pub fn firewall_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let status = ctx.hal.firewall_status()?;
    if !status.active
        || status.default_incoming.as_deref() != Some("deny")
        || status.default_outgoing.as_deref() != Some("allow")
    {
        return Ok(false);
    }
    let added = ctx.hal.firewall_rules()?;
    Ok(firewall_rules(ctx)
        .iter()
        .all(|rule| added.iter().any(|line| rule.matches_added(line))))
}

pub fn firewall_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(FIREWALL, firewall_ready, |ctx: &ProvisionContext<'c>, _| {
        ctx.hal.set_default_policy(Policy::Deny, Policy::Allow)?;
        let added = ctx.hal.firewall_rules()?;
        for rule in firewall_rules(ctx) {
            if added.iter().any(|line| rule.matches_added(line)) {
                continue;
            }
            log::info!("Adding firewall rule: {rule}");
            ctx.hal.add_rule(&rule)?;
        }
        ctx.hal.enable_firewall()?;
        Ok(())
    })
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_package("ufw"))
}

pub fn sshd_template(ctx: &ProvisionContext<'_>) -> Result<SshdHardening> {
    let has_keys = operator::operator_has_keys(ctx)?;
    Ok(SshdHardening {
        port: ctx.config.hardening.ssh_port,
        allow_users: vec![ctx.config.operator.name.clone()],
        password_authentication: !has_keys,
    })
}

pub fn sshd_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        SSHD,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &sshd_template(ctx)?),
        |ctx: &ProvisionContext<'c>, _| {
            let template = sshd_template(ctx)?;
            if template.password_authentication {
                log::warn!(
                    "{} has no SSH key yet; password authentication stays enabled",
                    ctx.config.operator.name
                );
            }
            let path = template.path();
            let previous = ctx.hal.read_to_string(&path)?;
            templates::write(ctx.hal, &template)?;
            let check = Invocation::new("sshd").arg("-t").timeout(PROBE_TIMEOUT);
            if let Err(err) = ctx.hal.command_status(&check) {
                match previous {
                    Some(text) => {
                        ctx.hal.write_file(&path, text.as_bytes(), template.mode())?;
                        bail!("sshd rejected the hardened configuration, previous drop-in restored: {err}");
                    }
                    None => {
                        ctx.hal.remove_file(&path)?;
                        bail!("sshd rejected the hardened configuration, drop-in removed: {err}");
                    }
                }
            }
            ctx.hal
                .service_action(&ctx.config.hardening.ssh_unit, ServiceAction::Restart)?;
            Ok(())
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_operator())
}
