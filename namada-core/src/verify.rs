//! The post-provisioning checklist.
//!
//! Independent of per-step verification; every check runs, failures are only reported.

use crate::context::ProvisionContext;
use crate::steps::{hardening, operator};
use crate::templates::{ConfigTemplate, SandboxPolicy, SysctlHardening};
use namada_workflow::{Check, Verifier, VerifyReport};

pub const SERVICE_ACTIVE: &str = "node service active";
pub const SERVICE_ENABLED: &str = "node service enabled";
pub const FIREWALL_ACTIVE: &str = "firewall active";
pub const FAIL2BAN_ACTIVE: &str = "fail2ban active";
pub const SSHD_HARDENED: &str = "sshd hardening present";
pub const SYSCTL_LIVE: &str = "sysctl hardening live";
pub const SUDOERS_PRESENT: &str = "operator sudoers present";
pub const NAMADA_PRESENT: &str = "namada binary present";
pub const COMETBFT_PRESENT: &str = "cometbft binary present";
pub const SANDBOX_PRESENT: &str = "syd binary present";
pub const POLICY_PRESENT: &str = "sandbox policy present";
pub const CARGO_PRESENT: &str = "cargo present";

pub fn checklist<'v, 'c>() -> Verifier<'v, ProvisionContext<'c>> {
    Verifier::new(vec![
        Check::new(SERVICE_ACTIVE, |ctx: &ProvisionContext<'c>| {
            Ok(ctx.hal.unit_active(&ctx.config.node.service_name)?)
        }),
        Check::new(SERVICE_ENABLED, |ctx: &ProvisionContext<'c>| {
            Ok(ctx.hal.unit_enabled(&ctx.config.node.service_name)?)
        }),
        Check::new(FIREWALL_ACTIVE, |ctx: &ProvisionContext<'c>| {
            Ok(ctx.hal.firewall_status()?.active)
        }),
        Check::new(FAIL2BAN_ACTIVE, |ctx: &ProvisionContext<'c>| {
            Ok(ctx.hal.unit_active("fail2ban")?)
        }),
        Check::new(SSHD_HARDENED, |ctx: &ProvisionContext<'c>| {
            let path = hardening::sshd_template(ctx)?.path();
            Ok(ctx
                .hal
                .read_to_string(&path)?
                .map(|text| text.contains("PermitRootLogin no"))
                .unwrap_or(false))
        }),
        Check::new(SYSCTL_LIVE, |ctx: &ProvisionContext<'c>| {
            let template = SysctlHardening::from_config(&ctx.config.hardening);
            let mismatched = template.live_mismatches(ctx.hal)?;
            if !mismatched.is_empty() {
                log::warn!("sysctl values not live: {}", mismatched.join(", "));
            }
            Ok(mismatched.is_empty())
        }),
        Check::new(SUDOERS_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.exists(&operator::sudoers_path(ctx))
        }),
        Check::new(NAMADA_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.executable(&ctx.config.node.binary("namada"))
        }),
        Check::new(COMETBFT_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.executable(&ctx.config.node.binary("cometbft"))
        }),
        Check::new(SANDBOX_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.executable(&ctx.config.sandbox.binary_path)
        }),
        Check::new(POLICY_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.exists(&SandboxPolicy::from_config(ctx.config).path())
        }),
        Check::new(CARGO_PRESENT, |ctx: &ProvisionContext<'c>| {
            ctx.executable(&ctx.build_env.cargo_bin("cargo"))
        }),
    ])
}

pub fn run(ctx: &ProvisionContext<'_>) -> VerifyReport {
    checklist().run(ctx)
}
