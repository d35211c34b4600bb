//! Operator account: the human admin login with sudo rights and SSH keys.

use crate::context::ProvisionContext;
use crate::templates::{self, ConfigTemplate, OperatorSudoers};
use anyhow::{bail, Result};
use namada_hal::UserSpec;
use namada_workflow::StepDefinition;
use std::path::PathBuf;

pub const ACCOUNT: &str = "operator-account";
pub const PASSWORD: &str = "operator-password";
pub const SUDOERS: &str = "operator-sudoers";
pub const SSH_KEYS: &str = "operator-ssh-keys";

pub fn steps<'s, 'c>(ctx: &ProvisionContext<'c>) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
    let mut steps = vec![account_step()];
    if ctx.config.operator.set_password {
        steps.push(password_step());
    }
    steps.push(sudoers_step());
    steps.push(ssh_keys_step());
    steps
}

pub fn account_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(ACCOUNT, operator_account_ready, |ctx: &ProvisionContext<'c>, _| {
        ensure_operator_account(ctx)
    })
}

pub fn password_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        PASSWORD,
        |ctx: &ProvisionContext<'c>| Ok(ctx.hal.password_set(&ctx.config.operator.name)?),
        |ctx: &ProvisionContext<'c>, _| {
            if !ctx.interactive {
                bail!(
                    "setting the operator password needs a terminal; \
                     set operator.set_password = false to skip it"
                );
            }
            Ok(ctx.hal.set_password_interactive(&ctx.config.operator.name)?)
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_operator())
}

pub fn sudoers_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        SUDOERS,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &sudoers(ctx)),
        |ctx: &ProvisionContext<'c>, _| templates::write(ctx.hal, &sudoers(ctx)).map(|_| ()),
    )
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_operator())
}

pub fn ssh_keys_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(SSH_KEYS, ssh_keys_ready, |ctx: &ProvisionContext<'c>, _| {
        install_ssh_keys(ctx)
    })
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_operator())
}

pub fn sudoers(ctx: &ProvisionContext<'_>) -> OperatorSudoers {
    OperatorSudoers {
        user: ctx.config.operator.name.clone(),
        nopasswd: ctx.config.operator.sudo_nopasswd,
    }
}

fn operator_account_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let op = &ctx.config.operator;
    if !ctx.hal.user_exists(&op.name)? {
        return Ok(false);
    }
    for group in &op.groups {
        if !ctx.hal.user_in_group(&op.name, group)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The one definition of the operator account. Every workflow that needs the operator goes
/// through here.
pub fn ensure_operator_account(ctx: &ProvisionContext<'_>) -> Result<()> {
    let op = &ctx.config.operator;
    if !ctx.hal.user_exists(&op.name)? {
        let mut spec = UserSpec::login(&op.name, &op.shell);
        spec.groups = op.groups.clone();
        spec.comment = Some("Namada node operator".to_string());
        log::info!("Creating operator account {}", op.name);
        ctx.hal.create_user(&spec)?;
        return Ok(());
    }
    for group in &op.groups {
        if !ctx.hal.user_in_group(&op.name, group)? {
            log::info!("Adding {} to {}", op.name, group);
            ctx.hal.add_user_to_group(&op.name, group)?;
        }
    }
    Ok(())
}

fn key_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn authorized_keys_path(ctx: &ProvisionContext<'_>) -> Result<PathBuf> {
    let name = &ctx.config.operator.name;
    let home = ctx
        .hal
        .home_dir(name)?
        .unwrap_or_else(|| PathBuf::from("/home").join(name));
    Ok(home.join(".ssh").join("authorized_keys"))
}

/// Keys the operator should be able to log in with.
pub fn source_keys(ctx: &ProvisionContext<'_>) -> Result<Vec<String>> {
    let source = &ctx.config.operator.ssh_key_source;
    Ok(ctx
        .hal
        .read_to_string(source)?
        .map(|text| key_lines(&text))
        .unwrap_or_default())
}

/// Whether the operator can already log in with a key.
pub fn operator_has_keys(ctx: &ProvisionContext<'_>) -> Result<bool> {
    if !ctx.hal.user_exists(&ctx.config.operator.name)? {
        return Ok(false);
    }
    let path = authorized_keys_path(ctx)?;
    Ok(ctx
        .hal
        .read_to_string(&path)?
        .map(|text| !key_lines(&text).is_empty())
        .unwrap_or(false))
}

fn ssh_keys_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let wanted = source_keys(ctx)?;
    if wanted.is_empty() {
        log::warn!(
            "No SSH keys found in {}; the operator keeps password login only",
            ctx.config.operator.ssh_key_source.display()
        );
        return Ok(true);
    }
    let path = authorized_keys_path(ctx)?;
    let have = ctx
        .hal
        .read_to_string(&path)?
        .map(|text| key_lines(&text))
        .unwrap_or_default();
    Ok(wanted.iter().all(|k| have.contains(k)) && ctx.owned_by(&path, &ctx.config.operator.name)?)
}

fn install_ssh_keys(ctx: &ProvisionContext<'_>) -> Result<()> {
    let name = &ctx.config.operator.name;
    let path = authorized_keys_path(ctx)?;
    let Some(ssh_dir) = path.parent() else {
        bail!("{} has no parent directory", path.display());
    };
    let existing = ctx.hal.read_to_string(&path)?.unwrap_or_default();
    let have = key_lines(&existing);
    let mut contents = existing.clone();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    for key in source_keys(ctx)? {
        if !have.contains(&key) {
            contents.push_str(&key);
            contents.push('\n');
        }
    }
    if !ctx.exists(ssh_dir)? {
        ctx.hal.create_dir_all(ssh_dir, 0o700)?;
    }
    ctx.hal.write_file(&path, contents.as_bytes(), 0o600)?;
    ctx.hal.chown(ssh_dir, name, name, true)?;
    log::info!("Installed SSH keys for {} at {}", name, path.display());
    Ok(())
}

/// Path of the sudoers drop-in, for the verifier.
pub fn sudoers_path(ctx: &ProvisionContext<'_>) -> PathBuf {
    sudoers(ctx).path()
}
