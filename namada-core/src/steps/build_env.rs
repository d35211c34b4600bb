//! Isolated Rust toolchain owned by the operator.
//!
//! `CARGO_HOME` and `RUSTUP_HOME` live under the build root and are passed to every
//! invocation explicitly.

use crate::context::ProvisionContext;
use crate::download::VerifiedDownload;
use crate::templates::{self, BuildEnvFile, CargoConfig};
use anyhow::{bail, Context, Result};
use namada_hal::{Invocation, Privilege};
use namada_workflow::StepDefinition;
use std::path::PathBuf;

pub const DIRS: &str = "build-env-dirs";
pub const ENV_FILE: &str = "build-env-file";
pub const RUSTUP: &str = "rustup-installer";
pub const TOOLCHAIN: &str = "rust-toolchain";
pub const CARGO_CONFIG: &str = "cargo-config";

pub fn steps<'s, 'c>(ctx: &ProvisionContext<'c>) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
    let operator = Privilege::user(ctx.config.operator.name.clone());
    vec![
        dirs_step(),
        env_file_step(),
        rustup_step(),
        toolchain_step().run_as(operator),
        cargo_config_step(),
    ]
}

fn installer_path(ctx: &ProvisionContext<'_>) -> PathBuf {
    ctx.build_env.downloads.join("rustup-init")
}

/// Build invocation as `privilege` with the build environment applied.
pub fn build_command(
    ctx: &ProvisionContext<'_>,
    program: impl Into<String>,
    privilege: &Privilege,
) -> Invocation {
    Invocation::new(program)
        .envs(ctx.build_env.vars())
        .privilege(privilege.clone())
}

/// Cargo and rustup are present for the operator.
pub fn toolchain_present(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let env = &ctx.build_env;
    Ok(ctx.executable(&env.cargo_bin("cargo"))? && ctx.executable(&env.cargo_bin("rustup"))?)
}

pub fn require_toolchain(ctx: &ProvisionContext<'_>) -> Result<()> {
    if !toolchain_present(ctx)? {
        bail!("no Rust toolchain under {}; run `namada-setup build-env` first", ctx.build_env.root.display());
    }
    Ok(())
}

fn dirs_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let owner = &ctx.config.operator.name;
    for dir in ctx.build_env.dirs() {
        if !ctx.exists(dir)? || !ctx.owned_by(dir, owner)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn dirs_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(DIRS, dirs_ready, |ctx: &ProvisionContext<'c>, _| {
        let owner = &ctx.config.operator.name;
        for dir in ctx.build_env.dirs() {
            ctx.hal.create_dir_all(dir, 0o755)?;
        }
        ctx.hal.chown(&ctx.build_env.root, owner, owner, true)?;
        Ok(())
    })
    .requires(|ctx: &ProvisionContext<'c>| ctx.require_operator())
}

fn env_file(ctx: &ProvisionContext<'_>) -> BuildEnvFile {
    BuildEnvFile {
        env: ctx.build_env.clone(),
        owner: ctx.config.operator.name.clone(),
    }
}

pub fn env_file_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        ENV_FILE,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &env_file(ctx)),
        |ctx: &ProvisionContext<'c>, _| templates::write(ctx.hal, &env_file(ctx)).map(|_| ()),
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.build_env.root, "run the build-env-dirs step first")
    })
}

pub fn rustup_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        RUSTUP,
        |ctx: &ProvisionContext<'c>| Ok(ctx.exists(&installer_path(ctx))? || toolchain_present(ctx)?),
        |ctx: &ProvisionContext<'c>, _| {
            let download = VerifiedDownload::rustup_init(&ctx.config.build_env.rustup_dist_server)?;
            let body = download.fetch(ctx.hal)?;
            let path = installer_path(ctx);
            let owner = &ctx.config.operator.name;
            ctx.hal.write_file(&path, &body, 0o755)?;
            ctx.hal.chown(&path, owner, owner, false)?;
            Ok(())
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.build_env.downloads, "run the build-env-dirs step first")
    })
}

fn toolchain_ready(ctx: &ProvisionContext<'_>) -> Result<bool> {
    if !toolchain_present(ctx)? {
        return Ok(false);
    }
    let operator = Privilege::user(ctx.config.operator.name.clone());
    let probe = build_command(ctx, ctx.build_env.cargo_bin("rustup").display().to_string(), &operator)
        .args(["which", "--toolchain", ctx.config.build_env.toolchain.as_str(), "cargo"]);
    Ok(ctx.probe(probe)?.is_some())
}

pub fn toolchain_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(TOOLCHAIN, toolchain_ready, |ctx: &ProvisionContext<'c>, privilege| {
        let cfg = &ctx.config.build_env;
        let rustup = ctx.build_env.cargo_bin("rustup");
        if ctx.executable(&rustup)? {
            let rustup = rustup.display().to_string();
            ctx.run(
                build_command(ctx, rustup.clone(), privilege)
                    .args(["toolchain", "install", cfg.toolchain.as_str(), "--profile", cfg.profile.as_str()])
                    .cwd(&ctx.build_env.root)
                    .streaming(),
            )?;
            return ctx.run(
                build_command(ctx, rustup, privilege)
                    .args(["default", cfg.toolchain.as_str()])
                    .cwd(&ctx.build_env.root),
            );
        }
        ctx.run(
            build_command(ctx, installer_path(ctx).display().to_string(), privilege)
                .args([
                    "-y",
                    "--no-modify-path",
                    "--profile",
                    cfg.profile.as_str(),
                    "--default-toolchain",
                    cfg.toolchain.as_str(),
                ])
                .cwd(&ctx.build_env.root)
                .streaming(),
        )
        .context("rustup-init failed")
    })
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_operator()?;
        if ctx.executable(&installer_path(ctx))? || ctx.executable(&ctx.build_env.cargo_bin("rustup"))? {
            return Ok(());
        }
        bail!("{} is missing; run the rustup-installer step first", installer_path(ctx).display())
    })
}

fn cargo_config(ctx: &ProvisionContext<'_>) -> CargoConfig {
    CargoConfig {
        env: ctx.build_env.clone(),
        owner: ctx.config.operator.name.clone(),
        jobs: ctx.config.build_env.cargo_jobs,
    }
}

pub fn cargo_config_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        CARGO_CONFIG,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &cargo_config(ctx)),
        |ctx: &ProvisionContext<'c>, _| templates::write(ctx.hal, &cargo_config(ctx)).map(|_| ()),
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.build_env.cargo_home, "run the build-env-dirs step first")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::download::{sha256_hex, VerifiedDownload};
    use namada_hal::{success_output, FakeHal, Operation};
    use namada_workflow::{StepStatus, Workflow, WorkflowEngine};

    fn host() -> FakeHal {
        let hal = FakeHal::ubuntu();
        hal.with_host(|h| h.add_user("operator", "/home/operator"));
        let download = VerifiedDownload::rustup_init("https://static.rust-lang.org").unwrap();
        hal.serve_download(&download.url, b"rustup-init binary".to_vec());
        hal.serve_download(
            &download.checksum_url,
            format!("{}  rustup-init\n", sha256_hex(b"rustup-init binary")),
        );
        hal.on_command("/opt/namada-build/downloads/rustup-init", |inv, host| {
            assert!(inv.env.iter().any(|(k, v)| k == "CARGO_HOME" && v == "/opt/namada-build/cargo"));
            host.add_executable("/opt/namada-build/cargo/bin/cargo");
            host.add_executable("/opt/namada-build/cargo/bin/rustup");
            Ok(success_output(Vec::new()))
        });
        hal
    }

    #[test]
    fn toolchain_installs_as_operator_with_explicit_env() {
        let hal = host();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("build-env").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert!(report.succeeded(), "{report}");

        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { program, privilege, .. }
                if program.ends_with("rustup-init") && *privilege == Privilege::user("operator")
        )));
        let host = hal.host();
        assert!(host.file_text("/opt/namada-build/cargo/config.toml").is_some());
        assert_eq!(host.dirs[&PathBuf::from("/opt/namada-build/src")].owner, "operator");
    }

    #[test]
    fn rerun_does_not_download_again() {
        let hal = host();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("build-env").extend(steps(&ctx));
        assert!(WorkflowEngine::new(false).run(&workflow, &ctx).succeeded());

        hal.clear_operations();
        let second = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(second.skipped().len(), workflow.step_names().len());
        assert!(!hal.has_operation(|op| matches!(op, Operation::Fetch { .. })));
    }

    #[test]
    fn unreachable_network_fails_the_installer_step() {
        let hal = host();
        hal.set_offline(true);
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("build-env").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.status_of(RUSTUP), Some(StepStatus::Failed));
        assert_eq!(report.not_run(), vec![TOOLCHAIN, CARGO_CONFIG]);
    }
}
