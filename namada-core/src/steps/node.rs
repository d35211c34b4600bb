//! The Namada node: service account, binaries, chain data and the sandboxed systemd unit.

use crate::context::ProvisionContext;
use crate::download::VerifiedDownload;
use crate::steps::build_env::{build_command, require_toolchain};
use crate::steps::sandbox::reports_version;
use crate::templates::{self, ConfigTemplate, NodeUnit, SandboxPolicy};
use anyhow::{bail, Context, Result};
use namada_hal::{Invocation, Privilege, ServiceAction, UserSpec};
use namada_workflow::StepDefinition;
use std::path::PathBuf;

pub const ACCOUNT: &str = "node-account";
pub const DATA_DIR: &str = "node-data-dir";
pub const COMETBFT: &str = "cometbft";
pub const SOURCE: &str = "node-source";
pub const BUILD: &str = "node-build";
pub const INSTALL: &str = "node-binaries";
pub const JOIN: &str = "node-join-network";
pub const UNIT: &str = "node-unit";
pub const SERVICE: &str = "node-service";

pub fn steps<'s, 'c>(ctx: &ProvisionContext<'c>) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
    let operator = Privilege::user(ctx.config.operator.name.clone());
    let node_user = Privilege::user(ctx.config.node.user.clone());
    vec![
        account_step(),
        data_dir_step(),
        cometbft_step(),
        source_step().run_as(operator.clone()),
        build_step().run_as(operator),
        install_step(),
        join_step().run_as(node_user),
        unit_step(),
        service_step(),
    ]
}

fn source_dir(ctx: &ProvisionContext<'_>) -> PathBuf {
    ctx.build_env.src.join("namada")
}

fn built_binary(ctx: &ProvisionContext<'_>, name: &str) -> PathBuf {
    source_dir(ctx).join("target").join("release").join(name)
}

/// Every configured binary exists in `dir_of(name)` and `namada --version` matches the tag.
fn binaries_match(
    ctx: &ProvisionContext<'_>,
    dir_of: impl Fn(&str) -> PathBuf,
) -> Result<bool> {
    let node = &ctx.config.node;
    for name in &node.binaries {
        if !ctx.executable(&dir_of(name.as_str()))? {
            return Ok(false);
        }
    }
    reports_version(ctx, &dir_of("namada"), &["--version"], Some(node.version()))
}

fn installed_match(ctx: &ProvisionContext<'_>) -> Result<bool> {
    binaries_match(ctx, |name| ctx.config.node.binary(name))
}

fn built_match(ctx: &ProvisionContext<'_>) -> Result<bool> {
    binaries_match(ctx, |name| built_binary(ctx, name))
}

pub fn account_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        ACCOUNT,
        |ctx: &ProvisionContext<'c>| Ok(ctx.hal.user_exists(&ctx.config.node.user)?),
        |ctx: &ProvisionContext<'c>, _| {
            let node = &ctx.config.node;
            let mut spec = UserSpec::system(&node.user, &node.base_dir);
            spec.comment = Some("Namada node".to_string());
            ctx.hal.create_user(&spec)?;
            Ok(())
        },
    )
}

pub fn data_dir_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        DATA_DIR,
        |ctx: &ProvisionContext<'c>| {
            let node = &ctx.config.node;
            Ok(ctx.exists(&node.base_dir)? && ctx.owned_by(&node.base_dir, &node.user)?)
        },
        |ctx: &ProvisionContext<'c>, _| {
            let node = &ctx.config.node;
            ctx.hal.create_dir_all(&node.base_dir, 0o750)?;
            ctx.hal.chown(&node.base_dir, &node.user, &node.user, false)?;
            Ok(())
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_user(&ctx.config.node.user, "run the node-account step first")
    })
}

fn cometbft_path(ctx: &ProvisionContext<'_>) -> PathBuf {
    ctx.config.node.binary("cometbft")
}

pub fn cometbft_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        COMETBFT,
        |ctx: &ProvisionContext<'c>| {
            reports_version(
                ctx,
                &cometbft_path(ctx),
                &["version"],
                Some(ctx.config.node.cometbft_version.as_str()),
            )
        },
        |ctx: &ProvisionContext<'c>, _| {
            let downloads = &ctx.build_env.downloads;
            let download = VerifiedDownload::cometbft(&ctx.config.node.cometbft_version)?;
            let body = download.fetch(ctx.hal)?;
            let archive = downloads.join(&download.file_name);
            ctx.hal.write_file(&archive, &body, 0o644)?;
            ctx.run(
                Invocation::new("tar")
                    .arg("-xzf")
                    .arg(archive.display().to_string())
                    .arg("-C")
                    .arg(downloads.display().to_string())
                    .arg("cometbft"),
            )?;
            ctx.hal
                .install_file(&downloads.join("cometbft"), &cometbft_path(ctx), 0o755)?;
            restart_if_running(ctx, "cometbft")
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.build_env.downloads, "run `namada-setup build-env` first")
    })
}

fn source_at_tag(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let dir = source_dir(ctx);
    if !ctx.exists(&dir.join(".git"))? {
        return Ok(false);
    }
    let operator = Privilege::user(ctx.config.operator.name.clone());
    let probe = Invocation::new("git")
        .arg("-C")
        .arg(dir.display().to_string())
        .args(["describe", "--tags", "--exact-match", "HEAD"])
        .privilege(operator);
    Ok(ctx.probe(probe)?.as_deref() == Some(ctx.config.node.tag.as_str()))
}

pub fn source_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(SOURCE, source_at_tag, |ctx: &ProvisionContext<'c>, privilege| {
        let node = &ctx.config.node;
        let dir = source_dir(ctx);
        let git = |args: Vec<String>| {
            Invocation::new("git")
                .args(args)
                .privilege(privilege.clone())
                .cwd(&ctx.build_env.src)
                .streaming()
        };
        if ctx.exists(&dir.join(".git"))? {
            let dir = dir.display().to_string();
            let refspec = format!("refs/tags/{0}:refs/tags/{0}", node.tag);
            ctx.run(git(vec![
                "-C".into(),
                dir.clone(),
                "fetch".into(),
                "--depth".into(),
                "1".into(),
                "origin".into(),
                refspec,
            ]))?;
            return ctx.run(git(vec![
                "-C".into(),
                dir,
                "checkout".into(),
                "--force".into(),
                "--detach".into(),
                node.tag.clone(),
            ]));
        }
        ctx.run(git(vec![
            "clone".into(),
            "--depth".into(),
            "1".into(),
            "--branch".into(),
            node.tag.clone(),
            node.repo.clone(),
            dir.display().to_string(),
        ]))
    })
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_operator()?;
        ctx.require_binary("git")?;
        ctx.require_file(&ctx.build_env.src, "run `namada-setup build-env` first")
    })
}

pub fn build_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        BUILD,
        |ctx: &ProvisionContext<'c>| Ok(installed_match(ctx)? || built_match(ctx)?),
        |ctx: &ProvisionContext<'c>, privilege| {
            let mut inv = build_command(ctx, ctx.build_env.cargo_bin("cargo").display().to_string(), privilege)
                .args(["build", "--release", "--locked"]);
            for package in &ctx.config.node.cargo_packages {
                inv = inv.arg("--package").arg(package.clone());
            }
            ctx.run(inv.cwd(source_dir(ctx)).streaming())
                .context("building the node failed")
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        require_toolchain(ctx)?;
        if !source_at_tag(ctx)? {
            bail!("source is not checked out at {}; run the {SOURCE} step first", ctx.config.node.tag);
        }
        Ok(())
    })
}

pub fn install_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(INSTALL, installed_match, |ctx: &ProvisionContext<'c>, _| {
        for name in &ctx.config.node.binaries {
            ctx.hal
                .install_file(&built_binary(ctx, name), &ctx.config.node.binary(name), 0o755)?;
        }
        log::info!(
            "Installed {} into {}",
            ctx.config.node.binaries.join(", "),
            ctx.config.node.bin_dir.display()
        );
        restart_if_running(ctx, "namada binaries")
    })
    .requires(|ctx: &ProvisionContext<'c>| {
        if built_match(ctx)? {
            return Ok(());
        }
        bail!("node binaries for {} are not built; run the {BUILD} step first", ctx.config.node.tag)
    })
}

fn chain_dir(ctx: &ProvisionContext<'_>) -> PathBuf {
    ctx.config.node.base_dir.join(&ctx.config.node.chain_id)
}

pub fn join_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        JOIN,
        |ctx: &ProvisionContext<'c>| ctx.exists(&chain_dir(ctx)),
        |ctx: &ProvisionContext<'c>, privilege| {
            let node = &ctx.config.node;
            let mut inv = Invocation::new(node.binary("namada").display().to_string())
                .arg("--base-dir")
                .arg(node.base_dir.display().to_string())
                .args(["client", "utils", "join-network", "--chain-id"])
                .arg(node.chain_id.clone())
                .privilege(privilege.clone())
                .cwd(&node.base_dir)
                .streaming();
            if let Some(server) = &node.network_configs_server {
                inv = inv.env("NAMADA_NETWORK_CONFIGS_SERVER", server.clone());
            }
            ctx.run(inv)
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.config.node.base_dir, "run the node-data-dir step first")?;
        if !installed_match(ctx)? {
            bail!("namada {} is not installed", ctx.config.node.tag);
        }
        Ok(())
    })
}

pub fn unit_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        UNIT,
        |ctx: &ProvisionContext<'c>| templates::is_current(ctx.hal, &NodeUnit::from_config(ctx.config)),
        |ctx: &ProvisionContext<'c>, _| {
            templates::write(ctx.hal, &NodeUnit::from_config(ctx.config))?;
            ctx.hal.daemon_reload()?;
            restart_if_running(ctx, "node unit")
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        let sandbox = &ctx.config.sandbox;
        if !ctx.executable(&sandbox.binary_path)? {
            bail!("{} is missing; run `namada-setup sandbox` first", sandbox.binary_path.display());
        }
        ctx.require_file(
            &SandboxPolicy::from_config(ctx.config).path(),
            "run `namada-setup sandbox` first",
        )?;
        if !ctx.executable(&ctx.config.node.binary("namada"))? {
            bail!("namada is not installed");
        }
        Ok(())
    })
}

/// Restart the node if it is running, so a changed unit, binary or policy takes effect.
pub fn restart_if_running(ctx: &ProvisionContext<'_>, changed: &str) -> Result<()> {
    let unit = &ctx.config.node.service_name;
    if !ctx.hal.unit_active(unit)? {
        return Ok(());
    }
    log::info!("{changed} changed; restarting {unit}");
    ctx.hal.service_action(unit, ServiceAction::Restart)?;
    Ok(())
}

pub fn service_running(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let unit = &ctx.config.node.service_name;
    Ok(ctx.hal.unit_enabled(unit)? && ctx.hal.unit_active(unit)?)
}

pub fn service_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(SERVICE, service_running, |ctx: &ProvisionContext<'c>, _| {
        Ok(ctx
            .hal
            .service_action(&ctx.config.node.service_name, ServiceAction::EnableNow)?)
    })
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_file(&ctx.config.node.unit_path(), "run the node-unit step first")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::download::sha256_hex;
    use namada_hal::{success_output, FakeHal, Operation};
    use namada_workflow::{StepStatus, Workflow, WorkflowEngine};

    const TARBALL: &[u8] = b"cometbft tarball";

    /// Host after `operator`, `build-env` and `sandbox` have run.
    fn prepared_host(config: &Config) -> FakeHal {
        let hal = FakeHal::ubuntu();
        hal.with_host(|h| {
            h.add_user("operator", "/home/operator");
            h.add_executable("/usr/bin/tar");
            for dir in ["/opt/namada-build/downloads", "/opt/namada-build/src"] {
                h.add_dir(dir);
            }
            h.add_executable("/opt/namada-build/cargo/bin/cargo");
            h.add_executable("/opt/namada-build/cargo/bin/rustup");
            h.add_executable("/usr/local/bin/syd");
            h.add_file("/etc/namada/namada.syd-3", "sandbox/read:on\n", 0o644);
        });
        let cometbft = VerifiedDownload::cometbft(&config.node.cometbft_version).unwrap();
        hal.serve_download(&cometbft.url, TARBALL.to_vec());
        hal.serve_download(
            &cometbft.checksum_url,
            format!("{}  {}\n", sha256_hex(TARBALL), cometbft.file_name),
        );
        hal.on_command("tar", |_, host| {
            host.add_executable("/opt/namada-build/downloads/cometbft");
            Ok(success_output(Vec::new()))
        });
        hal.on_command("/usr/local/bin/cometbft", |_, _| {
            Ok(success_output(b"0.37.15\n".to_vec()))
        });
        hal.on_command("git", |inv, host| {
            if inv.args.first().map(String::as_str) == Some("clone") {
                host.add_dir("/opt/namada-build/src/namada/.git");
                return Ok(success_output(Vec::new()));
            }
            Ok(success_output(b"v101.0.0\n".to_vec()))
        });
        hal.on_command("/opt/namada-build/cargo/bin/cargo", |_, host| {
            for bin in ["namada", "namadan", "namadac", "namadaw"] {
                host.add_executable(format!("/opt/namada-build/src/namada/target/release/{bin}"));
            }
            Ok(success_output(Vec::new()))
        });
        for dir in ["/opt/namada-build/src/namada/target/release", "/usr/local/bin"] {
            hal.on_command(&format!("{dir}/namada"), |inv, host| {
                if inv.args.iter().any(|a| a == "join-network") {
                    host.add_dir("/var/lib/namada/namada.5f5de2dd1b88cba30586420");
                    return Ok(success_output(Vec::new()));
                }
                Ok(success_output(b"Namada v101.0.0\n".to_vec()))
            });
        }
        hal
    }

    #[test]
    fn node_workflow_runs_end_to_end() {
        let config = Config::default();
        let hal = prepared_host(&config);
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert!(report.succeeded(), "{report}");

        let host = hal.host();
        assert!(host.users.contains_key("namada"));
        assert_eq!(host.dirs[&PathBuf::from("/var/lib/namada")].owner, "namada");
        assert!(host.unit("namada").enabled && host.unit("namada").active);
        assert!(host
            .file_text("/etc/systemd/system/namada.service")
            .unwrap()
            .contains("/usr/local/bin/syd -P /etc/namada/namada.syd-3 --"));
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { args, privilege, .. }
                if args.iter().any(|a| a == "join-network") && *privilege == Privilege::user("namada")
        )));
        assert!(hal.has_operation(|op| matches!(op, Operation::DaemonReload)));
    }

    #[test]
    fn second_run_skips_everything() {
        let config = Config::default();
        let hal = prepared_host(&config);
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        assert!(WorkflowEngine::new(false).run(&workflow, &ctx).succeeded());
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.skipped().len(), workflow.step_names().len());
        assert_eq!(
            hal.operations()
                .iter()
                .filter(|op| matches!(op, Operation::CreateUser { .. }))
                .count(),
            1
        );
    }

    fn restarts(hal: &FakeHal) -> usize {
        hal.operations()
            .iter()
            .filter(|op| {
                matches!(op, Operation::Service { unit, action: ServiceAction::Restart } if unit == "namada")
            })
            .count()
    }

    #[test]
    fn changed_unit_restarts_the_running_node() {
        let mut config = Config::default();
        let hal = prepared_host(&config);
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        assert!(WorkflowEngine::new(false).run(&workflow, &ctx).succeeded());
        assert_eq!(restarts(&hal), 0);
        drop(workflow);
        drop(ctx);

        config.node.log_level = "debug".to_string();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.status_of(UNIT), Some(StepStatus::Applied));
        assert_eq!(report.status_of(SERVICE), Some(StepStatus::Skipped));
        assert!(hal
            .host()
            .file_text("/etc/systemd/system/namada.service")
            .unwrap()
            .contains("NAMADA_LOG=debug"));
        assert_eq!(restarts(&hal), 1);
    }

    #[test]
    fn unit_requires_sandbox() {
        let config = Config::default();
        let hal = prepared_host(&config);
        hal.with_host(|h| {
            h.files.remove(&PathBuf::from("/usr/local/bin/syd"));
        });
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.status_of(UNIT), Some(StepStatus::Failed));
        assert_eq!(report.status_of(SERVICE), Some(StepStatus::NotRun));
        assert!(!hal.host().unit("namada").active);
    }

    #[test]
    fn tampered_cometbft_download_aborts() {
        let config = Config::default();
        let hal = prepared_host(&config);
        let cometbft = VerifiedDownload::cometbft(&config.node.cometbft_version).unwrap();
        hal.serve_download(&cometbft.url, b"something else".to_vec());
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("node").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.status_of(COMETBFT), Some(StepStatus::Failed));
        assert!(!hal.host().files.contains_key(&PathBuf::from("/usr/local/bin/cometbft")));
    }
}
