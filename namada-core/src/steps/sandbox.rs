//! The syd sandbox: built with the operator's toolchain, installed system-wide.

use crate::context::ProvisionContext;
use crate::steps::build_env::{build_command, require_toolchain};
use crate::steps::hardening::install_missing;
use crate::steps::node;
use crate::templates::{self, SandboxPolicy};
use anyhow::{bail, Result};
use namada_hal::{Invocation, Privilege};
use namada_workflow::StepDefinition;
use std::path::{Path, PathBuf};

pub const BUILD_DEPS: &str = "sandbox-build-deps";
pub const BUILD: &str = "sandbox-build";
pub const INSTALL: &str = "sandbox-binary";
pub const POLICY: &str = "sandbox-policy";

pub fn steps<'s, 'c>(ctx: &ProvisionContext<'c>) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
    let operator = Privilege::user(ctx.config.operator.name.clone());
    vec![
        build_deps_step(),
        build_step().run_as(operator),
        install_step(),
        policy_step(),
    ]
}

fn built_binary(ctx: &ProvisionContext<'_>) -> PathBuf {
    ctx.build_env.cargo_bin(&ctx.config.sandbox.crate_name)
}

/// Executable at `path` whose `--version` mentions `want` (any version when `None`).
pub fn reports_version(
    ctx: &ProvisionContext<'_>,
    path: &Path,
    args: &[&str],
    want: Option<&str>,
) -> Result<bool> {
    if !ctx.executable(path)? {
        return Ok(false);
    }
    let Some(want) = want else {
        return Ok(true);
    };
    let probe = Invocation::new(path.display().to_string()).args(args.iter().copied());
    Ok(ctx
        .probe(probe)?
        .map(|out| out.contains(want))
        .unwrap_or(false))
}

fn installed(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let sandbox = &ctx.config.sandbox;
    reports_version(ctx, &sandbox.binary_path, &["--version"], sandbox.version.as_deref())
}

fn built(ctx: &ProvisionContext<'_>) -> Result<bool> {
    let sandbox = &ctx.config.sandbox;
    reports_version(ctx, &built_binary(ctx), &["--version"], sandbox.version.as_deref())
}

pub fn build_deps_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        BUILD_DEPS,
        |ctx: &ProvisionContext<'c>| {
            for pkg in &ctx.config.sandbox.build_packages {
                if !ctx.hal.package_installed(pkg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        },
        |ctx: &ProvisionContext<'c>, _| install_missing(ctx, &ctx.config.sandbox.build_packages),
    )
}

pub fn build_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        BUILD,
        |ctx: &ProvisionContext<'c>| Ok(installed(ctx)? || built(ctx)?),
        |ctx: &ProvisionContext<'c>, privilege| {
            let sandbox = &ctx.config.sandbox;
            let mut inv = build_command(ctx, ctx.build_env.cargo_bin("cargo").display().to_string(), privilege)
                .args(["install", "--locked"]);
            if let Some(version) = &sandbox.version {
                inv = inv.arg("--version").arg(version.clone());
            }
            ctx.run(
                inv.arg(sandbox.crate_name.clone())
                    .cwd(&ctx.build_env.root)
                    .streaming(),
            )
        },
    )
    .requires(|ctx: &ProvisionContext<'c>| {
        ctx.require_operator()?;
        require_toolchain(ctx)
    })
}

pub fn install_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(INSTALL, installed, |ctx: &ProvisionContext<'c>, _| {
        let target = &ctx.config.sandbox.binary_path;
        if let Some(parent) = target.parent() {
            if !ctx.exists(parent)? {
                ctx.hal.create_dir_all(parent, 0o755)?;
            }
        }
        ctx.hal.install_file(&built_binary(ctx), target, 0o755)?;
        log::info!("Installed {}", target.display());
        node::restart_if_running(ctx, "syd")
    })
    .requires(|ctx: &ProvisionContext<'c>| {
        if ctx.executable(&built_binary(ctx))? {
            return Ok(());
        }
        bail!(
            "{} has not been built; run the {BUILD} step first",
            ctx.config.sandbox.crate_name
        )
    })
}

pub fn policy_step<'s, 'c>() -> StepDefinition<'s, ProvisionContext<'c>> {
    StepDefinition::new(
        POLICY,
        |ctx: &ProvisionContext<'c>| {
            templates::is_current(ctx.hal, &SandboxPolicy::from_config(ctx.config))
        },
        |ctx: &ProvisionContext<'c>, _| {
            if templates::write(ctx.hal, &SandboxPolicy::from_config(ctx.config))? {
                node::restart_if_running(ctx, "sandbox policy")?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use namada_hal::{success_output, FakeHal, Operation, ServiceAction};
    use namada_workflow::{StepStatus, Workflow, WorkflowEngine};

    fn host_with_toolchain() -> FakeHal {
        let hal = FakeHal::ubuntu();
        hal.with_host(|h| {
            h.add_user("operator", "/home/operator");
            h.add_executable("/opt/namada-build/cargo/bin/cargo");
            h.add_executable("/opt/namada-build/cargo/bin/rustup");
        });
        hal.on_command("/opt/namada-build/cargo/bin/cargo", |inv, host| {
            if inv.args.first().map(String::as_str) == Some("install") {
                host.add_executable("/opt/namada-build/cargo/bin/syd");
            }
            Ok(success_output(Vec::new()))
        });
        hal
    }

    #[test]
    fn sandbox_is_built_as_operator_and_installed_as_root() {
        let hal = host_with_toolchain();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("sandbox").extend(steps(&ctx));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert!(report.succeeded(), "{report}");

        assert!(hal.commands().contains(&"/opt/namada-build/cargo/bin/cargo install --locked syd".to_string()));
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { privilege, .. } if *privilege == Privilege::user("operator")
        )));
        let host = hal.host();
        assert_eq!(host.files[&PathBuf::from("/usr/local/bin/syd")].mode, 0o755);
        assert!(host
            .file_text("/etc/namada/namada.syd-3")
            .unwrap()
            .contains("allow/write+/var/lib/namada/***"));
    }

    #[test]
    fn pinned_version_is_passed_and_checked() {
        let hal = host_with_toolchain();
        hal.on_command("/usr/local/bin/syd", |_, _| Ok(success_output(b"syd 3.28.3\n".to_vec())));
        hal.with_host(|h| h.add_executable("/usr/local/bin/syd"));
        let mut config = Config::default();
        config.sandbox.version = Some("3.28.3".to_string());
        let ctx = ProvisionContext::new(&hal, &config);
        assert!(installed(&ctx).unwrap());

        config.sandbox.version = Some("3.30.0".to_string());
        let ctx = ProvisionContext::new(&hal, &config);
        assert!(!installed(&ctx).unwrap());
    }

    #[test]
    fn changed_policy_restarts_the_running_node() {
        let hal = host_with_toolchain();
        hal.with_host(|h| {
            h.add_file("/etc/namada/namada.syd-3", "sandbox/read:on\n", 0o644);
            h.add_unit("namada", true, true);
        });
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let report = WorkflowEngine::new(false).run(&Workflow::new("sandbox").step(policy_step()), &ctx);
        assert_eq!(report.status_of(POLICY), Some(StepStatus::Applied));
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Service { unit, action: ServiceAction::Restart } if unit == "namada"
        )));

        hal.clear_operations();
        let report = WorkflowEngine::new(false).run(&Workflow::new("sandbox").step(policy_step()), &ctx);
        assert_eq!(report.status_of(POLICY), Some(StepStatus::Skipped));
        assert!(!hal.has_operation(|op| matches!(op, Operation::Service { .. })));
    }

    #[test]
    fn build_without_toolchain_fails_precondition() {
        let hal = FakeHal::ubuntu();
        hal.with_host(|h| h.add_user("operator", "/home/operator"));
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let workflow = Workflow::new("sandbox").step(build_step().run_as(Privilege::user("operator")));
        let report = WorkflowEngine::new(false).run(&workflow, &ctx);
        assert_eq!(report.status_of(BUILD), Some(StepStatus::Failed));
        assert_eq!(hal.operation_count(), 0);
    }
}
