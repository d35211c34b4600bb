use anyhow::{bail, Context, Result};
use clap::Parser;
use namada_core::config::DEFAULT_CONFIG_PATH;
use namada_core::preflight::{self, PreflightConfig};
use namada_core::{logging, service, steps, verify};
use namada_core::{Config, ProvisionContext, SetupError, WorkflowKind};
use namada_hal::{LinuxHal, SystemHal};
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod cli;
pub mod output;
pub mod ui;

use cli::{Cli, Command};
use ui::{confirm, style};

/// Host access and operator interaction for one invocation.
pub struct Runtime<'a> {
    pub hal: &'a dyn SystemHal,
    /// stdin is a terminal; prompts and password entry need one.
    pub interactive: bool,
    pub confirm: &'a dyn Fn(&str) -> Result<bool>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with(cli.log_file.clone());

    let hal = LinuxHal::new();
    let runtime = Runtime {
        hal: &hal,
        interactive: ui::stdin_is_terminal(),
        confirm: &confirm::confirm_action,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &runtime, &mut out)
}

/// `--config`, else the system config when it exists, else built-in defaults.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        }
    }
}

pub fn execute(cli: &Cli, rt: &Runtime<'_>, out: &mut dyn Write) -> Result<()> {
    let path = config_path(cli.config.as_deref());
    if let Some(path) = &path {
        log::info!("Using configuration {}", path.display());
    }
    let config = Config::load(path.as_deref())?;

    let ctx = ProvisionContext::new(rt.hal, &config).interactive(rt.interactive);
    match &cli.command {
        Command::Operator => provision(cli, rt, &config, WorkflowKind::Operator, out)?,
        Command::Harden => provision(cli, rt, &config, WorkflowKind::Harden, out)?,
        Command::BuildEnv => provision(cli, rt, &config, WorkflowKind::BuildEnv, out)?,
        Command::Sandbox => provision(cli, rt, &config, WorkflowKind::Sandbox, out)?,
        Command::Node => provision(cli, rt, &config, WorkflowKind::Node, out)?,
        Command::All => provision(cli, rt, &config, WorkflowKind::All, out)?,
        Command::Preflight => {
            log::info!("{}", style::with(style::emoji::SEARCH, "Running preflight checks..."));
            preflight::run(rt.hal, &PreflightConfig::for_workflow(WorkflowKind::All, cli.dry_run))?;
            writeln!(out, "{}", style::with(style::emoji::SUCCESS, "Preflight passed"))?;
        }
        Command::Verify { strict } => {
            let report = verify::run(&ctx);
            output::print_verify(out, &report, cli.json)?;
            if !report.all_passed() {
                for check in report.failures() {
                    log::warn!("verify: {} did not pass", check.name);
                }
                if *strict {
                    bail!("{} verification check(s) did not pass", report.failures().len());
                }
            }
        }
        Command::Service { action } => {
            if let Some(status) = service::lifecycle(&ctx, (*action).into(), cli.dry_run)? {
                write!(out, "{status}")?;
            }
        }
        Command::Logs { lines, follow } => service::logs(&ctx, *lines, *follow)?,
        Command::ShowConfig => write!(out, "{}", config.to_toml()?)?,
    }
    Ok(())
}

fn approve(cli: &Cli, rt: &Runtime<'_>, prompt: &str) -> Result<bool> {
    if cli.yes || cli.dry_run {
        return Ok(true);
    }
    ui::ensure_interactive_terminal(rt.interactive)?;
    (rt.confirm)(prompt)
}

fn provision(
    cli: &Cli,
    rt: &Runtime<'_>,
    config: &Config,
    kind: WorkflowKind,
    out: &mut dyn Write,
) -> Result<()> {
    preflight::run(rt.hal, &PreflightConfig::for_workflow(kind, cli.dry_run))
        .context("Preflight failed")?;

    let prompt = format!("Proceed with {kind}?");
    let proceeded = confirm::confirm_and_run_with(
        &prompt,
        |prompt| approve(cli, rt, prompt),
        || run_workflow(cli, rt, config, kind, out),
    )?;
    if !proceeded {
        let aborted = SetupError::Aborted;
        log::info!("{}", style::with(style::emoji::CANCEL, &aborted.to_string()));
        writeln!(out, "{aborted}")?;
    }
    Ok(())
}

fn run_workflow(
    cli: &Cli,
    rt: &Runtime<'_>,
    config: &Config,
    kind: WorkflowKind,
    out: &mut dyn Write,
) -> Result<()> {
    let ctx = ProvisionContext::new(rt.hal, config).interactive(rt.interactive);
    log::info!("{}", style::with(style::emoji::ACTION, &format!("Running workflow {kind}")));
    let report = steps::run(&ctx, kind, cli.dry_run);

    if let Some(failed) = report.failed_step() {
        output::print_run(out, &report, None, cli.json)?;
        return Err(SetupError::WorkflowFailed {
            workflow: kind.to_string(),
            step: failed.name.clone(),
        }
        .into());
    }

    let checks = matches!(kind, WorkflowKind::Node | WorkflowKind::All) && !cli.dry_run;
    let verified = checks.then(|| verify::run(&ctx));
    if let Some(verified) = &verified {
        for check in verified.failures() {
            log::warn!(
                "{}",
                style::with(style::emoji::WARNING, &format!("verify: {} did not pass", check.name))
            );
        }
    }
    output::print_run(out, &report, verified.as_ref(), cli.json)?;
    if !cli.dry_run {
        log::info!("{}", style::with(style::emoji::PARTY, &format!("Workflow {kind} complete")));
    }
    Ok(())
}
