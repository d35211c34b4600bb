//! Day-two operations on the node unit.

use crate::context::ProvisionContext;
use anyhow::{bail, Result};
use namada_hal::ServiceAction;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Start,
    Stop,
    Restart,
    Status,
}

fn require_unit(ctx: &ProvisionContext<'_>) -> Result<()> {
    let path = ctx.config.node.unit_path();
    if !ctx.exists(&path)? {
        bail!(
            "{} is not installed; run `namada-setup node` first",
            path.display()
        );
    }
    Ok(())
}

/// Apply `command` to the node unit. Returns the status text for `Status`.
pub fn lifecycle(ctx: &ProvisionContext<'_>, command: Lifecycle, dry_run: bool) -> Result<Option<String>> {
    require_unit(ctx)?;
    let unit = &ctx.config.node.service_name;
    let action = match command {
        Lifecycle::Status => return Ok(Some(ctx.hal.unit_status(unit)?)),
        Lifecycle::Start => ServiceAction::Start,
        Lifecycle::Stop => ServiceAction::Stop,
        Lifecycle::Restart => ServiceAction::Restart,
    };
    if dry_run {
        log::info!("DRY RUN: systemctl {action} {unit}");
        return Ok(None);
    }
    log::info!("systemctl {action} {unit}");
    ctx.hal.service_action(unit, action)?;
    Ok(None)
}

/// Stream the node journal to the terminal.
pub fn logs(ctx: &ProvisionContext<'_>, lines: u32, follow: bool) -> Result<()> {
    require_unit(ctx)?;
    ctx.hal
        .journal(&ctx.config.node.service_name, lines, follow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use namada_hal::{FakeHal, Operation};

    fn installed() -> FakeHal {
        let hal = FakeHal::ubuntu();
        hal.with_host(|h| h.add_file("/etc/systemd/system/namada.service", "[Unit]\n", 0o644));
        hal
    }

    #[test]
    fn stop_and_start_toggle_the_unit() {
        let hal = installed();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        lifecycle(&ctx, Lifecycle::Start, false).unwrap();
        assert!(hal.host().unit("namada").active);
        lifecycle(&ctx, Lifecycle::Stop, false).unwrap();
        assert!(!hal.host().unit("namada").active);
        let status = lifecycle(&ctx, Lifecycle::Status, false).unwrap().unwrap();
        assert!(status.contains("inactive"));
    }

    #[test]
    fn dry_run_leaves_unit_alone() {
        let hal = installed();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        lifecycle(&ctx, Lifecycle::Restart, true).unwrap();
        assert_eq!(hal.operation_count(), 0);
    }

    #[test]
    fn missing_unit_is_an_error() {
        let hal = FakeHal::ubuntu();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        assert!(lifecycle(&ctx, Lifecycle::Start, false).is_err());
        assert!(logs(&ctx, 50, false).is_err());
    }

    #[test]
    fn logs_go_through_journalctl() {
        let hal = installed();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        logs(&ctx, 200, true).unwrap();
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { program, args, .. }
                if program == "journalctl" && args.contains(&"--follow".to_string())
        )));
    }
}
