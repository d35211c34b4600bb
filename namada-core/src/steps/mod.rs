//! Concrete provisioning steps, grouped into the workflows the CLI exposes.

pub mod build_env;
pub mod hardening;
pub mod node;
pub mod operator;
pub mod sandbox;

use crate::context::ProvisionContext;
use namada_workflow::{StepDefinition, Workflow, WorkflowEngine, WorkflowReport};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowKind {
    Operator,
    Harden,
    BuildEnv,
    Sandbox,
    Node,
    All,
}

impl WorkflowKind {
    /// Dependency order.
    pub const SEQUENCE: [WorkflowKind; 5] = [
        WorkflowKind::Operator,
        WorkflowKind::Harden,
        WorkflowKind::BuildEnv,
        WorkflowKind::Sandbox,
        WorkflowKind::Node,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WorkflowKind::Operator => "operator",
            WorkflowKind::Harden => "harden",
            WorkflowKind::BuildEnv => "build-env",
            WorkflowKind::Sandbox => "sandbox",
            WorkflowKind::Node => "node",
            WorkflowKind::All => "all",
        }
    }

    pub fn parts(self) -> Vec<WorkflowKind> {
        match self {
            WorkflowKind::All => Self::SEQUENCE.to_vec(),
            kind => vec![kind],
        }
    }

    pub fn steps<'s, 'c>(
        self,
        ctx: &ProvisionContext<'c>,
    ) -> Vec<StepDefinition<'s, ProvisionContext<'c>>> {
        match self {
            WorkflowKind::Operator => operator::steps(ctx),
            WorkflowKind::Harden => hardening::steps(ctx),
            WorkflowKind::BuildEnv => build_env::steps(ctx),
            WorkflowKind::Sandbox => sandbox::steps(ctx),
            WorkflowKind::Node => node::steps(ctx),
            WorkflowKind::All => Self::SEQUENCE
                .iter()
                .flat_map(|kind| kind.steps(ctx))
                .collect(),
        }
    }

    pub fn workflow<'s, 'c>(self, ctx: &ProvisionContext<'c>) -> Workflow<'s, ProvisionContext<'c>> {
        Workflow::new(self.name()).extend(self.steps(ctx))
    }

    /// Host tools the workflow shells out to before it installs anything itself.
    pub fn required_binaries(self) -> Vec<&'static str> {
        let mut bins: Vec<&'static str> = Vec::new();
        for kind in self.parts() {
            let needed: &[&'static str] = match kind {
                WorkflowKind::Operator => &["useradd", "usermod", "visudo"],
                WorkflowKind::Harden => &["apt-get", "dpkg-query", "sysctl", "systemctl", "mount"],
                WorkflowKind::BuildEnv => &["runuser"],
                WorkflowKind::Sandbox => &["runuser", "apt-get"],
                WorkflowKind::Node => &["runuser", "systemctl", "tar"],
                WorkflowKind::All => &[],
            };
            for bin in needed {
                if !bins.contains(bin) {
                    bins.push(bin);
                }
            }
        }
        bins
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build and run one workflow against the host.
pub fn run(ctx: &ProvisionContext<'_>, kind: WorkflowKind, dry_run: bool) -> WorkflowReport {
    let workflow = kind.workflow(ctx);
    WorkflowEngine::new(dry_run).run(&workflow, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use namada_hal::FakeHal;
    use namada_workflow::StepStatus;
    use std::collections::BTreeSet;

    #[test]
    fn all_runs_every_workflow_in_order() {
        let hal = FakeHal::ubuntu();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let all = WorkflowKind::All.workflow(&ctx);
        let names = all.step_names();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());

        let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(position(operator::ACCOUNT) < position(operator::SUDOERS));
        assert!(position(operator::SSH_KEYS) < position(hardening::SSHD));
        assert!(position(hardening::FIREWALL) < position(build_env::TOOLCHAIN));
        assert!(position(sandbox::INSTALL) < position(node::UNIT));
        assert_eq!(names.last().copied(), Some(node::SERVICE));
    }

    #[test]
    fn dry_run_on_fresh_host_plans_without_mutation() {
        let hal = FakeHal::ubuntu();
        let config = Config::default();
        let ctx = ProvisionContext::new(&hal, &config);
        let report = run(&ctx, WorkflowKind::All, true);
        assert!(report.succeeded(), "{report}");
        assert!(report.applied().is_empty());
        assert_eq!(report.status_of(node::SERVICE), Some(StepStatus::Planned));
        assert!(hal.operations().iter().all(|op| matches!(op, namada_hal::Operation::Command { .. })));
    }

    #[test]
    fn required_binaries_are_deduplicated() {
        let bins = WorkflowKind::All.required_binaries();
        assert_eq!(bins.iter().filter(|b| **b == "runuser").count(), 1);
        assert!(WorkflowKind::Operator.required_binaries().contains(&"visudo"));
    }
}
