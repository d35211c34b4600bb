//! Abort-on-first-failure workflow engine.

use crate::report::WorkflowReport;
use crate::step::{execute_step, StepDefinition, StepError, StepRecord, StepState};

/// An ordered list of steps.
pub struct Workflow<'a, C> {
    pub name: String,
    pub steps: Vec<StepDefinition<'a, C>>,
}

impl<'a, C> Workflow<'a, C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: StepDefinition<'a, C>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn extend(mut self, steps: impl IntoIterator<Item = StepDefinition<'a, C>>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

pub struct WorkflowEngine {
    dry_run: bool,
}

impl WorkflowEngine {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Run every step in order and stop at the first failure. No retries.
    pub fn run<C>(&self, workflow: &Workflow<'_, C>, ctx: &C) -> WorkflowReport {
        let mut report = WorkflowReport::start(
            workflow.name.clone(),
            self.dry_run,
            workflow
                .steps
                .iter()
                .map(|s| (s.name.clone(), s.privilege.clone())),
        );
        log::info!(
            "▶️  workflow '{}' ({} steps{})",
            workflow.name,
            workflow.steps.len(),
            if self.dry_run { ", dry run" } else { "" }
        );

        let mut planned_any = false;
        for (index, step) in workflow.steps.iter().enumerate() {
            let mut record = execute_step(step, ctx, index + 1, self.dry_run);
            if self.dry_run && planned_any {
                record = defer_unmet_precondition(record);
            }
            planned_any |= record.state() == StepState::Planned;
            let failed = record.state() == StepState::Failed;
            report.record(record);
            if failed {
                log::error!(
                    "🛑 workflow '{}' aborted at step {} ({}); {} step(s) not run",
                    workflow.name,
                    index + 1,
                    step.name,
                    workflow.steps.len() - index - 1
                );
                break;
            }
        }

        report.finalize();
        report
    }
}

/// In a dry run, a precondition that an earlier planned step would satisfy is planned too.
fn defer_unmet_precondition(record: StepRecord) -> StepRecord {
    let Some(StepError::Precondition(reason)) = &record.error else {
        return record;
    };
    log::info!(
        "DRY RUN: [{}] {} waits on earlier planned steps ({})",
        record.ordinal,
        record.name,
        reason
    );
    let mut deferred = StepRecord::new(record.ordinal, record.name.clone(), record.privilege.clone());
    for state in [StepState::Checking, StepState::Planned] {
        if deferred.advance(state).is_err() {
            return record;
        }
    }
    deferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{OverallStatus, StepStatus};
    use namada_hal::Privilege;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Calls(RefCell<Vec<&'static str>>);

    fn ok_step<'a>(name: &'static str) -> StepDefinition<'a, Calls> {
        StepDefinition::new(
            name,
            |_c: &Calls| Ok(false),
            move |c: &Calls, _p: &Privilege| {
                c.0.borrow_mut().push(name);
                Ok(())
            },
        )
        .verify_with(|_c: &Calls| Ok(true))
    }

    fn failing_step<'a>(name: &'static str) -> StepDefinition<'a, Calls> {
        StepDefinition::new(
            name,
            |_c: &Calls| Ok(false),
            move |c: &Calls, _p: &Privilege| {
                c.0.borrow_mut().push(name);
                anyhow::bail!("network unreachable")
            },
        )
    }

    #[test]
    fn failure_halts_remaining_steps() {
        let calls = Calls::default();
        let workflow = Workflow::new("provision")
            .step(ok_step("enable firewall"))
            .step(failing_step("install toolchain"))
            .step(ok_step("install sandbox"))
            .step(ok_step("install node"));

        let report = WorkflowEngine::new(false).run(&workflow, &calls);

        assert_eq!(
            calls.0.borrow().as_slice(),
            &["enable firewall", "install toolchain"]
        );
        assert_eq!(report.status, OverallStatus::Failed);
        assert_eq!(report.status_of("enable firewall"), Some(StepStatus::Applied));
        assert_eq!(report.status_of("install toolchain"), Some(StepStatus::Failed));
        assert_eq!(report.not_run(), vec!["install sandbox", "install node"]);
        assert_eq!(report.failed_step().map(|s| s.ordinal), Some(2));
    }

    #[test]
    fn all_steps_succeed() {
        let calls = Calls::default();
        let workflow = Workflow::new("provision")
            .step(ok_step("a"))
            .step(ok_step("b"));
        let report = WorkflowEngine::new(false).run(&workflow, &calls);
        assert!(report.succeeded());
        assert_eq!(report.applied(), vec!["a", "b"]);
    }

    #[test]
    fn dry_run_plans_every_pending_step() {
        let calls = Calls::default();
        let workflow = Workflow::new("provision")
            .step(ok_step("a"))
            .step(failing_step("b"));
        let report = WorkflowEngine::new(true).run(&workflow, &calls);
        assert!(calls.0.borrow().is_empty());
        assert!(report.succeeded());
        assert_eq!(report.planned(), vec!["a", "b"]);
        assert!(report.dry_run);
    }

    #[test]
    fn dry_run_defers_preconditions_only_after_a_planned_step() {
        let needs_user = || {
            ok_step("sudoers").requires(|_c: &Calls| anyhow::bail!("operator missing"))
        };
        let calls = Calls::default();
        let report = WorkflowEngine::new(true).run(
            &Workflow::new("operator").step(ok_step("account")).step(needs_user()),
            &calls,
        );
        assert!(report.succeeded());
        assert_eq!(report.planned(), vec!["account", "sudoers"]);

        let report =
            WorkflowEngine::new(true).run(&Workflow::new("operator").step(needs_user()), &calls);
        assert_eq!(report.status_of("sudoers"), Some(StepStatus::Failed));
    }

    #[test]
    fn empty_workflow_succeeds() {
        let report = WorkflowEngine::new(false).run(&Workflow::<Calls>::new("noop"), &Calls::default());
        assert!(report.succeeded());
        assert!(report.steps.is_empty());
    }
}
