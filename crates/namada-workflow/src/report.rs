//! Workflow result: per-step outcome plus an overall status.
//!
//! Created at workflow start with every step `not_run`, updated per step, finalized at the end
//! and printed. Never persisted.

use crate::step::{StepError, StepRecord, StepState};
use namada_hal::Privilege;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Skipped,
    Planned,
    Failed,
    NotRun,
}

impl StepStatus {
    fn from_state(state: StepState) -> Self {
        match state {
            StepState::Applied => StepStatus::Applied,
            StepState::Skipped => StepStatus::Skipped,
            StepState::Planned => StepStatus::Planned,
            StepState::Failed => StepStatus::Failed,
            StepState::Pending | StepState::Checking | StepState::Applying => StepStatus::NotRun,
        }
    }

    fn label(self) -> &'static str {
        match self {
            StepStatus::Applied => "applied",
            StepStatus::Skipped => "skipped",
            StepStatus::Planned => "planned",
            StepStatus::Failed => "FAILED",
            StepStatus::NotRun => "not run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub ordinal: usize,
    pub name: String,
    pub privilege: Privilege,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<StepState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow: String,
    pub dry_run: bool,
    pub status: OverallStatus,
    pub steps: Vec<StepOutcome>,
}

impl WorkflowReport {
    /// Every step starts as `not_run`.
    pub fn start(
        workflow: impl Into<String>,
        dry_run: bool,
        steps: impl IntoIterator<Item = (String, Privilege)>,
    ) -> Self {
        Self {
            workflow: workflow.into(),
            dry_run,
            status: OverallStatus::Running,
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, (name, privilege))| StepOutcome {
                    ordinal: i + 1,
                    name,
                    privilege,
                    status: StepStatus::NotRun,
                    error: None,
                    trace: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn record(&mut self, record: StepRecord) {
        let status = StepStatus::from_state(record.state());
        if let Some(outcome) = self.steps.iter_mut().find(|s| s.ordinal == record.ordinal) {
            outcome.status = status;
            outcome.error = record.error;
            outcome.trace = record.trace;
        }
    }

    pub fn finalize(&mut self) {
        self.status = if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            OverallStatus::Failed
        } else {
            OverallStatus::Succeeded
        };
    }

    pub fn succeeded(&self) -> bool {
        self.status == OverallStatus::Succeeded
    }

    fn names_with(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn applied(&self) -> Vec<&str> {
        self.names_with(StepStatus::Applied)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_with(StepStatus::Skipped)
    }

    pub fn planned(&self) -> Vec<&str> {
        self.names_with(StepStatus::Planned)
    }

    pub fn not_run(&self) -> Vec<&str> {
        self.names_with(StepStatus::NotRun)
    }

    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.status)
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Workflow '{}'{}", self.workflow, mode)?;
        for step in &self.steps {
            write!(
                f,
                "  {:>2}. {:<34} {}",
                step.ordinal,
                step.name,
                step.status.label()
            )?;
            if let Some(err) = &step.error {
                write!(f, ": {err}")?;
            }
            writeln!(f)?;
        }
        let summary = match self.status {
            OverallStatus::Succeeded => "succeeded",
            OverallStatus::Failed => "FAILED",
            OverallStatus::Running => "incomplete",
        };
        write!(
            f,
            "Result: {} ({} applied, {} skipped, {} planned, {} not run)",
            summary,
            self.applied().len(),
            self.skipped().len(),
            self.planned().len(),
            self.not_run().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> WorkflowReport {
        WorkflowReport::start(
            "harden",
            false,
            ["firewall", "toolchain", "sandbox"]
                .into_iter()
                .map(|n| (n.to_string(), Privilege::Root)),
        )
    }

    #[test]
    fn starts_with_everything_not_run() {
        let r = report();
        assert_eq!(r.status, OverallStatus::Running);
        assert_eq!(r.not_run(), vec!["firewall", "toolchain", "sandbox"]);
        assert_eq!(r.steps[2].ordinal, 3);
    }

    #[test]
    fn display_lists_each_step_and_summary() {
        let mut r = report();
        let mut record = StepRecord::new(1, "firewall", Privilege::Root);
        record.advance(StepState::Checking).unwrap();
        record.advance(StepState::Skipped).unwrap();
        r.record(record);
        r.finalize();
        let text = r.to_string();
        assert!(text.contains("firewall"));
        assert!(text.contains("skipped"));
        assert!(text.contains("Result: succeeded (0 applied, 1 skipped, 0 planned, 2 not run)"));
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let mut r = report();
        r.finalize();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["steps"][0]["status"], "not_run");
        assert_eq!(json["steps"][0]["privilege"], "root");
    }
}
