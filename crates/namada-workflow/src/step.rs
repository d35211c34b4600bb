//! Steps and their per-step state machine.

use anyhow::Result;
use namada_hal::Privilege;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type CheckFn<'a, C> = Box<dyn Fn(&C) -> Result<bool> + 'a>;
pub type ApplyFn<'a, C> = Box<dyn Fn(&C, &Privilege) -> Result<()> + 'a>;
pub type PreconditionFn<'a, C> = Box<dyn Fn(&C) -> Result<()> + 'a>;

/// `Pending -> Checking -> (Skipped | Planned | Applying) -> (Applied | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Checking,
    Skipped,
    /// Dry run: the guard said the action is needed, but it was not run.
    Planned,
    Applying,
    Applied,
    Failed,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Skipped | StepState::Planned | StepState::Applied | StepState::Failed
        )
    }

    pub fn can_transition_to(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, Checking)
                | (Checking, Skipped)
                | (Checking, Planned)
                | (Checking, Applying)
                | (Checking, Failed)
                | (Applying, Applied)
                | (Applying, Failed)
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "PENDING",
            StepState::Checking => "CHECKING",
            StepState::Skipped => "SKIPPED",
            StepState::Planned => "PLANNED",
            StepState::Applying => "APPLYING",
            StepState::Applied => "APPLIED",
            StepState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum StepError {
    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("state check failed: {0}")]
    Guard(String),

    #[error("action failed: {0}")]
    Action(String),

    #[error("post-condition not met: {0}")]
    Verification(String),

    #[error("illegal step transition {from} -> {to}")]
    IllegalTransition { from: StepState, to: StepState },
}

/// A named unit of provisioning work.
///
/// `check` is the idempotency guard: `true` means the host already satisfies the step and
/// `apply` is never called. `verify` runs only after `apply`.
pub struct StepDefinition<'a, C> {
    pub name: String,
    pub privilege: Privilege,
    pub precondition: Option<PreconditionFn<'a, C>>,
    pub check: CheckFn<'a, C>,
    pub apply: ApplyFn<'a, C>,
    pub verify: Option<CheckFn<'a, C>>,
}

impl<'a, C> StepDefinition<'a, C> {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&C) -> Result<bool> + 'a,
        apply: impl Fn(&C, &Privilege) -> Result<()> + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            privilege: Privilege::Root,
            precondition: None,
            check: Box::new(check),
            apply: Box::new(apply),
            verify: None,
        }
    }

    pub fn run_as(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn requires(mut self, precondition: impl Fn(&C) -> Result<()> + 'a) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }

    /// Post-condition; defaults to re-running the guard.
    pub fn verify_with(mut self, verify: impl Fn(&C) -> Result<bool> + 'a) -> Self {
        self.verify = Some(Box::new(verify));
        self
    }
}

/// Execution record of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub ordinal: usize,
    pub name: String,
    pub privilege: Privilege,
    pub trace: Vec<StepState>,
    pub error: Option<StepError>,
}

impl StepRecord {
    pub fn new(ordinal: usize, name: impl Into<String>, privilege: Privilege) -> Self {
        Self {
            ordinal,
            name: name.into(),
            privilege,
            trace: vec![StepState::Pending],
            error: None,
        }
    }

    pub fn state(&self) -> StepState {
        self.trace.last().copied().unwrap_or(StepState::Pending)
    }

    pub fn advance(&mut self, next: StepState) -> Result<(), StepError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(StepError::IllegalTransition { from, to: next });
        }
        log::debug!("step {} [{}]: {} -> {}", self.ordinal, self.name, from, next);
        self.trace.push(next);
        Ok(())
    }

    fn fail(&mut self, error: StepError) {
        // Failed is reachable from both Checking and Applying.
        if self.advance(StepState::Failed).is_err() {
            self.trace.push(StepState::Failed);
        }
        self.error = Some(error);
    }
}

fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

/// Run one step: precondition, guard, then action and post-condition.
pub fn execute_step<C>(
    step: &StepDefinition<'_, C>,
    ctx: &C,
    ordinal: usize,
    dry_run: bool,
) -> StepRecord {
    let mut record = StepRecord::new(ordinal, step.name.clone(), step.privilege.clone());
    if let Err(err) = run_transitions(step, ctx, dry_run, &mut record) {
        log::error!("❌ [{}] {}: {}", ordinal, step.name, err);
        record.fail(err);
    }
    record
}

fn run_transitions<C>(
    step: &StepDefinition<'_, C>,
    ctx: &C,
    dry_run: bool,
    record: &mut StepRecord,
) -> Result<(), StepError> {
    record.advance(StepState::Checking)?;

    if let Some(precondition) = &step.precondition {
        precondition(ctx).map_err(|e| StepError::Precondition(describe(&e)))?;
    }

    let satisfied = (step.check)(ctx).map_err(|e| StepError::Guard(describe(&e)))?;
    if satisfied {
        log::info!("⏭️  [{}] {}: already satisfied", record.ordinal, step.name);
        return record.advance(StepState::Skipped);
    }

    if dry_run {
        log::info!(
            "DRY RUN: [{}] {} would be applied as {}",
            record.ordinal,
            step.name,
            step.privilege
        );
        return record.advance(StepState::Planned);
    }

    record.advance(StepState::Applying)?;
    log::info!(
        "🧩 [{}] {} (as {})",
        record.ordinal,
        step.name,
        step.privilege
    );
    (step.apply)(ctx, &step.privilege).map_err(|e| StepError::Action(describe(&e)))?;

    let verified = match &step.verify {
        Some(verify) => verify(ctx),
        None => (step.check)(ctx),
    }
    .map_err(|e| StepError::Verification(describe(&e)))?;
    if !verified {
        return Err(StepError::Verification(format!(
            "{} did not reach its expected state",
            step.name
        )));
    }

    log::info!("✅ [{}] {}", record.ordinal, step.name);
    record.advance(StepState::Applied)
}
