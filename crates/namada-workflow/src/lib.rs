//! Provisioning workflow orchestration.
//!
//! This crate holds the deterministic execution primitives: a step state machine, the step
//! executor (guard, action, post-condition), an abort-on-first-failure workflow engine and an
//! advisory verifier. Higher-level crates provide the context type and the concrete steps.

pub mod engine;
pub mod report;
pub mod step;
pub mod verifier;

pub use engine::{Workflow, WorkflowEngine};
pub use report::{OverallStatus, StepOutcome, StepStatus, WorkflowReport};
pub use step::{execute_step, StepDefinition, StepError, StepRecord, StepState};
pub use verifier::{Check, CheckResult, CheckStatus, Verifier, VerifyReport};
