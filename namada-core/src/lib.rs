//! namada-setup core library.
//!
//! `namada-core` holds configuration, logging, typed config-file templates and the concrete
//! provisioning steps. The workflow engine lives in `namada-workflow`; host access goes
//! through `namada-hal`.

pub mod config;
pub mod context;
pub mod download;
pub mod errors;
pub mod logging;
pub mod preflight;
pub mod service;
pub mod steps;
pub mod templates;
pub mod verify;

pub use config::Config;
pub use context::ProvisionContext;
pub use errors::{Result, SetupError};
pub use steps::WorkflowKind;
