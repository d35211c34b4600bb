use namada_hal::HalError;
use thiserror::Error;

/// Result type alias for namada-setup operations
pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("This command must run as root (try: sudo namada-setup ...)")]
    NotRoot,

    #[error("Unsupported operating system: {0} (Ubuntu required)")]
    UnsupportedOs(String),

    #[error("Required binary not found: {0}")]
    MissingBinary(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("No interactive terminal available: {0}")]
    NoTerminal(String),

    #[error("Operation aborted by operator")]
    Aborted,

    #[error("Workflow '{workflow}' failed at step '{step}'")]
    WorkflowFailed { workflow: String, step: String },

    #[error(transparent)]
    Hal(#[from] HalError),
}
