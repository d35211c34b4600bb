//! Shared UI helpers for the CLI.

use namada_core::SetupError;
use std::io::IsTerminal;

pub mod confirm;
pub mod style;

pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

pub fn ensure_interactive_terminal(interactive: bool) -> anyhow::Result<()> {
    if interactive {
        return Ok(());
    }
    Err(SetupError::NoTerminal(
        "pass --yes to run without a confirmation prompt, \
         or --dry-run to only show what would change"
            .to_string(),
    )
    .into())
}
