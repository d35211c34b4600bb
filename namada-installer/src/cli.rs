//! Command-line interface for `namada-setup`.

use clap::{Parser, Subcommand, ValueEnum};
use namada_core::service::Lifecycle;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "namada-setup",
    version,
    about = "Provision and harden an Ubuntu host to run a Namada node"
)]
pub struct Cli {
    /// Configuration file (TOML); defaults to /etc/namada-setup/config.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show what would change without touching the host
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Append logs to this file instead of the default log location
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check the OS, privileges and required tools only
    Preflight,
    /// Create the operator account, sudoers drop-in and SSH keys
    Operator,
    /// Packages, sysctl, /dev/shm, fail2ban, firewall and sshd hardening
    Harden,
    /// Isolated Rust toolchain owned by the operator
    BuildEnv,
    /// Build and install syd and write its policy
    Sandbox,
    /// Node user, namada build, network join and systemd unit
    Node,
    /// Every workflow in dependency order
    All,
    /// Run the post-provisioning checklist
    Verify {
        /// Exit non-zero when any check does not pass
        #[arg(long)]
        strict: bool,
    },
    /// Control the node service
    Service {
        #[arg(value_enum)]
        action: ServiceCommand,
    },
    /// Show the node journal
    Logs {
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: u32,
        #[arg(short = 'f', long)]
        follow: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    Start,
    Stop,
    Restart,
    Status,
}

impl From<ServiceCommand> for Lifecycle {
    fn from(cmd: ServiceCommand) -> Self {
        match cmd {
            ServiceCommand::Start => Lifecycle::Start,
            ServiceCommand::Stop => Lifecycle::Stop,
            ServiceCommand::Restart => Lifecycle::Restart,
            ServiceCommand::Status => Lifecycle::Status,
        }
    }
}
