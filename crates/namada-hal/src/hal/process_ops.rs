//! Process execution helpers.
//!
//! External commands are "world-touching" and must go through the HAL so workflows can be
//! tested without spawning real processes.

use crate::HalResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

/// Identity a command runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    Root,
    User(String),
}

impl Privilege {
    pub fn user(name: impl Into<String>) -> Self {
        Privilege::User(name.into())
    }

    pub fn username(&self) -> &str {
        match self {
            Privilege::Root => "root",
            Privilege::User(name) => name,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.username())
    }
}

/// A single external command with its full execution context.
///
/// The environment is explicit: nothing is inherited from profile exports, so two steps never
/// couple through ambient variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub privilege: Privilege,
    /// `None` blocks until the process exits.
    pub timeout: Option<Duration>,
    /// Inherit stdout/stderr instead of capturing them (long builds, log streaming).
    pub stream: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            privilege: Privilege::Root,
            timeout: None,
            stream: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Shell-like rendering for logs and dry-run output.
    pub fn display(&self) -> String {
        let mut out = String::new();
        if let Privilege::User(user) = &self.privilege {
            out.push_str(&format!("[as {user}] "));
        }
        for (k, v) in &self.env {
            out.push_str(&format!("{k}={v} "));
        }
        out.push_str(&self.program);
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push_str(&format!("'{arg}'"));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Process execution trait (external command runner).
pub trait ProcessOps {
    /// Run and capture output. A non-zero exit is *not* an error here.
    fn command_output(&self, inv: &Invocation) -> HalResult<Output>;

    /// Run and require a zero exit status.
    fn command_status(&self, inv: &Invocation) -> HalResult<()>;

    /// Resolve a program on PATH. Missing is `Ok(None)`.
    fn find_binary(&self, name: &str) -> HalResult<Option<PathBuf>>;

    /// Run and return trimmed stdout when the exit status is zero.
    fn command_stdout(&self, inv: &Invocation) -> HalResult<Option<String>> {
        let output = self.command_output(inv)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_whitespace_and_shows_identity() {
        let inv = Invocation::new("cargo")
            .args(["install", "--locked", "syd"])
            .env("CARGO_HOME", "/opt/build/cargo")
            .privilege(Privilege::user("operator"))
            .arg("a b");
        assert_eq!(
            inv.display(),
            "[as operator] CARGO_HOME=/opt/build/cargo cargo install --locked syd 'a b'"
        );
    }

    #[test]
    fn defaults_block_without_timeout_as_root() {
        let inv = Invocation::new("true");
        assert_eq!(inv.privilege, Privilege::Root);
        assert!(inv.timeout.is_none());
        assert!(!inv.stream);
    }
}
