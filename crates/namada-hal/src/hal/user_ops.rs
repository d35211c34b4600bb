//! User and group management.

use crate::HalResult;
use std::path::PathBuf;

/// Parameters for `useradd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub home: Option<PathBuf>,
    pub shell: String,
    pub groups: Vec<String>,
    /// System account (no aging, low uid, own group).
    pub system: bool,
    pub create_home: bool,
    pub comment: Option<String>,
}

impl UserSpec {
    pub fn login(name: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home: None,
            shell: shell.into(),
            groups: Vec::new(),
            system: false,
            create_home: true,
            comment: None,
        }
    }

    pub fn system(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home: Some(home.into()),
            shell: "/usr/sbin/nologin".to_string(),
            groups: Vec::new(),
            system: true,
            create_home: false,
            comment: None,
        }
    }

    pub fn useradd_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.system {
            args.push("--system".to_string());
            args.push("--user-group".to_string());
        }
        if self.create_home {
            args.push("--create-home".to_string());
        } else {
            args.push("--no-create-home".to_string());
        }
        if let Some(home) = &self.home {
            args.push("--home-dir".to_string());
            args.push(home.display().to_string());
        }
        args.push("--shell".to_string());
        args.push(self.shell.clone());
        if !self.groups.is_empty() {
            args.push("--groups".to_string());
            args.push(self.groups.join(","));
        }
        if let Some(comment) = &self.comment {
            args.push("--comment".to_string());
            args.push(comment.clone());
        }
        args.push(self.name.clone());
        args
    }
}

pub trait UserOps {
    fn user_exists(&self, name: &str) -> HalResult<bool>;
    fn group_exists(&self, name: &str) -> HalResult<bool>;
    /// Supplementary or primary membership. Unknown user or group is `false`.
    fn user_in_group(&self, user: &str, group: &str) -> HalResult<bool>;
    fn home_dir(&self, name: &str) -> HalResult<Option<PathBuf>>;
    /// Whether the account has a usable password (`passwd -S` status `P`).
    fn password_set(&self, name: &str) -> HalResult<bool>;

    fn create_user(&self, spec: &UserSpec) -> HalResult<()>;
    fn add_user_to_group(&self, user: &str, group: &str) -> HalResult<()>;
    /// Prompt for a new password on the controlling terminal.
    fn set_password_interactive(&self, name: &str) -> HalResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_user_args_include_groups_and_home() {
        let mut spec = UserSpec::login("operator", "/bin/bash");
        spec.groups = vec!["sudo".to_string(), "adm".to_string()];
        assert_eq!(
            spec.useradd_args(),
            vec![
                "--create-home",
                "--shell",
                "/bin/bash",
                "--groups",
                "sudo,adm",
                "operator"
            ]
        );
    }

    #[test]
    fn system_user_args_have_nologin_shell() {
        let spec = UserSpec::system("namada", "/var/lib/namada");
        let args = spec.useradd_args();
        assert!(args.contains(&"--system".to_string()));
        assert!(args.contains(&"/usr/sbin/nologin".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("namada"));
    }
}
