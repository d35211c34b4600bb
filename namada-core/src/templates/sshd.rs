use super::{ConfigTemplate, MANAGED_HEADER};
use crate::config::valid_username;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// sshd drop-in. Password logins are only turned off once key logins are known to work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshdHardening {
    pub port: u16,
    pub allow_users: Vec<String>,
    pub password_authentication: bool,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl ConfigTemplate for SshdHardening {
    fn path(&self) -> PathBuf {
        PathBuf::from("/etc/ssh/sshd_config.d/99-namada-hardening.conf")
    }

    fn render(&self) -> Result<String> {
        let mut out = MANAGED_HEADER.to_string();
        out.push_str(&format!("Port {}\n", self.port));
        out.push_str("PermitRootLogin no\n");
        out.push_str(&format!(
            "PasswordAuthentication {}\n",
            yes_no(self.password_authentication)
        ));
        out.push_str("KbdInteractiveAuthentication no\n");
        out.push_str("PubkeyAuthentication yes\n");
        out.push_str("PermitEmptyPasswords no\n");
        out.push_str("MaxAuthTries 3\n");
        out.push_str("LoginGraceTime 30\n");
        out.push_str("X11Forwarding no\n");
        out.push_str("AllowAgentForwarding no\n");
        out.push_str("AllowTcpForwarding no\n");
        out.push_str("ClientAliveInterval 300\n");
        out.push_str("ClientAliveCountMax 2\n");
        out.push_str(&format!("AllowUsers {}\n", self.allow_users.join(" ")));
        Ok(out)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("ssh port must be non-zero");
        }
        if self.allow_users.is_empty() {
            bail!("AllowUsers would lock every account out");
        }
        if let Some(bad) = self.allow_users.iter().find(|u| !valid_username(u)) {
            bail!("invalid user in AllowUsers: {bad:?}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_password_auth_when_asked() {
        let t = SshdHardening {
            port: 2222,
            allow_users: vec!["operator".into()],
            password_authentication: true,
        };
        let text = t.render().unwrap();
        assert!(text.contains("Port 2222\n"));
        assert!(text.contains("PasswordAuthentication yes\n"));
        assert!(text.contains("PermitRootLogin no\n"));
        assert!(text.contains("AllowUsers operator\n"));
    }

    #[test]
    fn empty_allow_list_is_rejected() {
        let t = SshdHardening {
            port: 22,
            allow_users: Vec::new(),
            password_authentication: false,
        };
        assert!(t.validate().is_err());
    }
}
