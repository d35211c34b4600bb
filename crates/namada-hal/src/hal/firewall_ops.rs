//! Host firewall (ufw) operations and output parsing.

use crate::HalResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
    /// Allow with connection rate limiting.
    Limit,
    Deny,
}

impl RuleAction {
    fn as_str(self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Limit => "limit",
            RuleAction::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Deny,
    Reject,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Allow => "allow",
            Policy::Deny => "deny",
            Policy::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub action: RuleAction,
    pub port: u16,
    pub protocol: Protocol,
    pub comment: Option<String>,
}

impl FirewallRule {
    pub fn allow_tcp(port: u16, comment: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Allow,
            port,
            protocol: Protocol::Tcp,
            comment: Some(comment.into()),
        }
    }

    pub fn limit_tcp(port: u16, comment: impl Into<String>) -> Self {
        Self {
            action: RuleAction::Limit,
            port,
            protocol: Protocol::Tcp,
            comment: Some(comment.into()),
        }
    }

    /// `22/tcp`, or the bare port for any protocol.
    pub fn port_spec(&self) -> String {
        match self.protocol {
            Protocol::Tcp => format!("{}/tcp", self.port),
            Protocol::Udp => format!("{}/udp", self.port),
            Protocol::Any => self.port.to_string(),
        }
    }

    pub fn ufw_args(&self) -> Vec<String> {
        let mut args = vec![self.action.as_str().to_string(), self.port_spec()];
        if let Some(comment) = &self.comment {
            args.push("comment".to_string());
            args.push(comment.clone());
        }
        args
    }

    /// Matches a `ufw show added` line, ignoring the comment.
    pub fn matches_added(&self, line: &str) -> bool {
        let mut tokens = line.split_whitespace();
        tokens.next() == Some("ufw")
            && tokens.next() == Some(self.action.as_str())
            && tokens.next() == Some(self.port_spec().as_str())
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ufw {}", self.ufw_args().join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallStatus {
    pub active: bool,
    pub default_incoming: Option<String>,
    pub default_outgoing: Option<String>,
}

pub trait FirewallOps {
    fn firewall_status(&self) -> HalResult<FirewallStatus>;
    /// Rules in `ufw show added` form, whether or not the firewall is active.
    fn firewall_rules(&self) -> HalResult<Vec<String>>;

    fn set_default_policy(&self, incoming: Policy, outgoing: Policy) -> HalResult<()>;
    fn add_rule(&self, rule: &FirewallRule) -> HalResult<()>;
    fn enable_firewall(&self) -> HalResult<()>;
}

/// Parse `ufw status verbose`.
pub fn parse_ufw_status(output: &str) -> FirewallStatus {
    let mut status = FirewallStatus::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Status:") {
            status.active = value.trim() == "active";
        } else if let Some(value) = line.strip_prefix("Default:") {
            for part in value.split(',') {
                let part = part.trim();
                let Some((policy, direction)) = part.split_once(' ') else {
                    continue;
                };
                let direction = direction.trim().trim_matches(|c| c == '(' || c == ')');
                match direction {
                    "incoming" => status.default_incoming = Some(policy.to_string()),
                    "outgoing" => status.default_outgoing = Some(policy.to_string()),
                    _ => {}
                }
            }
        }
    }
    status
}

/// Parse `ufw show added` into rule lines.
pub fn parse_added_rules(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ufw "))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE: &str = "Status: active\nLogging: on (low)\nDefault: deny (incoming), allow (outgoing), disabled (routed)\nNew profiles: skip\n\nTo                         Action      From\n--                         ------      ----\n22/tcp                     LIMIT IN    Anywhere\n";

    #[test]
    fn parses_active_status_with_defaults() {
        let status = parse_ufw_status(ACTIVE);
        assert!(status.active);
        assert_eq!(status.default_incoming.as_deref(), Some("deny"));
        assert_eq!(status.default_outgoing.as_deref(), Some("allow"));
    }

    #[test]
    fn parses_inactive_status() {
        let status = parse_ufw_status("Status: inactive\n");
        assert!(!status.active);
        assert_eq!(status.default_incoming, None);
    }

    #[test]
    fn added_rules_skip_header() {
        let out = "Added user rules (see 'ufw status' for running firewall):\nufw limit 22/tcp comment 'ssh'\nufw allow 26656/tcp\n";
        let rules = parse_added_rules(out);
        assert_eq!(rules.len(), 2);
        assert!(FirewallRule::limit_tcp(22, "ssh").matches_added(&rules[0]));
        assert!(FirewallRule::allow_tcp(26656, "p2p").matches_added(&rules[1]));
        assert!(!FirewallRule::allow_tcp(22, "ssh").matches_added(&rules[0]));
        assert!(parse_added_rules("(None)\n").is_empty());
    }

    #[test]
    fn rule_args_carry_comment() {
        let rule = FirewallRule::limit_tcp(22, "ssh");
        assert_eq!(rule.ufw_args(), vec!["limit", "22/tcp", "comment", "ssh"]);
        assert_eq!(rule.to_string(), "ufw limit 22/tcp comment ssh");
    }
}
