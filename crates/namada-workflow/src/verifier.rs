//! Post-workflow verifier.
//!
//! A fixed checklist evaluated independently of per-step verification. Every check runs even
//! when others fail. Results are advisory: failures are logged, nothing is remediated.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProbeFn<'a, C> = Box<dyn Fn(&C) -> Result<bool> + 'a>;

pub struct Check<'a, C> {
    pub name: String,
    pub probe: ProbeFn<'a, C>,
}

impl<'a, C> Check<'a, C> {
    pub fn new(name: impl Into<String>, probe: impl Fn(&C) -> Result<bool> + 'a) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(probe),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The probe itself could not run.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Pass)
    }

    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .collect()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Verification")?;
        for check in &self.checks {
            let mark = match check.status {
                CheckStatus::Pass => "✅ pass",
                CheckStatus::Fail => "⚠️  FAIL",
                CheckStatus::Error => "❌ ERROR",
            };
            write!(f, "  {:<36} {}", check.name, mark)?;
            if let Some(detail) = &check.detail {
                write!(f, " ({detail})")?;
            }
            writeln!(f)?;
        }
        let passed = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count();
        write!(f, "{}/{} checks passed", passed, self.checks.len())
    }
}

pub struct Verifier<'a, C> {
    checks: Vec<Check<'a, C>>,
}

impl<'a, C> Verifier<'a, C> {
    pub fn new(checks: Vec<Check<'a, C>>) -> Self {
        Self { checks }
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn run(&self, ctx: &C) -> VerifyReport {
        let checks = self
            .checks
            .iter()
            .map(|check| {
                let (status, detail) = match (check.probe)(ctx) {
                    Ok(true) => (CheckStatus::Pass, None),
                    Ok(false) => {
                        log::warn!("⚠️  verify: {} failed", check.name);
                        (CheckStatus::Fail, None)
                    }
                    Err(err) => {
                        log::warn!("⚠️  verify: {} could not be checked: {:#}", check.name, err);
                        (CheckStatus::Error, Some(format!("{err:#}")))
                    }
                };
                CheckResult {
                    name: check.name.clone(),
                    status,
                    detail,
                }
            })
            .collect();
        VerifyReport { checks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Host {
        firewall_active: bool,
        service_active: bool,
    }

    fn verifier<'a>() -> Verifier<'a, Host> {
        Verifier::new(vec![
            Check::new("firewall active", |h: &Host| Ok(h.firewall_active)),
            Check::new("node service active", |h: &Host| Ok(h.service_active)),
            Check::new("binary present", |_h: &Host| anyhow::bail!("permission denied")),
        ])
    }

    #[test]
    fn failing_check_does_not_mask_independent_checks() {
        let host = Host {
            firewall_active: false,
            service_active: true,
        };
        let report = verifier().run(&host);
        assert_eq!(report.status_of("firewall active"), Some(CheckStatus::Fail));
        assert_eq!(report.status_of("node service active"), Some(CheckStatus::Pass));
        assert_eq!(report.status_of("binary present"), Some(CheckStatus::Error));
        assert!(!report.all_passed());
        assert_eq!(report.failures().len(), 2);
    }

    #[test]
    fn summary_counts_passes() {
        let host = Host {
            firewall_active: true,
            service_active: true,
        };
        let text = verifier().run(&host).to_string();
        assert!(text.ends_with("2/3 checks passed"));
        assert!(text.contains("permission denied"));
    }
}
