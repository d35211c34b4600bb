//! Report printing, as text or JSON.

use anyhow::Result;
use namada_workflow::{VerifyReport, WorkflowReport};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub workflow: &'a WorkflowReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<&'a VerifyReport>,
}

pub fn print_run(
    out: &mut dyn Write,
    report: &WorkflowReport,
    verify: Option<&VerifyReport>,
    json: bool,
) -> Result<()> {
    if json {
        let summary = RunSummary {
            workflow: report,
            verify,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }
    writeln!(out, "{report}")?;
    if let Some(verify) = verify {
        writeln!(out)?;
        writeln!(out, "{verify}")?;
    }
    Ok(())
}

pub fn print_verify(out: &mut dyn Write, report: &VerifyReport, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
    } else {
        writeln!(out, "{report}")?;
    }
    Ok(())
}
