//! Human-readable output on stderr, public bucket names on stdout, JSON reports on disk.

use anyhow::{Context, Result};
use colored::Colorize;
use s3_exposure_guard_core::{
    AccessBlockConfiguration, AccessBlockState, AuditSummary, Outcome, PlannedAction,
    RemediationMode, RemediationSummary, Verdict,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::Path;

pub fn print_plan(plan: &[PlannedAction]) {
    eprintln!("{}", "Remediation plan:".bold());
    for step in plan {
        match step {
            PlannedAction::Execute { bucket, mode } => {
                let label = format!("{mode:?}").to_uppercase();
                let label = if mode.is_destructive() {
                    label.red().bold()
                } else {
                    label.yellow().bold()
                };
                eprintln!("  {:<12} {}", label, bucket);
            }
            PlannedAction::Skip {
                bucket,
                action,
                reason,
            } => eprintln!("  {:<12} {} ({}, {:?})", "skip".dimmed(), bucket, action, reason),
        }
    }
}

pub fn print_audit(summary: &AuditSummary) {
    for report in &summary.reports {
        let verdict = match report.verdict {
            Verdict::Public => "PUBLIC".red().bold(),
            Verdict::Private => "private".green(),
        };
        let access_block = match report.access_block {
            AccessBlockState::Configured(config)
                if config == AccessBlockConfiguration::fully_blocked() =>
            {
                "fully blocked"
            }
            AccessBlockState::Configured(_) => "partially blocked",
            AccessBlockState::Absent => "no access block",
        };
        let coverage = if report.scan_complete {
            String::new()
        } else {
            " (object scan incomplete)".to_string()
        };
        eprintln!(
            "  {:<8} {} [{}, {} public grants, {} objects]{}",
            verdict,
            report.bucket,
            access_block,
            report.public_grants.len(),
            report.objects_scanned,
            coverage
        );
    }
    for failure in &summary.failures {
        eprintln!("  {:<8} {}: {}", "FAILED".red(), failure.bucket, failure.reason);
    }
    if !summary.not_audited.is_empty() {
        eprintln!(
            "{} {} buckets not audited: {}",
            "Cancelled:".yellow().bold(),
            summary.not_audited.len(),
            summary.not_audited.join(", ")
        );
    }
    eprintln!(
        "{} {} public, {} audited, {} failed",
        "Audit:".bold(),
        summary.public_buckets.len(),
        summary.reports.len(),
        summary.failures.len()
    );

    // Machine-consumable part: one public bucket per line
    for bucket in &summary.public_buckets {
        println!("{bucket}");
    }
}

pub fn print_remediation(summary: &RemediationSummary) {
    for entry in &summary.outcomes {
        match &entry.outcome {
            Outcome::Success => eprintln!("  {:<8} {}", "ok".green(), entry.bucket),
            Outcome::Skipped(reason) => {
                eprintln!("  {:<8} {} ({:?})", "skipped".dimmed(), entry.bucket, reason);
            }
            Outcome::Failed(reason) => {
                eprintln!("  {:<8} {}: {}", "FAILED".red().bold(), entry.bucket, reason);
            }
        }
    }
    eprintln!(
        "{} {} succeeded, {} skipped, {} failed",
        "Remediation:".bold(),
        summary.success,
        summary.skipped,
        summary.failed
    );
}

/// Ask on the terminal. Destructive modes need the mode name typed out.
pub fn confirm(mode: RemediationMode, executions: usize) -> Result<bool> {
    let word = format!("{mode:?}").to_lowercase();
    if mode.is_destructive() {
        eprint!(
            "This will permanently {} {} buckets. Type '{}' to continue: ",
            word, executions, word
        );
    } else {
        eprint!("Apply {} to {} buckets? [y/N]: ", word, executions);
    }
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(accepts(mode, &answer))
}

fn accepts(mode: RemediationMode, answer: &str) -> bool {
    let answer = answer.trim().to_ascii_lowercase();
    if mode.is_destructive() {
        answer == format!("{mode:?}").to_lowercase()
    } else {
        matches!(answer.as_str(), "y" | "yes")
    }
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write report to '{}'", path.display()))?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_confirmation_needs_the_word() {
        assert!(accepts(RemediationMode::Delete, "delete\n"));
        assert!(accepts(RemediationMode::Delete, "  DELETE "));
        assert!(!accepts(RemediationMode::Delete, "y"));
        assert!(!accepts(RemediationMode::Delete, ""));
    }

    #[test]
    fn test_non_destructive_confirmation() {
        assert!(accepts(RemediationMode::Restrict, "y\n"));
        assert!(accepts(RemediationMode::Unrestrict, "Yes"));
        assert!(!accepts(RemediationMode::Restrict, "n"));
        assert!(!accepts(RemediationMode::Restrict, "\n"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let summary = RemediationSummary::from_outcomes("run".to_string(), None, Vec::new());
        write_report(&path, &summary).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["run_id"], "run");
        assert_eq!(written["failed"], 0);
    }
}
