//! Reviewer target list ingestion
//!
//! The list is a CSV export with at least a `Name` and an `Action` column, in any
//! order and alongside any other review columns.

use crate::error::{ExposureGuardError, ExposureGuardResult};
use crate::types::{RemediationTarget, TargetAction};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

const NAME_COLUMN: &str = "name";
const ACTION_COLUMN: &str = "action";

/// Loose bucket-name check; legacy buckets may contain uppercase and underscores.
fn bucket_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{1,253}[A-Za-z0-9]$")
            .expect("bucket name pattern is valid")
    })
}

pub fn is_valid_bucket_name(name: &str) -> bool {
    bucket_name_pattern().is_match(name)
}

fn column_index(header: &StringRecord, column: &str) -> ExposureGuardResult<usize> {
    header
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            ExposureGuardError::target_list(format!("missing '{}' column in header", column))
        })
}

fn csv_error(err: csv::Error) -> ExposureGuardError {
    match err.position() {
        Some(pos) => ExposureGuardError::target_list(format!("line {}: {}", pos.line(), err)),
        None => ExposureGuardError::target_list(err.to_string()),
    }
}

/// Parse CSV text into targets, in file order.
///
/// Exact duplicate rows collapse into one target; the same bucket with two different
/// actions is rejected rather than guessed at.
pub fn parse_target_list(text: &str) -> ExposureGuardResult<Vec<RemediationTarget>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().map_err(csv_error)?.clone();
    if header.iter().all(str::is_empty) {
        return Err(ExposureGuardError::target_list("file is empty"));
    }
    let name_idx = column_index(&header, NAME_COLUMN)?;
    let action_idx = column_index(&header, ACTION_COLUMN)?;

    let mut targets: Vec<RemediationTarget> = Vec::new();
    let mut seen: HashMap<String, TargetAction> = HashMap::new();

    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line_no = record.position().map_or(0, |p| p.line());

        let name = record.get(name_idx).unwrap_or_default();
        let raw_action = record.get(action_idx).unwrap_or_default();

        if !is_valid_bucket_name(name) {
            return Err(ExposureGuardError::target_list(format!(
                "line {line_no}: invalid bucket name '{name}'"
            )));
        }
        let action = TargetAction::parse(raw_action).ok_or_else(|| {
            ExposureGuardError::target_list(format!(
                "line {line_no}: unknown action '{raw_action}' for bucket '{name}' \
                 (expected KEEP, DELETE, RESTRICT or UNRESTRICT)"
            ))
        })?;

        match seen.get(name) {
            Some(previous) if *previous == action => {
                debug!("Line {}: duplicate entry for bucket '{}' ignored", line_no, name);
            }
            Some(previous) => {
                return Err(ExposureGuardError::target_list(format!(
                    "line {line_no}: bucket '{name}' listed as both {previous} and {action}"
                )));
            }
            None => {
                seen.insert(name.to_string(), action);
                targets.push(RemediationTarget::new(name, action));
            }
        }
    }

    info!("Loaded {} targets from target list", targets.len());
    Ok(targets)
}

pub async fn load_target_list(
    path: impl AsRef<Path>,
) -> ExposureGuardResult<Vec<RemediationTarget>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        ExposureGuardError::target_list(format!("cannot read '{}': {e}", path.display()))
    })?;
    parse_target_list(&text)
}
