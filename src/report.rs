//! End-of-run CSV reports and the run summary.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{Outcome, Verdict};
use crate::utils::error::Result;

#[derive(Serialize)]
struct AcceptedRow<'a> {
    product_link: &'a str,
}

#[derive(Serialize)]
struct StatusRow<'a> {
    product_link: &'a str,
    status: &'static str,
    reason: String,
}

/// One `product_link` row per passing product. Nothing is written (and no
/// file is created) when none passed; returns the row count.
pub fn write_accepted(path: &Path, verdicts: &[Verdict]) -> Result<usize> {
    let passed: Vec<&Verdict> = verdicts.iter().filter(|v| v.passed()).collect();
    if passed.is_empty() {
        return Ok(0);
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for verdict in &passed {
        wtr.serialize(AcceptedRow {
            product_link: verdict.identifier.as_str(),
        })?;
    }
    wtr.flush()?;
    Ok(passed.len())
}

/// Full verdict log, one row per processed product, in processing order.
pub fn write_status(path: &Path, verdicts: &[Verdict]) -> Result<usize> {
    if verdicts.is_empty() {
        return Ok(0);
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for verdict in verdicts {
        wtr.serialize(StatusRow {
            product_link: verdict.identifier.as_str(),
            status: verdict.outcome.as_str(),
            reason: verdict.reason.to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(verdicts.len())
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub accepted: PathBuf,
    pub status: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(total: usize, verdicts: &[Verdict], interrupted: bool) -> Self {
        let count = |outcome: Outcome| verdicts.iter().filter(|v| v.outcome == outcome).count();
        Self {
            total,
            processed: verdicts.len(),
            passed: count(Outcome::Pass),
            failed: count(Outcome::Fail),
            errored: count(Outcome::Error),
            interrupted,
        }
    }

    pub fn log(&self) {
        info!(
            total = self.total,
            processed = self.processed,
            passed = self.passed,
            failed = self.failed,
            errored = self.errored,
            interrupted = self.interrupted,
            "Run summary"
        );
    }
}

/// Writes both reports; returns how many rows went into each.
pub fn write_reports(paths: &ReportPaths, verdicts: &[Verdict]) -> Result<(usize, usize)> {
    let accepted = write_accepted(&paths.accepted, verdicts)?;
    if accepted > 0 {
        info!("Saved {} passing links to {}", accepted, paths.accepted.display());
    } else {
        info!("No links passed the filters");
    }

    let logged = write_status(&paths.status, verdicts)?;
    if logged > 0 {
        info!("Status log saved to {}", paths.status.display());
    }
    Ok((accepted, logged))
}
