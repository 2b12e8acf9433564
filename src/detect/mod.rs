//! Change detection between two page snapshots.
//!
//! Both snapshots are normalized (noise subtrees removed, body re-serialized),
//! diffed line by line, and the result is written as a JSON report that
//! replaces the previous one.

pub mod diff;
pub mod normalize;
pub mod report;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

pub use diff::{unified_diff, DiffOutcome};
pub use normalize::{MarkupNormalizer, ScraperNormalizer};
pub use report::{ChangeReport, FailureReport, ReportFile};

use crate::error::{Result, ScrapeError};

pub struct ChangeDetector<N = ScraperNormalizer> {
    normalizer: N,
    output: PathBuf,
}

impl ChangeDetector {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self::with_normalizer(ScraperNormalizer::default(), output)
    }
}

impl<N: MarkupNormalizer> ChangeDetector<N> {
    pub fn with_normalizer(normalizer: N, output: impl Into<PathBuf>) -> Self {
        Self {
            normalizer,
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Normalize and diff the two artifacts without writing anything.
    pub fn compare(&self, previous: &Path, current: &Path) -> Result<ChangeReport> {
        let previous_text = normalize::normalize_or_raw(&self.normalizer, &read_snapshot(previous)?);
        let current_text = normalize::normalize_or_raw(&self.normalizer, &read_snapshot(current)?);

        let outcome = unified_diff(
            &previous_text,
            &current_text,
            &previous.display().to_string(),
            &current.display().to_string(),
        );
        Ok(ChangeReport::from_diff(&outcome, previous, current))
    }

    /// Compare and write the report. Always leaves a valid report on disk
    /// when the output location is writable; failures become an error report.
    pub fn compare_and_persist(&self, previous: &Path, current: &Path) -> ReportFile {
        let report = match self.compare(previous, current) {
            Ok(report) => {
                if report.has_changes {
                    info!(
                        additions = report.additions,
                        deletions = report.deletions,
                        "Changes detected"
                    );
                } else {
                    info!("No changes detected");
                }
                ReportFile::Change(report)
            }
            Err(e) => {
                error!("Comparison failed: {}", e);
                ReportFile::Failure(FailureReport::new(e.to_string()))
            }
        };

        match report.write(&self.output) {
            Ok(()) => report,
            Err(e) => {
                error!("Could not write report: {}", e);
                let minimal = ReportFile::Failure(FailureReport::new(e.to_string()));
                if let Err(e) = minimal.write(&self.output) {
                    error!("Could not write error report: {}", e);
                }
                minimal
            }
        }
    }
}

fn read_snapshot(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| ScrapeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
