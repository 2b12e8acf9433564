//! The change report written after every comparison.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use super::diff::{DiffOutcome, SUMMARY_LINES};
use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub additions: usize,
    pub deletions: usize,
    pub has_changes: bool,
    pub diff_summary: String,
    pub previous_file: String,
    pub current_file: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeReport {
    pub fn from_diff(diff: &DiffOutcome, previous: &Path, current: &Path) -> Self {
        Self {
            additions: diff.additions,
            deletions: diff.deletions,
            has_changes: diff.has_changes(),
            diff_summary: diff.summary(SUMMARY_LINES),
            previous_file: previous.display().to_string(),
            current_file: current.display().to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub error: String,
    pub has_changes: bool,
    pub timestamp: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            has_changes: false,
            timestamp: Utc::now(),
        }
    }
}

/// Either report shape, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportFile {
    Change(ChangeReport),
    Failure(FailureReport),
}

impl ReportFile {
    pub fn has_changes(&self) -> bool {
        match self {
            Self::Change(report) => report.has_changes,
            Self::Failure(_) => false,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ScrapeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Replace the report at `path` in one step: readers see either the old
    /// report or the new one, never a partial write.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let persist_err = |source: std::io::Error| ScrapeError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(persist_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(json.as_bytes()).map_err(persist_err)?;
        tmp.write_all(b"\n").map_err(persist_err)?;
        tmp.persist(path).map_err(|e| persist_err(e.error))?;

        info!("Comparison results saved to {}", path.display());
        Ok(())
    }
}
