//! Timestamped page snapshots on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::browser::BackendKind;
use crate::error::{Result, ScrapeError};

const ARTIFACT_EXTENSION: &str = "html";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Raw HTML captured by one successful acquisition.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub html: String,
    pub captured_at: DateTime<Utc>,
    pub source_url: String,
    pub backend: BackendKind,
}

impl PageSnapshot {
    pub fn new(html: String, source_url: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            html,
            captured_at: Utc::now(),
            source_url: source_url.into(),
            backend,
        }
    }

    /// `<source>_<UTC timestamp>.html`
    pub fn artifact_name(&self) -> String {
        format!(
            "{}_{}.{}",
            source_label(&self.source_url),
            self.captured_at.format("%Y%m%dT%H%M%SZ"),
            ARTIFACT_EXTENSION
        )
    }
}

/// Append-only directory of snapshot artifacts.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    dir: PathBuf,
}

impl SnapshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `snapshot` as a new artifact and return its path. Never
    /// overwrites an existing artifact.
    pub fn save(&self, snapshot: &PageSnapshot) -> Result<PathBuf> {
        let persist_err = |path: &Path, source: io::Error| ScrapeError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|e| persist_err(&self.dir, e))?;

        let name = snapshot.artifact_name();
        let mut path = self.dir.join(&name);
        let mut n = 1;
        while path.exists() {
            let stem = name.trim_end_matches(".html");
            path = self.dir.join(format!("{}-{}.{}", stem, n, ARTIFACT_EXTENSION));
            n += 1;
        }

        fs::write(&path, &snapshot.html).map_err(|e| persist_err(&path, e))?;
        info!(
            backend = %snapshot.backend,
            bytes = snapshot.html.len(),
            "Snapshot saved to {}",
            path.display()
        );
        Ok(path)
    }

    /// Every `.html` artifact with its modification time. A missing
    /// directory is an empty archive.
    pub fn artifacts(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_artifact = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION));
            if !is_artifact {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                artifacts.push((path, meta.modified()?));
            }
        }
        Ok(artifacts)
    }

    /// Most recently modified artifact other than `exclude`.
    pub fn latest_excluding(&self, exclude: &Path) -> Result<Option<PathBuf>> {
        let excluded = fs::canonicalize(exclude).unwrap_or_else(|_| exclude.to_path_buf());
        let latest = self
            .artifacts()?
            .into_iter()
            .filter(|(path, _)| {
                let candidate = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                candidate != excluded
            })
            .max_by(|(a_path, a_time), (b_path, b_time)| {
                a_time.cmp(b_time).then_with(|| a_path.cmp(b_path))
            })
            .map(|(path, _)| path);

        match &latest {
            Some(path) => debug!("Previous snapshot: {}", path.display()),
            None => debug!("No previous snapshot in {}", self.dir.display()),
        }
        Ok(latest)
    }

    /// Delete artifacts last modified more than `days` days ago. Returns
    /// how many were removed.
    pub fn prune_older_than(&self, days: u64) -> Result<usize> {
        let age = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for (path, modified) in self.artifacts()? {
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed old snapshot: {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Short label for artifact names: the first host label without `www.`.
pub fn source_label(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .map(|h| {
            let host = h.strip_prefix("www.").unwrap_or(&h);
            host.split('.').next().unwrap_or(host).to_string()
        })
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "page".to_string())
}
