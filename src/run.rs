//! One full run: acquire, archive, compare.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::acquire::Orchestrator;
use crate::browser::{Backend, BackendKind};
use crate::config::{RunConfig, SessionCredentials};
use crate::detect::{ChangeDetector, ReportFile};
use crate::error::Result;
use crate::snapshot::SnapshotArchive;

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// `None` when the snapshot could not be written.
    pub snapshot: Option<PathBuf>,
    pub backend: BackendKind,
    /// `None` when there was no earlier snapshot to compare against.
    pub report: Option<ReportFile>,
    pub pruned: usize,
}

impl RunSummary {
    pub fn has_changes(&self) -> bool {
        self.report.as_ref().is_some_and(ReportFile::has_changes)
    }
}

/// Run with the default backend order.
pub async fn execute(config: &RunConfig, credentials: &SessionCredentials) -> Result<RunSummary> {
    execute_with(Orchestrator::new(config, credentials), config).await
}

/// Run with an explicit backend list.
pub async fn execute_with_backends(
    backends: Vec<Box<dyn Backend>>,
    config: &RunConfig,
    credentials: &SessionCredentials,
) -> Result<RunSummary> {
    execute_with(Orchestrator::with_backends(backends, config, credentials), config).await
}

async fn execute_with(orchestrator: Orchestrator<'_>, config: &RunConfig) -> Result<RunSummary> {
    let snapshot = orchestrator.acquire().await?;

    let archive = SnapshotArchive::new(config.snapshot_dir());
    let current = match archive.save(&snapshot) {
        Ok(path) => path,
        Err(e) => {
            error!("Snapshot not saved, skipping comparison: {}", e);
            return Ok(RunSummary {
                snapshot: None,
                backend: snapshot.backend,
                report: None,
                pruned: 0,
            });
        }
    };

    let report = match archive.latest_excluding(&current) {
        Ok(Some(previous)) => {
            info!("Comparing with {}", previous.display());
            let detector = ChangeDetector::new(&config.comparison_output);
            Some(detector.compare_and_persist(&previous, &current))
        }
        Ok(None) => {
            info!("No previous snapshot found, skipping comparison");
            None
        }
        Err(e) => {
            warn!("Cannot list earlier snapshots, skipping comparison: {}", e);
            None
        }
    };

    let pruned = match config.snapshot_retention_days {
        Some(days) => archive.prune_older_than(days).unwrap_or_else(|e| {
            warn!("Snapshot cleanup failed: {}", e);
            0
        }),
        None => 0,
    };

    Ok(RunSummary {
        snapshot: Some(current),
        backend: snapshot.backend,
        report,
        pruned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBackend, FakeContext};
    use crate::error::ScrapeError;
    use std::fs;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (RunConfig, SessionCredentials) {
        let mut config = RunConfig::new("https://chat.example.com");
        config.repo_path = dir.path().to_path_buf();
        config.comparison_output = dir.path().join("changes.json");
        let mut creds = SessionCredentials::new("https://chat.example.com");
        creds.use_cookies = false;
        (config, creds)
    }

    fn serving(html: &str) -> Vec<Box<dyn Backend>> {
        vec![Box::new(FakeBackend::new(
            BackendKind::Stealth,
            FakeContext::new().with_page("Chat", html),
        ))]
    }

    fn page(body: &str) -> String {
        format!("<html><body>\n<p>{}</p>\n{}\n</body></html>", body, "<div>filler</div>\n".repeat(40))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_skips_comparison() {
        let dir = TempDir::new().unwrap();
        let (config, creds) = setup(&dir);
        fs::write(&config.comparison_output, "untouched").unwrap();

        let summary = execute_with_backends(serving(&page("hello")), &config, &creds)
            .await
            .unwrap();

        assert!(summary.report.is_none());
        assert!(!summary.has_changes());
        assert!(summary.snapshot.unwrap().starts_with(config.snapshot_dir()));
        assert_eq!(fs::read_to_string(&config.comparison_output).unwrap(), "untouched");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_compares_with_previous() {
        let dir = TempDir::new().unwrap();
        let (config, creds) = setup(&dir);

        execute_with_backends(serving(&page("hello")), &config, &creds)
            .await
            .unwrap();
        let summary = execute_with_backends(serving(&page("hello again")), &config, &creds)
            .await
            .unwrap();

        assert!(summary.has_changes());
        let report = ReportFile::read(&config.comparison_output).unwrap();
        assert!(report.has_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwritable_archive_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let (mut config, creds) = setup(&dir);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        config.repo_path = blocker;

        let summary = execute_with_backends(serving(&page("hello")), &config, &creds)
            .await
            .unwrap();

        assert!(summary.snapshot.is_none());
        assert!(summary.report.is_none());
        assert_eq!(summary.backend, BackendKind::Stealth);
        assert!(!config.comparison_output.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_backends_write_nothing() {
        let dir = TempDir::new().unwrap();
        let (config, creds) = setup(&dir);

        let err = execute_with_backends(serving("<html><body>tiny</body></html>"), &config, &creds)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::AllBackendsExhausted { .. }));
        assert!(!config.snapshot_dir().exists());
        assert!(!config.comparison_output.exists());
    }
}
