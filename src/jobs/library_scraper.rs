//! Library scrape job
//!
//! One run walks every configured root in order, resolves each media file's
//! identity and hands it to the metadata scraper. Per-file failures are
//! counted in the [`RunSummary`] and never abort the run.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScraperSettings;
use crate::services::artwork::MetadataScraper;
use crate::services::identity::IdentityResolver;
use crate::services::path_matcher::{PathMatcher, normalize};
use crate::services::scanner::LibraryWalker;

/// Immutable inputs of a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeConfiguration {
    pub roots: Vec<PathBuf>,
    pub exclusions: Vec<PathBuf>,
    pub extensions: Vec<String>,
}

impl ScrapeConfiguration {
    pub fn from_settings(settings: &ScraperSettings, extensions: &[String]) -> Self {
        Self {
            roots: settings.roots(),
            exclusions: settings.exclusions(),
            extensions: extensions.to_vec(),
        }
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub roots_scanned: usize,
    pub roots_skipped: usize,
    pub files_seen: usize,
    pub resolved: usize,
    pub scraped: usize,
    pub unresolved: usize,
    pub scrape_failed: usize,
    pub outcome: RunOutcome,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            roots_scanned: 0,
            roots_skipped: 0,
            files_seen: 0,
            resolved: 0,
            scraped: 0,
            unresolved: 0,
            scrape_failed: 0,
            outcome: RunOutcome::Completed,
        }
    }
}

impl RunSummary {
    /// Files that were neither resolved nor scraped successfully
    pub fn failed(&self) -> usize {
        self.unresolved + self.scrape_failed
    }
}

/// Per-run shared state. A new run always gets a fresh one.
#[derive(Debug)]
pub struct RunState {
    token: CancellationToken,
    status: Mutex<RunStatus>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            status: Mutex::new(RunStatus::Idle),
        }
    }

    /// Ask the run to stop at its next checkpoint. Idempotent.
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock() = status;
    }
}

/// Orchestrates a scrape over all configured roots
pub struct ScrapeRunner {
    resolver: IdentityResolver,
    scraper: Arc<dyn MetadataScraper>,
}

impl ScrapeRunner {
    pub fn new(resolver: IdentityResolver, scraper: Arc<dyn MetadataScraper>) -> Self {
        Self { resolver, scraper }
    }

    /// Execute one run. Cancellation is checked before every root and every file.
    pub async fn run(&self, config: &ScrapeConfiguration, state: &RunState) -> RunSummary {
        state.set_status(RunStatus::Running);
        let mut summary = RunSummary::default();

        if config.roots.is_empty() {
            info!("No library paths configured, nothing to scrape");
            state.set_status(RunStatus::Completed);
            return summary;
        }

        let exclusions = PathMatcher::new(&config.exclusions);
        for missing in exclusions.roots().iter().filter(|p| !p.exists()) {
            warn!(path = %missing.display(), "Exclusion path does not exist");
        }
        let walker = LibraryWalker::new(&config.extensions, exclusions);

        info!(
            roots = config.roots.len(),
            exclusions = config.exclusions.len(),
            "Starting library scrape"
        );

        'roots: for root in &config.roots {
            if state.is_cancelled() {
                summary.outcome = RunOutcome::Cancelled;
                break;
            }

            let root = normalize(root);
            if !root.exists() {
                warn!(path = %root.display(), "Library path does not exist, skipping");
                summary.roots_skipped += 1;
                continue;
            }

            info!(path = %root.display(), "Scraping library path");
            summary.roots_scanned += 1;

            for file in walker.walk(&root) {
                if state.is_cancelled() {
                    summary.outcome = RunOutcome::Cancelled;
                    break 'roots;
                }

                summary.files_seen += 1;
                debug!(file = %file.path.display(), kind = %file.kind(), "Processing media file");

                let Some(identity) = self.resolver.resolve(&file).await else {
                    summary.unresolved += 1;
                    continue;
                };
                summary.resolved += 1;

                match self.scraper.scrape(&root, &file, &identity).await {
                    Ok(report) => {
                        summary.scraped += 1;
                        debug!(
                            file = %file.path.display(),
                            written = report.written.len(),
                            "Scraped metadata"
                        );
                    }
                    Err(e) => {
                        summary.scrape_failed += 1;
                        warn!(file = %file.path.display(), error = %e, "Failed to scrape metadata");
                    }
                }
            }
        }

        let status = match summary.outcome {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::Cancelled => RunStatus::Cancelled,
        };
        state.set_status(status);

        info!(
            outcome = ?summary.outcome,
            roots_scanned = summary.roots_scanned,
            roots_skipped = summary.roots_skipped,
            files_seen = summary.files_seen,
            scraped = summary.scraped,
            failed = summary.failed(),
            "Library scrape finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use crate::services::artwork::{ScrapeError, ScrapeReport};
    use crate::services::filename_parser::MediaKind;
    use crate::services::metadata::{HeuristicQuery, MediaIdentity, MediaRecognizer};
    use crate::services::scanner::DiscoveredFile;

    struct NoopRecognizer;

    #[async_trait]
    impl MediaRecognizer for NoopRecognizer {
        async fn recognize_by_id(&self, _id: &str, _kind: MediaKind) -> Result<Option<MediaIdentity>> {
            Ok(None)
        }

        async fn recognize_by_heuristic(&self, _query: &HeuristicQuery) -> Result<Option<MediaIdentity>> {
            Ok(None)
        }
    }

    struct NoopScraper;

    #[async_trait]
    impl MetadataScraper for NoopScraper {
        async fn scrape(
            &self,
            _root: &Path,
            _file: &DiscoveredFile,
            _identity: &MediaIdentity,
        ) -> Result<ScrapeReport, ScrapeError> {
            Ok(ScrapeReport::default())
        }
    }

    fn runner() -> ScrapeRunner {
        ScrapeRunner::new(IdentityResolver::new(Arc::new(NoopRecognizer)), Arc::new(NoopScraper))
    }

    #[tokio::test]
    async fn test_no_roots_is_a_completed_noop() {
        let state = RunState::new();
        let summary = runner().run(&ScrapeConfiguration::default(), &state).await;
        assert_eq!(summary, RunSummary::default());
        assert_eq!(state.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_root_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScrapeConfiguration {
            roots: vec![dir.path().join("missing"), dir.path().to_path_buf()],
            exclusions: vec![dir.path().join("also-missing")],
            extensions: vec!["mkv".to_string()],
        };
        let summary = runner().run(&config, &RunState::new()).await;
        assert_eq!(summary.roots_skipped, 1);
        assert_eq!(summary.roots_scanned, 1);
        assert_matches!(summary.outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Movie.2020.mkv"), b"").unwrap();
        let config = ScrapeConfiguration {
            roots: vec![dir.path().to_path_buf()],
            exclusions: vec![],
            extensions: vec!["mkv".to_string()],
        };
        let state = RunState::new();
        state.request_stop();
        state.request_stop();

        let summary = runner().run(&config, &state).await;
        assert_eq!(summary.roots_scanned, 0);
        assert_eq!(summary.files_seen, 0);
        assert_matches!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(state.status(), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unresolved_files_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Movie.2020.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let config = ScrapeConfiguration {
            roots: vec![dir.path().to_path_buf()],
            exclusions: vec![],
            extensions: vec![".MKV".to_string()],
        };
        let summary = runner().run(&config, &RunState::new()).await;
        assert_eq!(summary.files_seen, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn test_configuration_from_settings() {
        let settings = ScraperSettings {
            scraper_paths: "/lib/Movies\n\n/lib/TV".to_string(),
            exclude_paths: "/lib/Movies/Staging".to_string(),
            ..Default::default()
        };
        let config = ScrapeConfiguration::from_settings(&settings, &["mkv".to_string()]);
        assert_eq!(config.roots, vec![PathBuf::from("/lib/Movies"), PathBuf::from("/lib/TV")]);
        assert_eq!(config.exclusions, vec![PathBuf::from("/lib/Movies/Staging")]);
        assert_eq!(config.extensions, vec!["mkv".to_string()]);
    }
}
