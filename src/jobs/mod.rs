//! Background job scheduling
//!
//! [`ScheduledJobController`] owns the cron scheduler and the active scrape
//! run. At most one run is active at a time.

pub mod library_scraper;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::config::ScraperSettings;
use self::library_scraper::{RunState, RunStatus, RunSummary, ScrapeConfiguration, ScrapeRunner};

/// Errors installing the scheduled job
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Convert a crontab expression to the seconds-first form the scheduler expects
pub fn to_scheduler_cron(expression: &str) -> Result<String, ControllerError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(ControllerError::InvalidSchedule {
            expression: expression.to_string(),
            reason: format!("expected 5 fields, got {n}"),
        }),
    }
}

struct ActiveRun {
    state: Arc<RunState>,
    handle: JoinHandle<()>,
}

/// The active run plus the schedule generation allowed to launch runs
#[derive(Default)]
struct RunSlot {
    run: Option<ActiveRun>,
    /// Bumped on every stop; ticks from an older schedule are refused
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launch {
    Started,
    Busy,
    Stale,
}

/// State shared with the cron job closure
struct Shared {
    runner: Arc<ScrapeRunner>,
    slot: Mutex<RunSlot>,
    last_summary: Mutex<Option<RunSummary>>,
}

impl Shared {
    /// Spawn a run unless one is already active. `generation` is the
    /// schedule a cron tick belongs to; manual runs pass `None`.
    fn launch(self: &Arc<Self>, config: ScrapeConfiguration, generation: Option<u64>) -> Launch {
        let mut slot = self.slot.lock();
        if generation.is_some_and(|g| g != slot.generation) {
            return Launch::Stale;
        }
        if slot.run.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            return Launch::Busy;
        }

        let state = Arc::new(RunState::new());
        let shared = Arc::clone(self);
        let run_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let summary = shared.runner.run(&config, &run_state).await;
            *shared.last_summary.lock() = Some(summary);
        });

        slot.run = Some(ActiveRun { state, handle });
        Launch::Started
    }

    fn generation(&self) -> u64 {
        self.slot.lock().generation
    }
}

/// Owns the cron schedule and the lifecycle of scrape runs
pub struct ScheduledJobController {
    shared: Arc<Shared>,
    scheduler: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl ScheduledJobController {
    pub fn new(runner: Arc<ScrapeRunner>) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                slot: Mutex::new(RunSlot::default()),
                last_summary: Mutex::new(None),
            }),
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    /// (Re)install the scheduled job from `settings`.
    ///
    /// Any existing schedule and run are stopped first. When the job is
    /// disabled nothing is installed.
    pub async fn start(
        &self,
        settings: &ScraperSettings,
        extensions: &[String],
    ) -> Result<(), ControllerError> {
        self.stop_and_wait().await;

        if !settings.enabled {
            info!("Library scraper is disabled");
            return Ok(());
        }

        let expression = settings.schedule();
        let cron = to_scheduler_cron(expression)?;
        let config = ScrapeConfiguration::from_settings(settings, extensions);

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| ControllerError::Scheduler(e.to_string()))?;

        let shared = Arc::clone(&self.shared);
        let generation = shared.generation();
        let job_config = config.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let shared = Arc::clone(&shared);
            let config = job_config.clone();
            Box::pin(async move {
                match shared.launch(config, Some(generation)) {
                    Launch::Started => info!("Running scheduled library scrape"),
                    Launch::Busy => {
                        warn!("Previous library scrape still running, skipping this tick")
                    }
                    Launch::Stale => debug!("Schedule was stopped, ignoring tick"),
                }
            })
        })
        .map_err(|e| ControllerError::InvalidSchedule {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        scheduler
            .add(job)
            .await
            .map_err(|e| ControllerError::Scheduler(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| ControllerError::Scheduler(e.to_string()))?;

        *self.scheduler.lock().await = Some(scheduler);
        info!(
            schedule = %expression,
            timezone = "UTC",
            roots = config.roots.len(),
            "Library scraper scheduled"
        );

        if settings.run_once {
            self.run_once(config);
        }
        Ok(())
    }

    /// Launch one run immediately. Returns false if a run is already active.
    pub fn run_once(&self, config: ScrapeConfiguration) -> bool {
        let launched = self.shared.launch(config, None) == Launch::Started;
        if launched {
            info!("Library scrape started");
        } else {
            warn!("Library scrape already running");
        }
        launched
    }

    /// Shut the scheduler down, cancel the active run and wait for it to exit
    pub async fn stop_and_wait(&self) {
        // Ticks from the retired schedule are refused from here on
        self.shared.slot.lock().generation += 1;

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = %e, "Failed to shut down scheduler");
            }
        }

        let active = self.shared.slot.lock().run.take();
        if let Some(run) = active {
            run.state.request_stop();
            if let Err(e) = run.handle.await {
                error!(error = %e, "Library scrape task failed");
            }
        }
    }

    pub async fn is_scheduled(&self) -> bool {
        self.scheduler.lock().await.is_some()
    }

    pub fn status(&self) -> RunStatus {
        match self.shared.slot.lock().run.as_ref() {
            Some(run) if !run.handle.is_finished() => run.state.status(),
            _ => RunStatus::Idle,
        }
    }

    pub fn last_summary(&self) -> Option<RunSummary> {
        self.shared.last_summary.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    use crate::services::artwork::{MetadataScraper, ScrapeError, ScrapeReport};
    use crate::services::filename_parser::MediaKind;
    use crate::services::identity::IdentityResolver;
    use crate::services::metadata::{HeuristicQuery, MediaIdentity, MediaRecognizer};
    use crate::services::scanner::DiscoveredFile;
    use super::library_scraper::RunOutcome;

    struct SlowRecognizer;

    #[async_trait]
    impl MediaRecognizer for SlowRecognizer {
        async fn recognize_by_id(&self, _id: &str, _kind: MediaKind) -> Result<Option<MediaIdentity>> {
            Ok(None)
        }

        async fn recognize_by_heuristic(&self, _query: &HeuristicQuery) -> Result<Option<MediaIdentity>> {
            tokio::time::sleep(Duration::from_millis(100)).await;
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

    fn controller() -> ScheduledJobController {
        let resolver = IdentityResolver::new(Arc::new(SlowRecognizer));
        ScheduledJobController::new(Arc::new(ScrapeRunner::new(resolver, Arc::new(NoopScraper))))
    }

    #[test]
    fn test_crontab_gets_seconds_field() {
        assert_eq!(to_scheduler_cron("0 0 */7 * *").unwrap(), "0 0 0 */7 * *");
        assert_eq!(to_scheduler_cron("  30 2 * * 1 ").unwrap(), "0 30 2 * * 1");
        assert_eq!(to_scheduler_cron("0 0 3 * * *").unwrap(), "0 0 3 * * *");
    }

    #[test]
    fn test_bad_field_count_is_rejected() {
        assert_matches!(
            to_scheduler_cron("* * *"),
            Err(ControllerError::InvalidSchedule { .. })
        );
        assert_matches!(to_scheduler_cron(""), Err(ControllerError::InvalidSchedule { .. }));
    }

    #[tokio::test]
    async fn test_stop_without_run_is_noop() {
        let controller = controller();
        controller.stop_and_wait().await;
        assert_eq!(controller.status(), RunStatus::Idle);
        assert_eq!(controller.last_summary(), None);
    }

    #[tokio::test]
    async fn test_disabled_settings_install_nothing() {
        let controller = controller();
        controller
            .start(&ScraperSettings::default(), &["mkv".to_string()])
            .await
            .unwrap();
        assert!(!controller.is_scheduled().await);
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_reported() {
        let controller = controller();
        let settings = ScraperSettings {
            enabled: true,
            cron: Some("every sunday".to_string()),
            ..Default::default()
        };
        let result = controller.start(&settings, &["mkv".to_string()]).await;
        assert_matches!(result, Err(ControllerError::InvalidSchedule { .. }));
        assert!(!controller.is_scheduled().await);
    }

    #[tokio::test]
    async fn test_tick_from_stopped_schedule_is_refused() {
        let controller = controller();
        let retired = controller.shared.generation();
        controller.stop_and_wait().await;

        let launch = controller
            .shared
            .launch(ScrapeConfiguration::default(), Some(retired));
        assert_eq!(launch, Launch::Stale);
        assert!(controller.shared.slot.lock().run.is_none());
        assert_eq!(controller.status(), RunStatus::Idle);

        let current = controller.shared.generation();
        let launch = controller
            .shared
            .launch(ScrapeConfiguration::default(), Some(current));
        assert_eq!(launch, Launch::Started);
        controller.stop_and_wait().await;
        assert_matches!(controller.last_summary(), Some(_));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_and_wait_cancels_active_run() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=5 {
            std::fs::write(dir.path().join(format!("Movie {i}.2020.mkv")), b"").unwrap();
        }
        let config = ScrapeConfiguration {
            roots: vec![dir.path().to_path_buf()],
            exclusions: vec![],
            extensions: vec!["mkv".to_string()],
        };

        let controller = controller();
        assert!(controller.run_once(config.clone()));
        assert!(!controller.run_once(config));

        controller.stop_and_wait().await;

        let summary = controller.last_summary().unwrap();
        assert_matches!(summary.outcome, RunOutcome::Cancelled);
        assert!(summary.files_seen < 5);
        assert_eq!(controller.status(), RunStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduled_start_with_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ScraperSettings {
            enabled: true,
            cron: None,
            scraper_paths: dir.path().display().to_string(),
            exclude_paths: String::new(),
            run_once: true,
        };

        let controller = controller();
        controller.start(&settings, &["mkv".to_string()]).await.unwrap();
        assert!(controller.is_scheduled().await);

        for _ in 0..50 {
            if controller.last_summary().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let summary = controller.last_summary().unwrap();
        assert_matches!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.roots_scanned, 1);

        controller.stop_and_wait().await;
        assert!(!controller.is_scheduled().await);
    }
}
