//! Library Scraper - scheduled metadata scraping for media libraries
//!
//! Runs as a long-lived scheduler by default. `--once` performs a single
//! scrape in the foreground and exits.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_scraper::cli::CliOptions;
use library_scraper::config::Config;
use library_scraper::jobs::ScheduledJobController;
use library_scraper::jobs::library_scraper::{RunState, ScrapeConfiguration, ScrapeRunner};
use library_scraper::services::{IdentityResolver, NfoArtworkScraper, TmdbClient, TmdbRecognizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = CliOptions::from_args();

    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("pretty"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_scraper=debug".into()),
        )
        .with((!pretty).then(|| tracing_subscriber::fmt::layer().json()))
        .with(pretty.then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting Library Scraper");

    let config = Config::from_env(cli.config_path.as_deref())?;
    tracing::info!("Configuration loaded");

    if config.tmdb_api_key.is_none() {
        tracing::warn!("TMDB_API_KEY not set, files without a usable sidecar cannot be identified");
    }
    let tmdb = TmdbClient::new(
        config.tmdb_api_key.clone().unwrap_or_default(),
        config.tmdb_language.clone(),
    );
    let resolver = IdentityResolver::new(Arc::new(TmdbRecognizer::new(tmdb)));
    let scraper = Arc::new(NfoArtworkScraper::new(config.scrape_overwrite));
    let runner = Arc::new(ScrapeRunner::new(resolver, scraper));

    if cli.once {
        let scrape_config = ScrapeConfiguration::from_settings(&config.scraper, &config.media_extensions);
        let state = Arc::new(RunState::new());

        let stop = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping after the current file");
                stop.request_stop();
            }
        });

        let summary = runner.run(&scrape_config, &state).await;
        tracing::info!(summary = %serde_json::to_string(&summary)?, "Library scrape done");
        return Ok(());
    }

    let controller = ScheduledJobController::new(runner);
    controller
        .start(&config.scraper, &config.media_extensions)
        .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    controller.stop_and_wait().await;

    if let Some(summary) = controller.last_summary() {
        tracing::info!(summary = %serde_json::to_string(&summary)?, "Last library scrape");
    }
    Ok(())
}
