//! Application configuration management

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::services::scanner::VIDEO_EXTENSIONS;

/// Schedule used when none is configured: midnight every 7 days
pub const DEFAULT_SCHEDULE: &str = "0 0 */7 * *";

/// Scrape job settings, in the shape of the job's JSON settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Whether the scheduled job is installed at all
    pub enabled: bool,

    /// 5-field cron expression; empty means [`DEFAULT_SCHEDULE`]
    pub cron: Option<String>,

    /// Library roots to scrape, one per line
    pub scraper_paths: String,

    /// Paths to skip, one per line
    pub exclude_paths: String,

    /// Launch one run immediately when the job starts
    pub run_once: bool,
}

impl ScraperSettings {
    /// Load settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// The effective cron expression
    pub fn schedule(&self) -> &str {
        self.cron
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_SCHEDULE)
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        split_paths(&self.scraper_paths)
    }

    pub fn exclusions(&self) -> Vec<PathBuf> {
        split_paths(&self.exclude_paths)
    }
}

/// Split a newline-separated path list, dropping blank lines.
/// `;` is accepted as a separator too since env vars rarely carry newlines.
pub fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(['\n', ';'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Scrape job settings
    pub scraper: ScraperSettings,

    /// Media file extensions the walker picks up
    pub media_extensions: Vec<String>,

    /// TMDB API key
    pub tmdb_api_key: Option<String>,

    /// Language for TMDB titles and overviews
    pub tmdb_language: String,

    /// Replace existing NFO/artwork files instead of only filling gaps
    pub scrape_overwrite: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `settings_file` (or `LIBRARY_SCRAPER_CONFIG`) replaces the individual
    /// `LIBRARY_SCRAPER_*` variables when given.
    pub fn from_env(settings_file: Option<&Path>) -> Result<Self> {
        let settings_file = settings_file
            .map(Path::to_path_buf)
            .or_else(|| env::var("LIBRARY_SCRAPER_CONFIG").ok().map(PathBuf::from));

        let scraper = match settings_file {
            Some(path) => ScraperSettings::from_file(&path)?,
            None => ScraperSettings {
                enabled: env_flag("LIBRARY_SCRAPER_ENABLED", false),
                cron: env::var("LIBRARY_SCRAPER_CRON").ok(),
                scraper_paths: env::var("LIBRARY_SCRAPER_PATHS").unwrap_or_default(),
                exclude_paths: env::var("LIBRARY_SCRAPER_EXCLUDE_PATHS").unwrap_or_default(),
                run_once: env_flag("LIBRARY_SCRAPER_RUN_ONCE", false),
            },
        };

        let media_extensions = env::var("MEDIA_EXTENSIONS")
            .ok()
            .map(|v| parse_extensions(&v))
            .filter(|exts| !exts.is_empty())
            .unwrap_or_else(|| VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect());

        Ok(Self {
            scraper,

            media_extensions,

            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty()),

            tmdb_language: env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "en-US".to_string()),

            scrape_overwrite: env_flag("SCRAPE_OVERWRITE", false),
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_paths_ignores_blank_lines() {
        assert_eq!(
            split_paths("/lib/Movies\n\n  \n/lib/TV \r\n;/lib/Kids"),
            vec![
                PathBuf::from("/lib/Movies"),
                PathBuf::from("/lib/TV"),
                PathBuf::from("/lib/Kids"),
            ]
        );
        assert!(split_paths("").is_empty());
    }

    #[test]
    fn test_schedule_defaults_to_every_seven_days() {
        let mut settings = ScraperSettings::default();
        assert_eq!(settings.schedule(), DEFAULT_SCHEDULE);
        settings.cron = Some("   ".to_string());
        assert_eq!(settings.schedule(), DEFAULT_SCHEDULE);
        settings.cron = Some("0 3 * * *".to_string());
        assert_eq!(settings.schedule(), "0 3 * * *");
    }

    #[test]
    fn test_settings_from_json() {
        let settings: ScraperSettings = serde_json::from_str(
            r#"{"enabled": true, "cron": "0 0 */7 * *", "scraper_paths": "/lib/Movies\n/lib/TV"}"#,
        )
        .unwrap();
        assert!(settings.enabled);
        assert!(!settings.run_once);
        assert_eq!(settings.roots().len(), 2);
        assert!(settings.exclusions().is_empty());
    }

    #[test]
    fn test_parse_extensions_and_flags() {
        assert_eq!(parse_extensions(".MKV, mp4,,"), vec!["mkv".to_string(), "mp4".to_string()]);
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("no"));
    }
}
