//! Filename classifier for library media files
//!
//! Parses filenames like:
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL.mkv"
//! - "The.Daily.Show.2026.01.07.Stephen.J.Dubner.720p.WEB.h264-EDITH.mkv"
//! - "Movie.Title.2020.1080p.BluRay.x264.mkv"
//!
//! Anything that looks like an episode is a series; everything else is a movie.
//! Fields that cannot be parsed are left empty.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::scanner::VIDEO_EXTENSIONS;

static SXXEXX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\bS(\d{1,2})\s?E(\d{1,3})\b").unwrap());
static NXNN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\b(\d{1,2})x(\d{2,3})\b").unwrap());
static VERBOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\bSeason\s*(\d+).*?\bEpisode\s*(\d+)").unwrap());
static DAILY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s+((?:19|20)\d{2})\s(0[1-9]|1[0-2])\s([0-2]\d|3[01])\b").unwrap()
});
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static RELEASE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(2160p|1080p|1080i|720p|576p|480p|4k|uhd|bluray|blu ray|bdrip|brrip|web|webrip|hdtv|dvdrip|remux|x264|x265|h264|h265|hevc|xvid|proper|repack)\b",
    )
    .unwrap()
});
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(19\d{2}|20\d{2})\s*$").unwrap());
static REGION_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+(US|UK|AU|NZ)\s*$").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Coarse media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "series",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort classification of a media filename
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedMedia {
    pub kind: MediaKind,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub date: Option<String>, // YYYY-MM-DD for daily shows
    pub original_name: String,
}

impl ParsedMedia {
    fn new(kind: MediaKind, original_name: &str) -> Self {
        Self {
            kind,
            title: None,
            year: None,
            season: None,
            episode: None,
            date: None,
            original_name: original_name.to_string(),
        }
    }
}

/// Classify a file name into kind, title, year, season and episode
pub fn classify(file_name: &str) -> ParsedMedia {
    let stem = strip_video_extension(file_name);
    let cleaned = clean(stem);

    let result = parse_series(&cleaned, file_name).unwrap_or_else(|| parse_movie(&cleaned, file_name));

    debug!(
        filename = file_name,
        kind = %result.kind,
        title = ?result.title,
        year = ?result.year,
        season = ?result.season,
        episode = ?result.episode,
        "Classified filename"
    );

    result
}

fn parse_series(cleaned: &str, original: &str) -> Option<ParsedMedia> {
    let mut result = ParsedMedia::new(MediaKind::Series, original);

    // Pattern 1: S01E01 format (most common)
    // Pattern 2: 1x01 format
    // Pattern 3: Season X Episode Y format
    let caps = SXXEXX_RE
        .captures(cleaned)
        .or_else(|| NXNN_RE.captures(cleaned))
        .or_else(|| VERBOSE_RE.captures(cleaned));

    if let Some(caps) = caps {
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        result.year = last_year(prefix).map(|(year, _)| year);
        result.title = clean_show_name(prefix);
        result.season = caps.get(2).and_then(|m| m.as_str().parse().ok());
        result.episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
        return Some(result);
    }

    // Pattern 4: Daily show format (2026 01 07)
    if let Some(caps) = DAILY_RE.captures(cleaned) {
        let year = caps.get(2)?.as_str();
        let month = caps.get(3)?.as_str();
        let day = caps.get(4)?.as_str();
        result.title = clean_show_name(caps.get(1)?.as_str());
        result.date = Some(format!("{}-{}-{}", year, month, day));
        result.year = year.parse().ok();
        return Some(result);
    }

    None
}

fn parse_movie(cleaned: &str, original: &str) -> ParsedMedia {
    let mut result = ParsedMedia::new(MediaKind::Movie, original);

    let title_part = match last_year(cleaned) {
        Some((year, start)) => {
            result.year = Some(year);
            &cleaned[..start]
        }
        None => match RELEASE_TAG_RE.find(cleaned) {
            Some(tag) if tag.start() > 0 => &cleaned[..tag.start()],
            Some(_) => "",
            None => cleaned,
        },
    };

    result.title = non_empty(SPACE_RE.replace_all(title_part, " ").trim());
    result
}

/// Last year-like token that is not the first word (so "2001 A Space Odyssey 1968" keeps its title)
fn last_year(text: &str) -> Option<(u32, usize)> {
    YEAR_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter(|m| !text[..m.start()].trim().is_empty())
        .last()
        .and_then(|m| m.as_str().parse().ok().map(|year| (year, m.start())))
}

fn strip_video_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) =>
        {
            stem
        }
        _ => file_name,
    }
}

fn clean(stem: &str) -> String {
    let replaced: String = stem
        .chars()
        .map(|c| match c {
            '.' | '_' | '-' | '(' | ')' | '[' | ']' | '{' | '}' => ' ',
            other => other,
        })
        .collect();
    SPACE_RE.replace_all(replaced.trim(), " ").to_string()
}

/// Clean up the show name
fn clean_show_name(name: &str) -> Option<String> {
    let mut cleaned = name.trim().to_string();

    // Remove trailing year if present (we extract it separately)
    cleaned = TRAILING_YEAR_RE.replace(&cleaned, "").to_string();

    // Remove common suffixes
    cleaned = REGION_SUFFIX_RE.replace(&cleaned, "").to_string();

    cleaned = SPACE_RE.replace_all(&cleaned, " ").to_string();

    non_empty(cleaned.trim())
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
