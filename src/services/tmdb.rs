//! TMDB (The Movie Database) API client for movie and TV metadata
//!
//! TMDB is a popular movie/TV database with a free API.
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds. Transient failures
//! (429, 408, 5xx) are retried with backoff; anything else fails at once.


use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{RequestError, RetryPolicy, ThrottledClient, retry_async};

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: ThrottledClient,
    base_url: String,
    api_key: String,
    language: String,
    retry_policy: RetryPolicy,
}

/// Paged search response from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbSearchResult<T> {
    pub page: i32,
    pub results: Vec<T>,
    pub total_pages: i32,
    pub total_results: i32,
}

/// Movie details from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    /// IMDB ID (only in movie details)
    pub imdb_id: Option<String>,
}

/// TV show details from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbTvShow {
    pub id: u64,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

/// External ids for a TV show (IMDB id is not part of the show details)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbExternalIds {
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u64>,
}

impl TmdbClient {
    /// Create a new TMDB client with the given API key
    pub fn new(api_key: String, language: String) -> Self {
        Self {
            client: ThrottledClient::tmdb(),
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key,
            language,
            retry_policy: RetryPolicy::tmdb(),
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Get the image base URL for poster/backdrop images
    pub fn image_url(&self, path: &str, size: &str) -> String {
        format!("https://image.tmdb.org/t/p/{}{}", size, path)
    }

    /// Get original size image URL
    pub fn original_url(&self, path: Option<&str>) -> Option<String> {
        path.map(|p| self.image_url(p, "original"))
    }

    /// Search for movies by name
    pub async fn search_movies(&self, query: &str, year: Option<u32>) -> Result<Vec<TmdbMovie>> {
        info!(
            "Searching TMDB for movie '{}'{}",
            query,
            year.map(|y| format!(" ({})", y)).unwrap_or_default()
        );

        let mut params = vec![("query", query.to_string()), ("include_adult", "false".to_string())];
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }

        let results: TmdbSearchResult<TmdbMovie> = self
            .get_json("/search/movie", params, "tmdb_search_movies")
            .await?
            .context("TMDB search endpoint not found")?;

        debug!(count = results.results.len(), "TMDB movie search returned results");
        Ok(results.results)
    }

    /// Search for TV shows by name
    pub async fn search_tv(&self, query: &str, year: Option<u32>) -> Result<Vec<TmdbTvShow>> {
        info!(
            "Searching TMDB for show '{}'{}",
            query,
            year.map(|y| format!(" ({})", y)).unwrap_or_default()
        );

        let mut params = vec![("query", query.to_string()), ("include_adult", "false".to_string())];
        if let Some(y) = year {
            params.push(("first_air_date_year", y.to_string()));
        }

        let results: TmdbSearchResult<TmdbTvShow> = self
            .get_json("/search/tv", params, "tmdb_search_tv")
            .await?
            .context("TMDB search endpoint not found")?;

        debug!(count = results.results.len(), "TMDB tv search returned results");
        Ok(results.results)
    }

    /// Get movie details by TMDB ID. `None` if TMDB has no such movie.
    pub async fn get_movie(&self, tmdb_id: u64) -> Result<Option<TmdbMovie>> {
        debug!("Fetching movie details from TMDB (ID: {})", tmdb_id);
        self.get_json(&format!("/movie/{}", tmdb_id), Vec::new(), "tmdb_get_movie")
            .await
    }

    /// Get TV show details by TMDB ID. `None` if TMDB has no such show.
    pub async fn get_tv(&self, tmdb_id: u64) -> Result<Option<TmdbTvShow>> {
        debug!("Fetching show details from TMDB (ID: {})", tmdb_id);
        self.get_json(&format!("/tv/{}", tmdb_id), Vec::new(), "tmdb_get_tv")
            .await
    }

    /// Get external ids (IMDB, TVDB) for a TV show
    pub async fn get_tv_external_ids(&self, tmdb_id: u64) -> Result<TmdbExternalIds> {
        Ok(self
            .get_json(
                &format!("/tv/{}/external_ids", tmdb_id),
                Vec::new(),
                "tmdb_get_tv_external_ids",
            )
            .await?
            .unwrap_or_default())
    }

    /// GET a TMDB endpoint, retrying transient failures. A 404 maps to `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(&'static str, String)>,
        operation_name: &str,
    ) -> Result<Option<T>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let url = format!("{}{}", self.base_url, path);
        let mut query_params = vec![
            ("api_key", self.api_key.clone()),
            ("language", self.language.clone()),
        ];
        query_params.extend(params);

        let client = &self.client;
        let (url, query) = (url.as_str(), &query_params);
        let response = retry_async(
            move || client.get(url, query),
            &self.retry_policy,
            operation_name,
            RequestError::is_transient,
        )
        .await
        .map_err(|e| describe_failure(e, operation_name))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse TMDB response for {}", operation_name))?;
        Ok(Some(body))
    }
}

fn describe_failure(error: RequestError, operation_name: &str) -> anyhow::Error {
    match error.status() {
        Some(StatusCode::UNAUTHORIZED) => anyhow!("TMDB API key is invalid"),
        _ => anyhow::Error::new(error).context(format!("TMDB {} failed", operation_name)),
    }
}

/// Year component of a TMDB `YYYY-MM-DD` date
pub fn year_of(date: Option<&str>) -> Option<u32> {
    date.and_then(|d| d.split('-').next().and_then(|y| y.parse().ok()))
}
