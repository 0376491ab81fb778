//! Media recognition
//!
//! Turns either an authoritative identifier (from a sidecar) or a heuristic
//! filename parse into a [`MediaIdentity`]. The scrape job only depends on the
//! [`MediaRecognizer`] trait; [`TmdbRecognizer`] is the TMDB-backed implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::filename_parser::{MediaKind, ParsedMedia};
use super::tmdb::{TmdbClient, TmdbMovie, TmdbTvShow, year_of};

/// Canonical record for one media item, as returned by the recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIdentity {
    pub kind: MediaKind,
    pub tmdb_id: u64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<u32>,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub imdb_id: Option<String>,
    /// Carried over from the filename for episodes
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Heuristic fields used when no identifier is available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicQuery {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl HeuristicQuery {
    /// `None` when the parse produced no title to search for
    pub fn from_parsed(parsed: &ParsedMedia) -> Option<Self> {
        let title = parsed.title.as_deref()?.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            kind: parsed.kind,
            title: title.to_string(),
            year: parsed.year,
            season: parsed.season,
            episode: parsed.episode,
        })
    }
}

/// External recognition service
///
/// `Ok(None)` means the service answered but knows no such item. Errors are
/// transient service failures; the scrape job treats both the same way.
#[async_trait]
pub trait MediaRecognizer: Send + Sync {
    async fn recognize_by_id(&self, id: &str, kind: MediaKind) -> Result<Option<MediaIdentity>>;

    async fn recognize_by_heuristic(&self, query: &HeuristicQuery) -> Result<Option<MediaIdentity>>;
}

/// Recognizer backed by the TMDB API
pub struct TmdbRecognizer {
    client: TmdbClient,
}

impl TmdbRecognizer {
    pub fn new(client: TmdbClient) -> Self {
        Self { client }
    }

    fn movie_identity(&self, movie: TmdbMovie) -> MediaIdentity {
        MediaIdentity {
            kind: MediaKind::Movie,
            tmdb_id: movie.id,
            year: year_of(movie.release_date.as_deref()),
            poster_url: self.client.original_url(movie.poster_path.as_deref()),
            backdrop_url: self.client.original_url(movie.backdrop_path.as_deref()),
            title: movie.title,
            original_title: movie.original_title,
            overview: movie.overview.filter(|o| !o.is_empty()),
            imdb_id: movie.imdb_id.filter(|id| !id.is_empty()),
            season: None,
            episode: None,
        }
    }

    fn show_identity(&self, show: TmdbTvShow, imdb_id: Option<String>) -> MediaIdentity {
        MediaIdentity {
            kind: MediaKind::Series,
            tmdb_id: show.id,
            year: year_of(show.first_air_date.as_deref()),
            poster_url: self.client.original_url(show.poster_path.as_deref()),
            backdrop_url: self.client.original_url(show.backdrop_path.as_deref()),
            title: show.name,
            original_title: show.original_name,
            overview: show.overview.filter(|o| !o.is_empty()),
            imdb_id: imdb_id.filter(|id| !id.is_empty()),
            season: None,
            episode: None,
        }
    }

    async fn movie_by_id(&self, tmdb_id: u64) -> Result<Option<MediaIdentity>> {
        Ok(self
            .client
            .get_movie(tmdb_id)
            .await?
            .map(|movie| self.movie_identity(movie)))
    }

    async fn show_by_id(&self, tmdb_id: u64) -> Result<Option<MediaIdentity>> {
        let Some(show) = self.client.get_tv(tmdb_id).await? else {
            return Ok(None);
        };
        let imdb_id = match self.client.get_tv_external_ids(tmdb_id).await {
            Ok(ids) => ids.imdb_id,
            Err(e) => {
                debug!(tmdb_id, error = %e, "Could not fetch external ids");
                None
            }
        };
        Ok(Some(self.show_identity(show, imdb_id)))
    }
}

#[async_trait]
impl MediaRecognizer for TmdbRecognizer {
    async fn recognize_by_id(&self, id: &str, kind: MediaKind) -> Result<Option<MediaIdentity>> {
        let Ok(tmdb_id) = id.trim().parse::<u64>() else {
            warn!(id = %id, "Identifier is not a TMDB id");
            return Ok(None);
        };

        info!(tmdb_id, kind = %kind, "Recognizing by TMDB id");
        match kind {
            MediaKind::Movie => self.movie_by_id(tmdb_id).await,
            MediaKind::Series => self.show_by_id(tmdb_id).await,
        }
    }

    async fn recognize_by_heuristic(&self, query: &HeuristicQuery) -> Result<Option<MediaIdentity>> {
        info!(title = %query.title, year = ?query.year, kind = %query.kind, "Recognizing by filename");

        let identity = match query.kind {
            MediaKind::Movie => {
                let mut results = self.client.search_movies(&query.title, query.year).await?;
                if results.is_empty() && query.year.is_some() {
                    // Try without year
                    results = self.client.search_movies(&query.title, None).await?;
                }
                match results.into_iter().next() {
                    // Search results lack the IMDB id, so fetch the details
                    Some(best) => match self.movie_by_id(best.id).await? {
                        Some(identity) => Some(identity),
                        None => Some(self.movie_identity(best)),
                    },
                    None => None,
                }
            }
            MediaKind::Series => {
                let mut results = self.client.search_tv(&query.title, query.year).await?;
                if results.is_empty() && query.year.is_some() {
                    results = self.client.search_tv(&query.title, None).await?;
                }
                match results.into_iter().next() {
                    Some(best) => self.show_by_id(best.id).await?,
                    None => None,
                }
            }
        };

        Ok(identity.map(|identity| MediaIdentity {
            season: query.season,
            episode: query.episode,
            ..identity
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::filename_parser::classify;

    #[test]
    fn test_query_from_parsed() {
        let query = HeuristicQuery::from_parsed(&classify("Movie.Title.2020.mkv")).unwrap();
        assert_eq!(query.kind, MediaKind::Movie);
        assert_eq!(query.title, "Movie Title");
        assert_eq!(query.year, Some(2020));
    }

    #[test]
    fn test_query_requires_title() {
        assert_eq!(HeuristicQuery::from_parsed(&classify("S01E01.mkv")), None);
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_not_recognized() {
        let recognizer = TmdbRecognizer::new(TmdbClient::new("key".to_string(), "en-US".to_string()));
        let identity = recognizer.recognize_by_id("tt0113277", MediaKind::Movie).await.unwrap();
        assert_eq!(identity, None);
    }
}
