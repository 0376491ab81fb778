//! Identity resolution for discovered files
//!
//! Sidecar identifiers take precedence over filename heuristics:
//! - movies: `movie.nfo` in the same directory, then `<stem>.nfo`
//! - series: `tvshow.nfo` in the show directory (`Show/Season 1/ep.mkv` -> `Show/tvshow.nfo`)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::filename_parser::MediaKind;
use super::metadata::{HeuristicQuery, MediaIdentity, MediaRecognizer};
use super::nfo::{TMDB_ID_FIELD_PATHS, read_identifier};
use super::scanner::DiscoveredFile;

/// Where an identifier came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierSource {
    Sidecar { path: PathBuf },
    NotFound,
}

/// An identifier (if any) plus its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierCandidate {
    pub id: Option<String>,
    pub source: IdentifierSource,
}

impl IdentifierCandidate {
    fn not_found() -> Self {
        Self {
            id: None,
            source: IdentifierSource::NotFound,
        }
    }
}

/// Sidecar locations to probe for a file, highest priority first
pub fn sidecar_candidates(file: &DiscoveredFile) -> Vec<PathBuf> {
    match file.kind() {
        MediaKind::Movie => vec![file.parent.join("movie.nfo"), file.path.with_extension("nfo")],
        MediaKind::Series => file
            .parent
            .parent()
            .map(|show_dir| vec![show_dir.join("tvshow.nfo")])
            .unwrap_or_default(),
    }
}

/// Resolves discovered files into media identities
pub struct IdentityResolver {
    recognizer: Arc<dyn MediaRecognizer>,
}

impl IdentityResolver {
    pub fn new(recognizer: Arc<dyn MediaRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Find the first sidecar identifier for `file`. Partial results are never combined.
    pub fn find_identifier(&self, file: &DiscoveredFile) -> IdentifierCandidate {
        for sidecar in sidecar_candidates(file) {
            if let Some(id) = read_sidecar(&sidecar) {
                return IdentifierCandidate {
                    id: Some(id),
                    source: IdentifierSource::Sidecar { path: sidecar },
                };
            }
        }
        IdentifierCandidate::not_found()
    }

    /// Resolve a file's identity. `None` is a per-file soft failure.
    pub async fn resolve(&self, file: &DiscoveredFile) -> Option<MediaIdentity> {
        let kind = file.kind();
        let candidate = self.find_identifier(file);

        let result = match (&candidate.id, &candidate.source) {
            (Some(id), IdentifierSource::Sidecar { path }) => {
                info!(file = %file.path.display(), sidecar = %path.display(), id = %id, "Read TMDB id from local nfo");
                self.recognizer.recognize_by_id(id, kind).await
            }
            _ => match HeuristicQuery::from_parsed(&file.parsed) {
                Some(query) => self.recognizer.recognize_by_heuristic(&query).await,
                None => {
                    warn!(file = %file.path.display(), "No sidecar id and no title to search for");
                    return None;
                }
            },
        };

        match result {
            Ok(Some(identity)) => {
                debug!(file = %file.path.display(), tmdb_id = identity.tmdb_id, title = %identity.title, "Resolved media identity");
                Some(MediaIdentity {
                    season: identity.season.or(file.parsed.season),
                    episode: identity.episode.or(file.parsed.episode),
                    ..identity
                })
            }
            Ok(None) => {
                warn!(file = %file.path.display(), "No media information recognized");
                None
            }
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Media recognition failed");
                None
            }
        }
    }
}

fn read_sidecar(sidecar: &Path) -> Option<String> {
    if !sidecar.is_file() {
        return None;
    }
    read_identifier(sidecar, TMDB_ID_FIELD_PATHS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(path: &str) -> DiscoveredFile {
        DiscoveredFile::from_path(PathBuf::from(path))
    }

    #[test]
    fn test_movie_sidecar_candidates() {
        let file = discovered("/lib/Movies/Heat (1995)/Heat.1995.mkv");
        assert_eq!(
            sidecar_candidates(&file),
            vec![
                PathBuf::from("/lib/Movies/Heat (1995)/movie.nfo"),
                PathBuf::from("/lib/Movies/Heat (1995)/Heat.1995.nfo"),
            ]
        );
    }

    #[test]
    fn test_series_sidecar_candidates() {
        let file = discovered("/lib/TV/Show/Season 1/Show.S01E01.mkv");
        assert_eq!(sidecar_candidates(&file), vec![PathBuf::from("/lib/TV/Show/tvshow.nfo")]);
    }

    #[test]
    fn test_series_at_filesystem_root_has_no_candidates() {
        let file = discovered("/Show.S01E01.mkv");
        assert!(sidecar_candidates(&file).is_empty());
    }
}
