//! Library walker
//!
//! Walks library directories to discover media files, skipping excluded
//! subtrees and classifying each file by name.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::filename_parser::{self, MediaKind, ParsedMedia};
use super::path_matcher::{PathMatcher, normalize};

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "flv", "webm", "mpeg", "mpg", "ts", "m2ts", "iso",
    "rmvb", "strm",
];

/// A media file found during a walk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub parent: PathBuf,
    pub file_name: String,
    pub parsed: ParsedMedia,
}

impl DiscoveredFile {
    /// Build from a path, classifying its file name
    pub fn from_path(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let parsed = filename_parser::classify(&file_name);
        Self {
            path,
            parent,
            file_name,
            parsed,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.parsed.kind
    }
}

/// Enumerates media files under library roots
#[derive(Debug, Clone)]
pub struct LibraryWalker {
    extensions: Vec<String>,
    exclusions: PathMatcher,
}

impl LibraryWalker {
    /// `extensions` may be given with or without the leading dot; matching is case-insensitive
    pub fn new<S: AsRef<str>>(extensions: &[S], exclusions: PathMatcher) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            extensions,
            exclusions,
        }
    }

    fn has_media_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
    }

    /// Lazily walk `root`, yielding every non-excluded media file in file-name order.
    ///
    /// A missing root yields nothing.
    pub fn walk<'a>(&'a self, root: &Path) -> impl Iterator<Item = DiscoveredFile> + 'a {
        let root = normalize(root);
        let entries = if root.exists() {
            Some(
                WalkDir::new(&root)
                    .follow_links(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(move |entry| {
                        let excluded = self.exclusions.is_excluded(entry.path());
                        if excluded {
                            debug!(path = %entry.path().display(), "Path is excluded, skipping");
                        }
                        !excluded
                    }),
            )
        } else {
            warn!(path = %root.display(), "Library path does not exist");
            None
        };

        entries
            .into_iter()
            .flatten()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Failed to read library entry");
                    None
                }
            })
            .filter(move |entry| entry.file_type().is_file() && self.has_media_extension(entry.path()))
            .map(|entry| DiscoveredFile::from_path(entry.into_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_walk_filters_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("A.mkv"));
        touch(&dir.path().join("B.MP4"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("movie.nfo"));

        let walker = LibraryWalker::new(&[".mkv", "mp4"], PathMatcher::default());
        let names: Vec<String> = walker.walk(dir.path()).map(|f| f.file_name).collect();
        assert_eq!(names, vec!["A.mkv".to_string(), "B.MP4".to_string()]);
    }

    #[test]
    fn test_walk_skips_excluded_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let movies = dir.path().join("Movies");
        touch(&movies.join("A.mkv"));
        touch(&movies.join("Staging").join("B.mkv"));
        touch(&movies.join("Staging2").join("C.mkv"));

        let walker = LibraryWalker::new(&[".mkv"], PathMatcher::new([movies.join("Staging")]));
        let names: Vec<String> = walker.walk(&movies).map(|f| f.file_name).collect();
        assert_eq!(names, vec!["A.mkv".to_string(), "C.mkv".to_string()]);
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let walker = LibraryWalker::new(VIDEO_EXTENSIONS, PathMatcher::default());
        assert_eq!(walker.walk(&dir.path().join("nope")).count(), 0);
    }

    #[test]
    fn test_walk_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Show/Season 1/Show.S01E01.mkv"));
        touch(&dir.path().join("Show/Season 1/Show.S01E02.mkv"));
        touch(&dir.path().join("Film (2001)/Film.2001.mkv"));

        let walker = LibraryWalker::new(VIDEO_EXTENSIONS, PathMatcher::default());
        let first: Vec<DiscoveredFile> = walker.walk(dir.path()).collect();
        let second: Vec<DiscoveredFile> = walker.walk(dir.path()).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(
            first.iter().collect::<HashSet<_>>(),
            second.iter().collect::<HashSet<_>>()
        );
    }

    #[test]
    fn test_discovered_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Show/Season 2/Show.S02E05.mkv");
        touch(&path);

        let walker = LibraryWalker::new(VIDEO_EXTENSIONS, PathMatcher::default());
        let file = walker.walk(dir.path()).next().unwrap();
        assert!(file.path.is_absolute());
        assert_eq!(file.parent, normalize(&dir.path().join("Show/Season 2")));
        assert_eq!(file.kind(), MediaKind::Series);
        assert_eq!(file.parsed.season, Some(2));
        assert_eq!(file.parsed.episode, Some(5));
    }
}
