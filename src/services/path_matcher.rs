//! Exclusion matching for library paths
//!
//! Paths are compared component-wise after lexical normalization, so
//! `/media/Show2` is never considered to live under `/media/Show`.

use std::path::{Component, Path, PathBuf};

/// Make a path absolute and resolve `.`/`..` segments without touching the filesystem.
///
/// Symlinks are not resolved; two spellings of the same directory through
/// different links compare as different paths.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // ".." at the root stays at the root
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Set of normalized exclusion roots
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    roots: Vec<PathBuf>,
}

impl PathMatcher {
    /// Build a matcher from raw exclusion entries. Blank entries are ignored.
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = entries
            .into_iter()
            .filter(|p| !p.as_ref().to_string_lossy().trim().is_empty())
            .map(|p| normalize(p.as_ref()))
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// True if `candidate` equals or descends from one of the exclusion roots
    pub fn is_excluded(&self, candidate: &Path) -> bool {
        if self.roots.is_empty() {
            return false;
        }
        let candidate = normalize(candidate);
        self.roots.iter().any(|root| candidate.starts_with(root))
    }
}

/// One-shot form of [`PathMatcher::is_excluded`]
pub fn is_excluded<P: AsRef<Path>>(candidate: &Path, exclusion_roots: &[P]) -> bool {
    PathMatcher::new(exclusion_roots).is_excluded(candidate)
}
