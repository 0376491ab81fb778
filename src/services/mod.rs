//! Library scanning, identification and metadata services

pub mod artwork;
pub mod filename_parser;
pub mod http;
pub mod identity;
pub mod metadata;
pub mod nfo;
pub mod path_matcher;
pub mod scanner;
pub mod tmdb;

pub use artwork::{MetadataScraper, NfoArtworkScraper, ScrapeError, ScrapeReport};
pub use filename_parser::{MediaKind, ParsedMedia, classify};
pub use identity::{IdentifierCandidate, IdentifierSource, IdentityResolver};
pub use metadata::{HeuristicQuery, MediaIdentity, MediaRecognizer, TmdbRecognizer};
pub use nfo::{FieldPathError, NfoDocument, NfoError, TMDB_ID_FIELD_PATHS, read_identifier};
pub use path_matcher::{PathMatcher, is_excluded};
pub use scanner::{DiscoveredFile, LibraryWalker, VIDEO_EXTENSIONS};
pub use tmdb::TmdbClient;
