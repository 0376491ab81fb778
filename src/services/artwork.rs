//! Metadata and artwork scraping
//!
//! Fills in what is missing next to the media: an NFO sidecar carrying the
//! resolved TMDB id plus `poster.jpg`/`fanart.jpg`. Existing files are left
//! alone unless overwriting is enabled.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use tracing::{debug, info};

use super::filename_parser::MediaKind;
use super::metadata::MediaIdentity;
use super::http::{RequestError, RetryPolicy, ThrottledClient, retry_async};
use super::scanner::DiscoveredFile;

/// Artwork type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkType {
    Poster,
    Backdrop,
}

impl ArtworkType {
    /// Kodi file name for this artwork
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtworkType::Poster => "poster.jpg",
            ArtworkType::Backdrop => "fanart.jpg",
        }
    }
}

/// Per-file scrape failure
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },
    #[error("failed to render nfo: {0}")]
    Render(String),
}

/// Files written by one scrape call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub written: Vec<PathBuf>,
}

/// External metadata/artwork fetch step
#[async_trait]
pub trait MetadataScraper: Send + Sync {
    async fn scrape(
        &self,
        root: &Path,
        file: &DiscoveredFile,
        identity: &MediaIdentity,
    ) -> Result<ScrapeReport, ScrapeError>;
}

/// Scraper writing Kodi-style NFO files and downloading artwork
pub struct NfoArtworkScraper {
    http: ThrottledClient,
    retry_policy: RetryPolicy,
    overwrite: bool,
}

impl NfoArtworkScraper {
    pub fn new(overwrite: bool) -> Self {
        Self {
            http: ThrottledClient::artwork(),
            retry_policy: RetryPolicy::artwork(),
            overwrite,
        }
    }

    fn should_write(&self, path: &Path) -> bool {
        self.overwrite || !path.exists()
    }

    /// Download an image to `target`
    async fn download_image(&self, url: &str, target: &Path) -> Result<(), ScrapeError> {
        let http = &self.http;
        let bytes = retry_async(
            move || http.download(url),
            &self.retry_policy,
            "artwork_download",
            RequestError::is_transient,
        )
        .await
        .map_err(|e| ScrapeError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(path = %target.display(), size = bytes.len(), "Writing artwork");
        write_file(target, &bytes).await
    }

    async fn scrape_artwork(
        &self,
        dir: &Path,
        identity: &MediaIdentity,
        report: &mut ScrapeReport,
    ) -> Result<(), ScrapeError> {
        let artwork = [
            (ArtworkType::Poster, identity.poster_url.as_deref()),
            (ArtworkType::Backdrop, identity.backdrop_url.as_deref()),
        ];
        for (artwork_type, url) in artwork {
            let Some(url) = url else { continue };
            let target = dir.join(artwork_type.file_name());
            if !self.should_write(&target) {
                continue;
            }
            self.download_image(url, &target).await?;
            report.written.push(target);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataScraper for NfoArtworkScraper {
    async fn scrape(
        &self,
        root: &Path,
        file: &DiscoveredFile,
        identity: &MediaIdentity,
    ) -> Result<ScrapeReport, ScrapeError> {
        let mut report = ScrapeReport::default();

        let (dir, nfo_path) = match identity.kind {
            MediaKind::Movie => (file.parent.clone(), file.path.with_extension("nfo")),
            MediaKind::Series => {
                let show_dir = show_directory(root, file);
                let nfo_path = show_dir.join("tvshow.nfo");
                (show_dir, nfo_path)
            }
        };

        if self.should_write(&nfo_path) {
            let xml = render_nfo(identity)?;
            write_file(&nfo_path, xml.as_bytes()).await?;
            report.written.push(nfo_path);
        }

        self.scrape_artwork(&dir, identity, &mut report).await?;

        info!(
            file = %file.path.display(),
            tmdb_id = identity.tmdb_id,
            written = report.written.len(),
            "Scraped metadata"
        );
        Ok(report)
    }
}

/// Show directory for an episode: the grandparent when it is still inside the root
pub fn show_directory(root: &Path, file: &DiscoveredFile) -> PathBuf {
    match file.parent.parent() {
        Some(grandparent) if grandparent.starts_with(root) => grandparent.to_path_buf(),
        _ => file.parent.clone(),
    }
}

/// Render a Kodi-style NFO document for an identity
pub fn render_nfo(identity: &MediaIdentity) -> Result<String, ScrapeError> {
    let root = match identity.kind {
        MediaKind::Movie => "movie",
        MediaKind::Series => "tvshow",
    };
    let tmdb_id = identity.tmdb_id.to_string();
    let year = identity.year.map(|y| y.to_string());

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let render = |e: std::io::Error| ScrapeError::Render(e.to_string());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(render)?;
    writer
        .write_event(Event::Start(BytesStart::new(root)))
        .map_err(render)?;

    write_element(&mut writer, "title", Some(&identity.title)).map_err(render)?;
    write_element(&mut writer, "originaltitle", identity.original_title.as_deref()).map_err(render)?;
    write_element(&mut writer, "year", year.as_deref()).map_err(render)?;
    write_element(&mut writer, "plot", identity.overview.as_deref()).map_err(render)?;

    let mut uniqueid = BytesStart::new("uniqueid");
    uniqueid.push_attribute(("type", "tmdb"));
    uniqueid.push_attribute(("default", "true"));
    writer.write_event(Event::Start(uniqueid)).map_err(render)?;
    writer
        .write_event(Event::Text(BytesText::new(&tmdb_id)))
        .map_err(render)?;
    writer
        .write_event(Event::End(BytesEnd::new("uniqueid")))
        .map_err(render)?;

    if let Some(imdb_id) = identity.imdb_id.as_deref() {
        let mut uniqueid = BytesStart::new("uniqueid");
        uniqueid.push_attribute(("type", "imdb"));
        writer.write_event(Event::Start(uniqueid)).map_err(render)?;
        writer
            .write_event(Event::Text(BytesText::new(imdb_id)))
            .map_err(render)?;
        writer
            .write_event(Event::End(BytesEnd::new("uniqueid")))
            .map_err(render)?;
    }

    write_element(&mut writer, "tmdbid", Some(&tmdb_id)).map_err(render)?;
    write_element(&mut writer, "imdbid", identity.imdb_id.as_deref()).map_err(render)?;

    writer
        .write_event(Event::End(BytesEnd::new(root)))
        .map_err(render)?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| ScrapeError::Render(e.to_string()))
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: Option<&str>,
) -> std::io::Result<()> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ScrapeError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ScrapeError::Io {
            path: path.to_path_buf(),
            source,
        })
}
