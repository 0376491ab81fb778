//! NFO sidecar reader
//!
//! NFO files are the Kodi-style XML documents stored next to media files.
//! [`NfoDocument`] loads one into a small element tree and answers simple
//! field-path lookups such as `uniqueid[@type='tmdb']`.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, warn};

/// Field paths probed for a TMDB id, in priority order
pub const TMDB_ID_FIELD_PATHS: &[&str] = &[
    "uniqueid[@type='Tmdb']",
    "uniqueid[@type='tmdb']",
    "uniqueid[@type='TMDB']",
    "tmdbid",
];

/// Errors opening or parsing a sidecar
#[derive(Debug, Error)]
pub enum NfoError {
    #[error("sidecar not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed sidecar: {0}")]
    Parse(String),
}

/// Errors in a field-path expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("empty field path")]
    Empty,
    #[error("malformed field path step '{0}'")]
    Malformed(String),
}

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, NfoError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| NfoError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| NfoError::Parse(e.to_string()))?
                .to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One step of a field path: element name plus an optional attribute predicate
#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: String,
    predicate: Option<(String, String)>,
}

impl Step {
    fn parse(raw: &str) -> Result<Self, FieldPathError> {
        let raw = raw.trim();
        let malformed = || FieldPathError::Malformed(raw.to_string());

        let (name, predicate) = match raw.split_once('[') {
            None => (raw, None),
            Some((name, rest)) => {
                let inner = rest.strip_suffix(']').ok_or_else(malformed)?;
                let (key, value) = inner
                    .trim()
                    .strip_prefix('@')
                    .and_then(|p| p.split_once('='))
                    .ok_or_else(malformed)?;
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                    .ok_or_else(malformed)?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(malformed());
                }
                (name, Some((key.to_string(), unquoted.to_string())))
            }
        };

        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || "[]@='\"".contains(c)) {
            return Err(malformed());
        }

        Ok(Self {
            name: name.to_string(),
            predicate,
        })
    }

    fn matches(&self, element: &Element) -> bool {
        element.name == self.name
            && self
                .predicate
                .as_ref()
                .is_none_or(|(key, value)| element.attribute(key) == Some(value.as_str()))
    }
}

fn parse_field_path(expr: &str) -> Result<Vec<Step>, FieldPathError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(FieldPathError::Empty);
    }
    expr.split('/').map(Step::parse).collect()
}

/// A parsed NFO document
#[derive(Debug, Clone)]
pub struct NfoDocument {
    root: Element,
}

impl NfoDocument {
    /// Read and parse a sidecar from disk
    pub fn open(path: &Path) -> Result<Self, NfoError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NfoError::NotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(NfoError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::parse(&content)
    }

    /// Parse sidecar XML content
    pub fn parse(content: &str) -> Result<Self, NfoError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    if root.is_some() && stack.is_empty() {
                        return Err(NfoError::Parse("multiple root elements".to_string()));
                    }
                    stack.push(Element::from_start(e)?);
                }
                Ok(Event::Empty(ref e)) => {
                    let element = Element::from_start(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None if root.is_none() => root = Some(element),
                        None => {
                            return Err(NfoError::Parse("multiple root elements".to_string()));
                        }
                    }
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| NfoError::Parse("unexpected closing tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = e.unescape().map_err(|e| NfoError::Parse(e.to_string()))?;
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(NfoError::Parse(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(NfoError::Parse("unexpected end of document".to_string()));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| NfoError::Parse("no root element".to_string()))
    }

    /// Name of the document's root element (`movie`, `tvshow`, ...)
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// Look up the trimmed text of the first element matching `expr`.
    ///
    /// `Ok(None)` means the path is valid but no element matched, or the match was blank.
    pub fn lookup(&self, expr: &str) -> Result<Option<String>, FieldPathError> {
        let steps = parse_field_path(expr)?;
        Ok(find_first(&self.root, &steps)
            .map(|element| element.text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string))
    }
}

fn find_first<'a>(parent: &'a Element, steps: &[Step]) -> Option<&'a Element> {
    let (step, rest) = steps.split_first()?;
    parent
        .children
        .iter()
        .filter(|child| step.matches(child))
        .find_map(|child| if rest.is_empty() { Some(child) } else { find_first(child, rest) })
}

/// Read a content identifier from a sidecar, trying `field_paths` in order.
///
/// Missing files, parse errors and bad field paths all yield `None`; each
/// cause is logged here so callers only see "no identifier".
pub fn read_identifier(sidecar: &Path, field_paths: &[&str]) -> Option<String> {
    let document = match NfoDocument::open(sidecar) {
        Ok(document) => document,
        Err(NfoError::NotFound(_)) => {
            debug!(path = %sidecar.display(), "No sidecar file");
            return None;
        }
        Err(e) => {
            warn!(path = %sidecar.display(), error = %e, "Ignoring unreadable sidecar");
            return None;
        }
    };

    for field_path in field_paths {
        match document.lookup(field_path) {
            Ok(Some(value)) => {
                debug!(path = %sidecar.display(), field = %field_path, value = %value, "Found identifier in sidecar");
                return Some(value);
            }
            Ok(None) => {
                debug!(path = %sidecar.display(), field = %field_path, "Field not present in sidecar");
            }
            Err(e) => {
                debug!(path = %sidecar.display(), field = %field_path, error = %e, "Skipping field path");
            }
        }
    }

    None
}
