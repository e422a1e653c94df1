//! Typed value to document conversion and settings file IO.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::debug;

use super::Document;
use super::rename;
use crate::{Error, Result};

/// Converts between typed settings values and generic [`Document`]s, and
/// reads and writes documents on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCodec;

impl DocumentCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode a settings value into an ordered document.
    ///
    /// Struct fields are rendered in kebab-case and absent optional fields
    /// are omitted. The value must serialize to an object.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Document> {
        let tree = rename::to_document_value(value)?;
        Document::from_value(tree)
    }

    /// Bind a document onto a typed settings value.
    pub fn decode<T: DeserializeOwned>(&self, document: Document) -> Result<T> {
        Ok(rename::from_document_value(document.into_value())?)
    }

    /// Read and parse the document stored at `path`.
    pub fn read_document(&self, path: &Path) -> Result<Document> {
        let raw = fs::read_to_string(path)?;
        Document::parse(&raw)
    }

    /// Write a document to `path`, creating parent directories as needed.
    ///
    /// The document goes to a temporary file in the target directory first
    /// and is renamed over `path`, so a concurrent reader never observes a
    /// partially written settings file.
    pub fn write_document(&self, path: &Path, document: &Document) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(document.to_json_pretty()?.as_bytes())?;
        staged.write_all(b"\n")?;
        staged.persist(path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %path.display(), "wrote settings document");
        Ok(())
    }
}
