//! Document-level version rewriting.
//!
//! A lighter-weight alternative to the settings store for callers that
//! already hold raw JSON: instead of registering one type per schema
//! generation and converting between typed values, a [`VersionedModel`]
//! describes a single type whose wire document is rewritten between
//! versions before structural binding (on decode) or after it (on
//! encode). Useful at API and file boundaries where only the newest type
//! exists in code but older documents still circulate.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::document::{Document, DocumentCodec};
use crate::{BoxError, Error, Result};

/// Rewrites a document from one schema version to another.
///
/// Called as `(document, from_version, to_version)` and expected to return
/// the document shaped for `to_version`. The version marker is never part
/// of the document handed in or returned.
pub type VersionConverter = Arc<dyn Fn(Document, u32, u32) -> Result<Document, BoxError> + Send + Sync>;

/// Per-type version metadata for [`VersionedCodec`].
#[derive(Clone)]
pub struct VersionedModel {
    current_version: u32,
    version_field: String,
    to_current: Option<VersionConverter>,
    to_past: Option<VersionConverter>,
    decode_default: Option<u32>,
    encode_default: Option<u32>,
    always_convert: bool,
    suppressed_version: Option<u32>,
    override_field: Option<String>,
    override_from_source: bool,
}

impl VersionedModel {
    /// Metadata for a type whose newest schema generation is
    /// `current_version`. The version marker lives in `model-version`
    /// unless overridden.
    pub fn new(current_version: u32) -> Self {
        Self {
            current_version,
            version_field: "model-version".to_string(),
            to_current: None,
            to_past: None,
            decode_default: None,
            encode_default: None,
            always_convert: false,
            suppressed_version: None,
            override_field: None,
            override_from_source: false,
        }
    }

    /// Name of the document field holding the version marker.
    pub fn with_version_field(mut self, field: impl Into<String>) -> Self {
        self.version_field = field.into();
        self
    }

    /// Converter run on decode when the document is older than
    /// `current_version`.
    pub fn with_upgrade<F>(mut self, f: F) -> Self
    where
        F: Fn(Document, u32, u32) -> Result<Document, BoxError> + Send + Sync + 'static,
    {
        self.to_current = Some(Arc::new(f));
        self
    }

    /// Converter run on encode when serializing to an older version.
    pub fn with_downgrade<F>(mut self, f: F) -> Self
    where
        F: Fn(Document, u32, u32) -> Result<Document, BoxError> + Send + Sync + 'static,
    {
        self.to_past = Some(Arc::new(f));
        self
    }

    /// Version assumed for documents carrying no marker. Without this,
    /// a missing marker is an error.
    pub fn with_decode_default(mut self, version: u32) -> Self {
        self.decode_default = Some(version);
        self
    }

    /// Version written by default when no instance override asks for
    /// another one.
    pub fn with_encode_default(mut self, version: u32) -> Self {
        self.encode_default = Some(version);
        self
    }

    /// Run the converters even when the versions already match.
    pub fn always_convert(mut self) -> Self {
        self.always_convert = true;
        self
    }

    /// Omit the version marker when encoding to exactly this version.
    /// Covers legacy generations that predate the marker field.
    pub fn with_suppressed_version(mut self, version: u32) -> Self {
        self.suppressed_version = Some(version);
        self
    }

    /// Document field carrying a per-instance target version.
    ///
    /// On encode, the field is removed from the payload and its value
    /// picks the version to serialize to.
    pub fn with_override_field(mut self, field: impl Into<String>) -> Self {
        self.override_field = Some(field.into());
        self
    }

    /// On decode, seed the override field with the detected source
    /// version so the bound value can see where it came from.
    pub fn override_from_source(mut self) -> Self {
        self.override_from_source = true;
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn version_field(&self) -> &str {
        &self.version_field
    }
}

impl fmt::Debug for VersionedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedModel")
            .field("current_version", &self.current_version)
            .field("version_field", &self.version_field)
            .field("always_convert", &self.always_convert)
            .finish_non_exhaustive()
    }
}

/// Codec applying a [`VersionedModel`] around ordinary document binding.
#[derive(Debug, Clone)]
pub struct VersionedCodec {
    codec: DocumentCodec,
    model: VersionedModel,
}

impl VersionedCodec {
    pub fn new(model: VersionedModel) -> Self {
        Self {
            codec: DocumentCodec::new(),
            model,
        }
    }

    pub fn model(&self) -> &VersionedModel {
        &self.model
    }

    /// Decode raw JSON into `T`, upgrading the document first when it is
    /// older than the model's current version. Models without an upgrade
    /// converter bind the document unchanged.
    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        self.decode_document(Document::parse(raw)?)
    }

    /// Like [`decode`](Self::decode), starting from a parsed document.
    pub fn decode_document<T: DeserializeOwned>(&self, mut document: Document) -> Result<T> {
        let model = &self.model;
        let source = document
            .extract_version(&model.version_field)?
            .or(model.decode_default)
            .ok_or_else(|| Error::MissingVersion {
                field: model.version_field.clone(),
            })?;

        if let Some(converter) = &model.to_current {
            if model.always_convert || source != model.current_version {
                document = apply_converter(converter, document, source, model.current_version)?;
                debug!(
                    from = source,
                    to = model.current_version,
                    "upgraded versioned document"
                );
            }
        }
        if model.override_from_source {
            if let Some(field) = &model.override_field {
                document.insert(field, source);
            }
        }
        self.codec.decode(document)
    }

    /// Encode `value`, downgrading the document when the target version
    /// is older than the model's current version, and stamp the marker.
    /// Models without a downgrade converter write the current shape
    /// under the target version's marker.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Document> {
        let model = &self.model;
        let mut document = self.codec.encode(value)?;

        let requested = match &model.override_field {
            Some(field) => document.extract_version(field)?,
            None => None,
        };
        let target = requested
            .or(model.encode_default)
            .unwrap_or(model.current_version);

        if let Some(converter) = &model.to_past {
            if model.always_convert || target != model.current_version {
                document = apply_converter(converter, document, model.current_version, target)?;
                debug!(
                    from = model.current_version,
                    to = target,
                    "downgraded versioned document"
                );
            }
        }
        if model.suppressed_version != Some(target) {
            document.stamp_version(&model.version_field, target);
        }
        Ok(document)
    }

    /// Encode `value` straight to pretty-printed JSON.
    pub fn encode_to_string<T: Serialize>(&self, value: &T) -> Result<String> {
        self.encode(value)?.to_json_pretty()
    }
}

fn apply_converter(
    converter: &VersionConverter,
    document: Document,
    from: u32,
    to: u32,
) -> Result<Document> {
    converter(document, from, to).map_err(|cause| Error::MigrationFailed {
        source: format!("v{from}"),
        target: format!("v{to}"),
        cause,
    })
}
