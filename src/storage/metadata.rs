//! Object metadata: the full server view, the caller-settable subset, and upload metadata.

mod wire;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::storage::error::{internal_error, invalid_argument, StorageResult};
use crate::storage::path;

pub(crate) use wire::upload_resource;

/// Explicit three-way update for a single metadata field.
///
/// `Unchanged` is omitted from the request, `Clear` is sent as JSON `null` and removes the
/// field server-side, `Set` overwrites it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    Unchanged,
    Set(T),
    Clear,
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Unchanged
    }
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            FieldUpdate::Set(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<T> for FieldUpdate<T> {
    fn from(value: T) -> Self {
        FieldUpdate::Set(value)
    }
}

/// Wire keys the server owns. They may appear in responses but never in an update.
pub const READ_ONLY_FIELDS: [&str; 11] = [
    "bucket",
    "generation",
    "metageneration",
    "name",
    "fullPath",
    "size",
    "timeCreated",
    "updated",
    "md5Hash",
    "crc32c",
    "downloadTokens",
];

const SETTABLE_WIRE_FIELDS: [&str; 6] = [
    "cacheControl",
    "contentDisposition",
    "contentEncoding",
    "contentLanguage",
    "contentType",
    "metadata",
];

/// Fields a caller may change with `update_metadata`.
///
/// Entries in `custom_metadata` map to `None` to delete that single key. `extra` carries
/// fields this client does not model yet; they are forwarded verbatim after validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettableMetadata {
    #[serde(skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub cache_control: FieldUpdate<String>,
    #[serde(skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub content_disposition: FieldUpdate<String>,
    #[serde(skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub content_encoding: FieldUpdate<String>,
    #[serde(skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub content_language: FieldUpdate<String>,
    #[serde(skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub content_type: FieldUpdate<String>,
    #[serde(rename = "metadata", skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub custom_metadata: FieldUpdate<BTreeMap<String, Option<String>>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SettableMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = FieldUpdate::Set(content_type.into());
        self
    }

    pub fn with_custom_entry(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        let mut entries = match std::mem::take(&mut self.custom_metadata) {
            FieldUpdate::Set(entries) => entries,
            _ => BTreeMap::new(),
        };
        entries.insert(key.into(), value);
        self.custom_metadata = FieldUpdate::Set(entries);
        self
    }

    /// Rejects pass-through fields that name server-owned or already typed properties.
    pub fn validate(&self) -> StorageResult<()> {
        for key in self.extra.keys() {
            if READ_ONLY_FIELDS.contains(&key.as_str()) {
                return Err(invalid_argument(format!(
                    "Metadata field '{key}' is read-only and cannot be updated."
                )));
            }
            if SETTABLE_WIRE_FIELDS.contains(&key.as_str()) {
                return Err(invalid_argument(format!(
                    "Metadata field '{key}' must be set through its typed field."
                )));
            }
        }
        Ok(())
    }

    /// JSON body for the metadata `PATCH` request.
    pub fn to_patch_body(&self) -> StorageResult<Value> {
        self.validate()?;
        serde_json::to_value(self).map_err(|err| internal_error(format!("failed to encode metadata: {err}")))
    }
}

/// Metadata attached to an upload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
    pub custom_metadata: Option<BTreeMap<String, String>>,
    pub md5_hash: Option<String>,
    pub crc32c: Option<String>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_custom_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Everything the server reports about an object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FullMetadata {
    pub bucket: String,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    pub full_path: String,
    pub name: String,
    pub size: u64,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub md5_hash: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
    pub custom_metadata: BTreeMap<String, String>,
    pub download_tokens: Vec<String>,
    /// Fields returned by the server that are not modelled above.
    pub extra: BTreeMap<String, Value>,
}

impl FullMetadata {
    /// Parses an object resource. `fallback_bucket` fills in a missing `bucket` field.
    pub fn from_wire(value: Value, fallback_bucket: &str) -> StorageResult<Self> {
        let wire: wire::WireMetadata = serde_json::from_value(value)
            .map_err(|err| internal_error(format!("invalid metadata response: {err}")))?;

        let full_path = wire.name.map(|name| path::normalize(&name)).unwrap_or_default();
        let name = path::last_component(&full_path).to_string();
        let download_tokens = wire
            .download_tokens
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            bucket: wire.bucket.unwrap_or_else(|| fallback_bucket.to_string()),
            generation: wire.generation,
            metageneration: wire.metageneration,
            full_path,
            name,
            size: wire.size.unwrap_or_default(),
            time_created: wire.time_created,
            updated: wire.updated,
            md5_hash: wire.md5_hash,
            cache_control: wire.cache_control,
            content_disposition: wire.content_disposition,
            content_encoding: wire.content_encoding,
            content_language: wire.content_language,
            content_type: wire.content_type,
            custom_metadata: wire.metadata,
            download_tokens,
            extra: wire.extra,
        })
    }
}
