//! JSON shapes exchanged with the storage REST API.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::storage::metadata::{FieldUpdate, UploadMetadata};

impl<T: Serialize> Serialize for FieldUpdate<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldUpdate::Set(value) => value.serialize(serializer),
            FieldUpdate::Clear | FieldUpdate::Unchanged => serializer.serialize_none(),
        }
    }
}

/// Object resource as returned by `GET /b/{bucket}/o/{path}` and upload responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMetadata {
    pub bucket: Option<String>,
    pub name: Option<String>,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub md5_hash: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_custom_metadata")]
    pub metadata: BTreeMap<String, String>,
    pub download_tokens: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid object size {number}"))),
        Some(Value::String(text)) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid object size '{text}'"))),
        Some(other) => Err(de::Error::custom(format!("invalid object size {other}"))),
    }
}

fn deserialize_custom_metadata<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Null => None,
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Builds the resource JSON sent alongside upload bytes.
pub(crate) fn upload_resource(full_path: &str, size: usize, metadata: &UploadMetadata) -> Value {
    let mut resource = Map::new();
    resource.insert("name".into(), Value::String(full_path.to_string()));
    resource.insert("fullPath".into(), Value::String(full_path.to_string()));
    resource.insert("size".into(), Value::String(size.to_string()));
    resource.insert(
        "contentType".into(),
        Value::String(
            metadata
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        ),
    );

    let optional = [
        ("cacheControl", &metadata.cache_control),
        ("contentDisposition", &metadata.content_disposition),
        ("contentEncoding", &metadata.content_encoding),
        ("contentLanguage", &metadata.content_language),
        ("md5Hash", &metadata.md5_hash),
        ("crc32c", &metadata.crc32c),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            resource.insert(key.into(), Value::String(value.clone()));
        }
    }

    if let Some(custom) = &metadata.custom_metadata {
        let custom = custom
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        resource.insert("metadata".into(), Value::Object(custom));
    }

    Value::Object(resource)
}
