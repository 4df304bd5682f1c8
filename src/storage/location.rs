use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::storage::constants::{CLOUD_STORAGE_HOSTS, DEFAULT_HOST};
use crate::storage::error::{invalid_default_bucket, invalid_url, StorageResult};
use crate::storage::path;

/// Characters left untouched when a bucket or path is embedded in a request URL.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URL_COMPONENT).to_string()
}

/// Canonical `(bucket, path)` pair addressed by a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    bucket: String,
    path: String,
}

impl Location {
    pub fn new(bucket: impl Into<String>, path: &str) -> Self {
        Self {
            bucket: bucket.into(),
            path: path::normalize(path),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn child(&self, child_path: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            path: path::child(&self.path, child_path),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        path::parent(&self.path).map(|parent| Self {
            bucket: self.bucket.clone(),
            path: parent,
        })
    }

    pub fn root(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            path: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        path::last_component(&self.path)
    }

    /// Wire form of the object URL, e.g. `/b/my-bucket/o/photos%2Fcat.png`.
    pub fn full_server_url(&self) -> String {
        format!(
            "/b/{}/o/{}",
            encode_component(&self.bucket),
            encode_component(&self.path)
        )
    }

    pub fn bucket_only_server_url(&self) -> String {
        format!("/b/{}/o", encode_component(&self.bucket))
    }

    /// Parses the bucket configured on the app or passed to `get_storage_for_app`.
    ///
    /// Accepts a bare bucket name or a `gs://bucket` URL; a URL that names an object is rejected.
    pub fn from_bucket_or_url(bucket_or_url: &str, host: &str) -> StorageResult<Self> {
        match Self::from_url(bucket_or_url, host) {
            Ok(location) if location.is_root() => Ok(location),
            Ok(_) => Err(invalid_default_bucket(bucket_or_url)),
            Err(_) if is_url(bucket_or_url) || bucket_or_url.contains('/') || bucket_or_url.is_empty() => {
                Err(invalid_default_bucket(bucket_or_url))
            }
            Err(_) => Ok(Self::new(bucket_or_url, "")),
        }
    }

    pub fn from_url(url: &str, host: &str) -> StorageResult<Self> {
        if let Some(rest) = url.strip_prefix("gs://") {
            return Self::from_gs_url(url, rest);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return Self::from_http_url(url, host);
        }

        Err(invalid_url(url))
    }

    fn from_gs_url(url: &str, rest: &str) -> StorageResult<Self> {
        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid_url(url));
        }
        Ok(Self::new(bucket, object))
    }

    fn from_http_url(url: &str, configured_host: &str) -> StorageResult<Self> {
        let parsed = Url::parse(url).map_err(|_| invalid_url(url))?;
        let host = parsed.host_str().ok_or_else(|| invalid_url(url))?;
        let host_with_port = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let segments: Vec<&str> = parsed
            .path_segments()
            .ok_or_else(|| invalid_url(url))?
            .filter(|segment| !segment.is_empty())
            .collect();

        if host_with_port.eq_ignore_ascii_case(configured_host) {
            // /v0/b/{bucket}/o/{encoded path}
            if segments.len() < 3 || segments[1] != "b" {
                return Err(invalid_url(url));
            }
            let bucket = decode_segment(segments[2]);
            let object = match segments.get(3) {
                None => String::new(),
                Some(&"o") => decode_segments(&segments[4..]),
                Some(_) => return Err(invalid_url(url)),
            };
            return Ok(Self::new(bucket, &object));
        }

        let is_default_host = configured_host == DEFAULT_HOST;
        if is_default_host && CLOUD_STORAGE_HOSTS.iter().any(|candidate| host.eq_ignore_ascii_case(candidate)) {
            // /{bucket}/{path}
            let bucket = segments.first().map(|bucket| decode_segment(bucket)).ok_or_else(|| invalid_url(url))?;
            return Ok(Self::new(bucket, &decode_segments(&segments[1..])));
        }

        Err(invalid_url(url))
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("gs://") || value.starts_with("http://") || value.starts_with("https://")
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn decode_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| decode_segment(segment))
        .collect::<Vec<_>>()
        .join("/")
}
