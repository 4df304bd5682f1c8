use std::collections::HashMap;
use std::sync::Arc;

use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::Method;

use crate::storage::error::{error_for_status, internal_error, StorageResult};
use crate::storage::list::{ListOptions, ListPage};
use crate::storage::location::Location;
use crate::storage::metadata::{upload_resource, FullMetadata, SettableMetadata, UploadMetadata};
use crate::storage::service::FirebaseStorageImpl;

use super::{ErrorHandler, RequestBody, RequestInfo, ResponseHandler, ResponsePayload};

/// Server view of a resumable session after a chunk or status query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResumableUploadStatus {
    pub current: u64,
    pub total: u64,
    pub finalized: bool,
    pub metadata: Option<FullMetadata>,
}

fn object_error_handler(location: &Location) -> ErrorHandler {
    let bucket = location.bucket().to_string();
    let path = location.path().to_string();
    Arc::new(move |payload: &ResponsePayload| error_for_status(payload.status, &bucket, &path, &payload.text()))
}

fn metadata_handler(location: &Location) -> ResponseHandler<FullMetadata> {
    let bucket = location.bucket().to_string();
    Arc::new(move |payload: ResponsePayload| {
        let value = serde_json::from_slice(&payload.body)
            .map_err(|err| internal_error(format!("failed to parse metadata: {err}")))?;
        FullMetadata::from_wire(value, &bucket)
    })
}

fn default_json_headers() -> HashMap<String, String> {
    HashMap::from([
        ("Accept".to_string(), "application/json".to_string()),
        ("Content-Type".to_string(), "application/json; charset=utf-8".to_string()),
    ])
}

pub fn get_metadata_request(storage: &FirebaseStorageImpl, location: &Location) -> RequestInfo<FullMetadata> {
    let url = storage.request_url(&location.full_server_url());
    let timeout = storage.settings().max_operation_retry_time;

    RequestInfo::new(url, Method::GET, timeout, metadata_handler(location))
        .with_error_handler(object_error_handler(location))
}

pub fn update_metadata_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    metadata: &SettableMetadata,
) -> StorageResult<RequestInfo<FullMetadata>> {
    let url = storage.request_url(&location.full_server_url());
    let timeout = storage.settings().max_operation_retry_time;
    let body = metadata.to_patch_body()?;

    Ok(RequestInfo::new(url, Method::PATCH, timeout, metadata_handler(location))
        .with_headers(default_json_headers())
        .with_body(RequestBody::Text(body.to_string()))
        .with_error_handler(object_error_handler(location)))
}

pub fn list_request(storage: &FirebaseStorageImpl, location: &Location, options: &ListOptions) -> RequestInfo<ListPage> {
    let url = storage.request_url(&location.bucket_only_server_url());
    let timeout = storage.settings().max_operation_retry_time;
    let handler: ResponseHandler<ListPage> = Arc::new(|payload: ResponsePayload| ListPage::from_slice(&payload.body));

    let mut request = RequestInfo::new(url, Method::GET, timeout, handler)
        .with_error_handler(object_error_handler(location));
    for (key, value) in options.query_params(location) {
        request = request.with_query_param(key, value);
    }
    request
}

pub fn download_bytes_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    max_download_size_bytes: Option<u64>,
) -> RequestInfo<Vec<u8>> {
    let url = storage.request_url(&location.full_server_url());
    let timeout = storage.settings().max_operation_retry_time;
    let handler: ResponseHandler<Vec<u8>> = Arc::new(move |payload: ResponsePayload| {
        let mut body = payload.body;
        if let Some(limit) = max_download_size_bytes {
            body.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(body)
    });

    let mut request = RequestInfo::new(url, Method::GET, timeout, handler)
        .with_query_param("alt", "media")
        .with_error_handler(object_error_handler(location));

    if let Some(limit) = max_download_size_bytes {
        request = request
            .with_header("Range", format!("bytes=0-{limit}"))
            .with_success_codes(vec![200, 206]);
    }
    request
}

pub fn delete_object_request(storage: &FirebaseStorageImpl, location: &Location) -> RequestInfo<()> {
    let url = storage.request_url(&location.full_server_url());
    let timeout = storage.settings().max_operation_retry_time;
    let handler: ResponseHandler<()> = Arc::new(|_| Ok(()));

    RequestInfo::new(url, Method::DELETE, timeout, handler)
        .with_success_codes(vec![200, 204])
        .with_error_handler(object_error_handler(location))
}

pub fn multipart_upload_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    data: &[u8],
    metadata: &UploadMetadata,
) -> RequestInfo<FullMetadata> {
    let url = storage.request_url(&location.bucket_only_server_url());
    let timeout = storage.settings().max_upload_retry_time;

    let resource = upload_resource(location.path(), data.len(), metadata);
    let content_type = resource["contentType"].as_str().unwrap_or("application/octet-stream").to_string();
    let resource_json = resource.to_string();

    let boundary = generate_boundary();
    let mut body = Vec::with_capacity(resource_json.len() + data.len() + boundary.len() * 3 + 128);
    push_multipart_segment(&mut body, &boundary, "Content-Type: application/json; charset=utf-8", resource_json.as_bytes());
    push_multipart_segment(&mut body, &boundary, &format!("Content-Type: {content_type}"), data);
    finalize_multipart(&mut body, &boundary);

    RequestInfo::new(url, Method::POST, timeout, metadata_handler(location))
        .with_query_param("name", location.path())
        .with_header("Content-Type", format!("multipart/related; boundary={boundary}"))
        .with_header("X-Goog-Upload-Protocol", "multipart")
        .with_body(RequestBody::Bytes(body))
        .with_error_handler(object_error_handler(location))
}

pub fn create_resumable_upload_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    total_size: usize,
    metadata: &UploadMetadata,
) -> RequestInfo<String> {
    let url = storage.request_url(&location.bucket_only_server_url());
    let timeout = storage.settings().max_upload_retry_time;

    let resource = upload_resource(location.path(), total_size, metadata);
    let content_type = resource["contentType"].as_str().unwrap_or("application/octet-stream").to_string();

    let handler: ResponseHandler<String> = Arc::new(|payload: ResponsePayload| {
        check_upload_status(&payload)?;
        payload
            .header("X-Goog-Upload-URL")
            .map(str::to_owned)
            .ok_or_else(|| internal_error("missing resumable upload url"))
    });

    RequestInfo::new(url, Method::POST, timeout, handler)
        .with_query_param("name", location.path())
        .with_headers(default_json_headers())
        .with_header("X-Goog-Upload-Protocol", "resumable")
        .with_header("X-Goog-Upload-Command", "start")
        .with_header("X-Goog-Upload-Header-Content-Length", total_size.to_string())
        .with_header("X-Goog-Upload-Header-Content-Type", content_type)
        .with_body(RequestBody::Text(resource.to_string()))
        .with_error_handler(object_error_handler(location))
}

pub fn get_resumable_upload_status_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    upload_url: &str,
    total_size: u64,
) -> RequestInfo<ResumableUploadStatus> {
    let timeout = storage.settings().max_upload_retry_time;
    let handler: ResponseHandler<ResumableUploadStatus> = Arc::new(move |payload: ResponsePayload| {
        let status = check_upload_status(&payload)?;
        let received = payload
            .header("X-Goog-Upload-Size-Received")
            .ok_or_else(|| internal_error("missing upload size header"))?;
        let current = received
            .trim()
            .parse::<u64>()
            .map_err(|_| internal_error(format!("invalid upload size header '{received}'")))?;

        Ok(ResumableUploadStatus {
            current,
            total: total_size,
            finalized: status == UploadSessionStatus::Final,
            metadata: None,
        })
    });

    RequestInfo::new(upload_url, Method::POST, timeout, handler)
        .with_header("X-Goog-Upload-Command", "query")
        .with_header("X-Goog-Upload-Protocol", "resumable")
        .with_error_handler(object_error_handler(location))
}

pub fn continue_resumable_upload_request(
    storage: &FirebaseStorageImpl,
    location: &Location,
    upload_url: &str,
    start_offset: u64,
    total_size: u64,
    chunk: Vec<u8>,
    finalize: bool,
) -> RequestInfo<ResumableUploadStatus> {
    let timeout = storage.settings().max_upload_retry_time;
    let bytes_to_upload = chunk.len() as u64;
    let bucket = location.bucket().to_string();

    let handler: ResponseHandler<ResumableUploadStatus> = Arc::new(move |payload: ResponsePayload| {
        let status = check_upload_status(&payload)?;
        let finalized = status == UploadSessionStatus::Final;
        let metadata = if finalized {
            let value = serde_json::from_slice(&payload.body)
                .map_err(|err| internal_error(format!("final upload response missing metadata: {err}")))?;
            Some(FullMetadata::from_wire(value, &bucket)?)
        } else {
            None
        };

        Ok(ResumableUploadStatus {
            current: (start_offset + bytes_to_upload).min(total_size),
            total: total_size,
            finalized,
            metadata,
        })
    });

    let command = match (finalize, chunk.is_empty()) {
        (true, true) => "finalize",
        (true, false) => "upload, finalize",
        (false, _) => "upload",
    };

    RequestInfo::new(upload_url, Method::POST, timeout, handler)
        .with_header("X-Goog-Upload-Protocol", "resumable")
        .with_header("X-Goog-Upload-Command", command)
        .with_header("X-Goog-Upload-Offset", start_offset.to_string())
        .with_header("Content-Type", "application/octet-stream")
        .with_body(RequestBody::Bytes(chunk))
        .with_success_codes(vec![200, 201, 308])
        .with_error_handler(object_error_handler(location))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadSessionStatus {
    Active,
    Final,
}

fn check_upload_status(payload: &ResponsePayload) -> StorageResult<UploadSessionStatus> {
    let status = payload
        .header("X-Goog-Upload-Status")
        .ok_or_else(|| internal_error("missing resumable upload status header"))?;
    match status.trim().to_ascii_lowercase().as_str() {
        "active" => Ok(UploadSessionStatus::Active),
        "final" => Ok(UploadSessionStatus::Final),
        other => Err(internal_error(format!("unexpected resumable upload status '{other}'"))),
    }
}

fn generate_boundary() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}

fn push_multipart_segment(body: &mut Vec<u8>, boundary: &str, header: &str, data: &[u8]) {
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(header.as_bytes());
    body.extend_from_slice(b"\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
}

fn finalize_multipart(body: &mut Vec<u8>, boundary: &str) {
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--");
}
