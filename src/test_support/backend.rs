//! In-memory Cloud Storage backend speaking the REST and resumable upload protocols.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::Method;
use serde_json::{json, Map, Value};
use url::Url;

use crate::storage::request::{HttpRequest, ResponsePayload, StorageTransport, TransportError};

const SESSION_PREFIX: &str = "https://uploads.storage.test/session/";

#[derive(Clone, Debug, PartialEq)]
pub struct FakeObject {
    pub data: Vec<u8>,
    pub resource: Map<String, Value>,
    pub download_token: String,
}

#[derive(Debug)]
struct Session {
    bucket: String,
    name: String,
    total: u64,
    resource: Map<String, Value>,
    received: Vec<u8>,
    finalized: bool,
}

#[derive(Default)]
struct BackendState {
    objects: BTreeMap<(String, String), FakeObject>,
    sessions: Vec<Session>,
    chunk_requests: u32,
    chunk_sizes: Vec<usize>,
    chunk_offsets: Vec<u64>,
    status_queries: u32,
    fail_once: Option<(u32, u16)>,
    fail_all: Option<u16>,
    reported_received: Option<u64>,
    next_token: u64,
}

/// Cloneable handle; clones share one backend.
#[derive(Clone, Default)]
pub struct FakeStorageBackend {
    state: Arc<Mutex<BackendState>>,
    gate: Arc<Mutex<Option<Receiver<()>>>>,
    page_size: usize,
}

/// Holds chunk uploads until released.
pub struct ChunkGate {
    permits: Sender<()>,
}

impl ChunkGate {
    /// Lets the next `count` chunk requests through.
    pub fn release(&self, count: usize) {
        for _ in 0..count {
            let _ = self.permits.try_send(());
        }
    }

    /// Lets every pending and future chunk request through.
    pub fn open(&self) {
        self.permits.close();
    }
}

impl FakeStorageBackend {
    pub fn new() -> Self {
        Self {
            page_size: 1_000,
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn insert_object(&self, bucket: &str, name: &str, data: Vec<u8>) {
        let mut state = self.state();
        let object = state.build_object(bucket, name, data, Map::new());
        state.objects.insert((bucket.to_string(), name.to_string()), object);
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<FakeObject> {
        self.state().objects.get(&(bucket.to_string(), name.to_string())).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    pub fn status_queries(&self) -> u32 {
        self.state().status_queries
    }

    /// Sizes of every chunk request received, failed ones included.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.state().chunk_sizes.clone()
    }

    pub fn chunk_offsets(&self) -> Vec<u64> {
        self.state().chunk_offsets.clone()
    }

    /// Answers the `nth` (1-based) chunk request with `status` once.
    pub fn fail_chunk_once(&self, nth: u32, status: u16) {
        self.state().fail_once = Some((nth, status));
    }

    pub fn fail_all_chunks(&self, status: u16) {
        self.state().fail_all = Some(status);
    }

    /// Overrides the byte count reported by status queries.
    pub fn report_received_bytes(&self, received: u64) {
        self.state().reported_received = Some(received);
    }

    pub fn hold_chunks(&self) -> ChunkGate {
        let (permits, receiver) = async_channel::unbounded();
        *self.gate.lock().unwrap() = Some(receiver);
        ChunkGate { permits }
    }

    async fn handle(&self, request: HttpRequest) -> ResponsePayload {
        if let Some(id) = request.url.strip_prefix(SESSION_PREFIX) {
            let id = id.parse::<usize>().unwrap_or(usize::MAX);
            return self.handle_session(id, request).await;
        }

        let Ok(url) = Url::parse(&request.url) else {
            return ResponsePayload::new(400);
        };
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        let Some(rest) = url.path().strip_prefix("/v0/b/") else {
            return ResponsePayload::new(404);
        };
        let (bucket, object) = match rest.split_once("/o") {
            Some((bucket, object)) => (decode(bucket), object.strip_prefix('/').map(decode)),
            None => return ResponsePayload::new(404),
        };

        match (request.method.clone(), object) {
            (Method::GET, None) => self.list(&bucket, &query),
            (Method::POST, None) => self.start_upload(&bucket, &query, &request),
            (Method::GET, Some(name)) => self.get(&bucket, &name, &query, &request),
            (Method::PATCH, Some(name)) => self.patch(&bucket, &name, &request),
            (Method::DELETE, Some(name)) => match self.state().objects.remove(&(bucket, name)) {
                Some(_) => ResponsePayload::new(204),
                None => ResponsePayload::new(404),
            },
            _ => ResponsePayload::new(405),
        }
    }

    fn get(&self, bucket: &str, name: &str, query: &BTreeMap<String, String>, request: &HttpRequest) -> ResponsePayload {
        let state = self.state();
        let Some(object) = state.objects.get(&(bucket.to_string(), name.to_string())) else {
            return ResponsePayload::new(404).with_body("No such object");
        };
        if query.get("alt").map(String::as_str) != Some("media") {
            return json_response(200, &Value::Object(object.resource.clone()));
        }

        let range_end = request
            .header("Range")
            .and_then(|range| range.strip_prefix("bytes=0-"))
            .and_then(|end| end.parse::<usize>().ok());
        match range_end {
            Some(end) => {
                let end = (end + 1).min(object.data.len());
                ResponsePayload::new(206).with_body(object.data[..end].to_vec())
            }
            None => ResponsePayload::new(200).with_body(object.data.clone()),
        }
    }

    fn patch(&self, bucket: &str, name: &str, request: &HttpRequest) -> ResponsePayload {
        let Ok(Value::Object(update)) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponsePayload::new(400);
        };
        let mut state = self.state();
        let Some(object) = state.objects.get_mut(&(bucket.to_string(), name.to_string())) else {
            return ResponsePayload::new(404);
        };

        for (key, value) in update {
            match (key.as_str(), value) {
                (_, Value::Null) => {
                    object.resource.remove(&key);
                }
                ("metadata", Value::Object(entries)) => {
                    let custom = object
                        .resource
                        .entry("metadata")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(custom) = custom {
                        for (entry, value) in entries {
                            if value.is_null() {
                                custom.remove(&entry);
                            } else {
                                custom.insert(entry, value);
                            }
                        }
                    }
                }
                (_, value) => {
                    object.resource.insert(key, value);
                }
            }
        }
        json_response(200, &Value::Object(object.resource.clone()))
    }

    fn list(&self, bucket: &str, query: &BTreeMap<String, String>) -> ResponsePayload {
        let prefix = query.get("prefix").cloned().unwrap_or_default();
        let state = self.state();

        let mut entries: BTreeSet<(String, bool)> = BTreeSet::new();
        for (object_bucket, name) in state.objects.keys() {
            if object_bucket != bucket {
                continue;
            }
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((folder, _)) => entries.insert((format!("{prefix}{folder}/"), true)),
                None => entries.insert((name.clone(), false)),
            };
        }

        let start = query
            .get("pageToken")
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0);
        let page_size = query
            .get("maxResults")
            .and_then(|max| max.parse::<usize>().ok())
            .unwrap_or(self.page_size);
        let page: Vec<_> = entries.iter().skip(start).take(page_size).collect();

        let prefixes: Vec<_> = page.iter().filter(|(_, folder)| *folder).map(|(name, _)| name.clone()).collect();
        let items: Vec<_> = page
            .iter()
            .filter(|(_, folder)| !*folder)
            .map(|(name, _)| json!({ "name": name, "bucket": bucket }))
            .collect();
        let mut body = json!({ "prefixes": prefixes, "items": items });
        if start + page.len() < entries.len() {
            body["nextPageToken"] = json!((start + page.len()).to_string());
        }
        json_response(200, &body)
    }

    fn start_upload(&self, bucket: &str, query: &BTreeMap<String, String>, request: &HttpRequest) -> ResponsePayload {
        let Some(name) = query.get("name").cloned() else {
            return ResponsePayload::new(400);
        };
        match request.header("X-Goog-Upload-Protocol") {
            Some("multipart") => {
                let Some((resource, data)) = parse_multipart(request) else {
                    return ResponsePayload::new(400);
                };
                let mut state = self.state();
                let object = state.build_object(bucket, &name, data, resource);
                let body = Value::Object(object.resource.clone());
                state.objects.insert((bucket.to_string(), name), object);
                json_response(200, &body)
            }
            Some("resumable") => {
                let Ok(Value::Object(resource)) = serde_json::from_slice::<Value>(&request.body) else {
                    return ResponsePayload::new(400);
                };
                let total = request
                    .header("X-Goog-Upload-Header-Content-Length")
                    .and_then(|length| length.parse().ok())
                    .unwrap_or_default();
                let mut state = self.state();
                state.sessions.push(Session {
                    bucket: bucket.to_string(),
                    name,
                    total,
                    resource,
                    received: Vec::new(),
                    finalized: false,
                });
                ResponsePayload::new(200)
                    .with_header("X-Goog-Upload-Status", "active")
                    .with_header("X-Goog-Upload-URL", format!("{SESSION_PREFIX}{}", state.sessions.len() - 1))
            }
            _ => ResponsePayload::new(400),
        }
    }

    async fn handle_session(&self, id: usize, request: HttpRequest) -> ResponsePayload {
        let command = request.header("X-Goog-Upload-Command").unwrap_or_default().to_string();
        if command == "query" {
            let mut state = self.state();
            state.status_queries += 1;
            let reported = state.reported_received;
            let Some(session) = state.sessions.get(id) else {
                return ResponsePayload::new(404);
            };
            let received = reported.unwrap_or(session.received.len() as u64);
            let status = if session.finalized { "final" } else { "active" };
            return ResponsePayload::new(200)
                .with_header("X-Goog-Upload-Status", status)
                .with_header("X-Goog-Upload-Size-Received", received.to_string());
        }

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.recv().await;
        }

        let offset = request
            .header("X-Goog-Upload-Offset")
            .and_then(|offset| offset.parse::<u64>().ok())
            .unwrap_or_default();
        let mut state = self.state();
        state.chunk_requests += 1;
        state.chunk_sizes.push(request.body.len());
        state.chunk_offsets.push(offset);

        let nth = state.chunk_requests;
        if let Some(status) = state.fail_all {
            return ResponsePayload::new(status).with_body("backend unavailable");
        }
        if let Some((fail_at, status)) = state.fail_once {
            if fail_at == nth {
                state.fail_once = None;
                return ResponsePayload::new(status).with_body("injected failure");
            }
        }

        let Some(session) = state.sessions.get_mut(id) else {
            return ResponsePayload::new(404);
        };
        if offset != session.received.len() as u64 {
            return ResponsePayload::new(400).with_body("offset mismatch");
        }
        session.received.extend_from_slice(&request.body);
        if !command.contains("finalize") {
            return ResponsePayload::new(308).with_header("X-Goog-Upload-Status", "active");
        }
        if session.received.len() as u64 != session.total {
            return ResponsePayload::new(400).with_body("size mismatch");
        }

        session.finalized = true;
        let bucket = session.bucket.clone();
        let name = session.name.clone();
        let data = session.received.clone();
        let resource = session.resource.clone();
        let object = state.build_object(&bucket, &name, data, resource);
        let body = Value::Object(object.resource.clone());
        state.objects.insert((bucket, name), object);
        json_response(200, &body).with_header("X-Goog-Upload-Status", "final")
    }
}

impl BackendState {
    fn build_object(&mut self, bucket: &str, name: &str, data: Vec<u8>, mut resource: Map<String, Value>) -> FakeObject {
        self.next_token += 1;
        let download_token = format!("token-{}", self.next_token);
        resource.remove("fullPath");
        resource.insert("bucket".into(), json!(bucket));
        resource.insert("name".into(), json!(name));
        resource.insert("size".into(), json!(data.len().to_string()));
        resource.insert("generation".into(), json!(self.next_token.to_string()));
        resource.insert("metageneration".into(), json!("1"));
        resource.insert("timeCreated".into(), json!("2024-01-01T00:00:00.000Z"));
        resource.insert("updated".into(), json!("2024-01-01T00:00:00.000Z"));
        resource.insert("downloadTokens".into(), json!(download_token));
        resource
            .entry("contentType")
            .or_insert_with(|| json!("application/octet-stream"));
        FakeObject {
            data,
            resource,
            download_token,
        }
    }
}

#[async_trait]
impl StorageTransport for FakeStorageBackend {
    async fn send(&self, request: HttpRequest) -> Result<ResponsePayload, TransportError> {
        Ok(self.handle(request).await)
    }
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

fn json_response(status: u16, body: &Value) -> ResponsePayload {
    ResponsePayload::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

fn parse_multipart(request: &HttpRequest) -> Option<(Map<String, Value>, Vec<u8>)> {
    let boundary = request.header("Content-Type")?.split("boundary=").nth(1)?.to_string();
    let body = &request.body;
    let separator = format!("\r\n--{boundary}");

    let resource_start = find(body, b"\r\n\r\n", 0)? + 4;
    let resource_end = find(body, separator.as_bytes(), resource_start)?;
    let data_start = find(body, b"\r\n\r\n", resource_end + separator.len())? + 4;
    let data_end = find(body, format!("{separator}--").as_bytes(), data_start)?;

    let resource = match serde_json::from_slice(&body[resource_start..resource_end]).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };
    Some((resource, body[data_start..data_end].to_vec()))
}
