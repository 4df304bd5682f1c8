use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};

use crate::platform::runtime;
use crate::storage::error::{internal_error, retry_limit_exceeded, unknown_error, StorageError, StorageResult};
use crate::storage::settings::RetryPolicy;

use super::backoff::{BackoffConfig, BackoffState};
use super::info::RequestInfo;

/// A fully resolved HTTP request handed to a [`StorageTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(self.headers.iter(), name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponsePayload {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ResponsePayload {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(self.headers.iter(), name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(mut headers: impl Iterator<Item = (&'a String, &'a String)>, name: &str) -> Option<&'a str> {
    headers
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Failures that happen before an HTTP status is available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    Network(String),
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(reason) => write!(f, "network error: {reason}"),
            TransportError::Timeout => f.write_str("request timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends storage requests. The default implementation uses `reqwest`; tests substitute an
/// in-memory backend.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StorageTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<ResponsePayload, TransportError>;
}

pub type TransportArc = Arc<dyn StorageTransport>;

#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StorageTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ResponsePayload, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        #[cfg(not(target_arch = "wasm32"))]
        {
            builder = builder.timeout(request.timeout);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.as_str().to_owned(), value.to_owned());
            }
        }
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();
        Ok(ResponsePayload { status, headers, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Outcome of a single failed attempt, classified for the caller's retry loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestFailure {
    Transient(StorageError),
    Fatal(StorageError),
}

impl RequestFailure {
    pub fn into_error(self) -> StorageError {
        match self {
            RequestFailure::Transient(err) | RequestFailure::Fatal(err) => err,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RequestFailure::Transient(_))
    }
}

/// Runs [`RequestInfo`]s over a transport.
#[derive(Clone)]
pub struct HttpClient {
    transport: TransportArc,
}

impl HttpClient {
    pub fn new(transport: TransportArc) -> Self {
        Self { transport }
    }

    /// Sends the request repeatedly until it succeeds, fails fatally, or the retry budget runs out.
    pub async fn execute<O>(&self, info: RequestInfo<O>, policy: &RetryPolicy, budget: Duration) -> StorageResult<O> {
        let mut backoff = BackoffState::new(BackoffConfig::from_policy(policy, budget));
        loop {
            match self.attempt(&info, policy).await {
                Ok(output) => return Ok(output),
                Err(RequestFailure::Fatal(err)) => return Err(err),
                Err(RequestFailure::Transient(err)) => {
                    if !backoff.can_retry() {
                        log::debug!("giving up on {} {} after {} retries: {err}", info.method, info.url, backoff.retries());
                        return Err(exhausted(err));
                    }
                    let delay = backoff.next_delay();
                    log::debug!("retrying {} {} in {delay:?}: {err}", info.method, info.url);
                    runtime::sleep(delay).await;
                }
            }
        }
    }

    /// Sends the request once and classifies any failure.
    pub async fn attempt<O>(&self, info: &RequestInfo<O>, policy: &RetryPolicy) -> Result<O, RequestFailure> {
        let request = build_http_request(info).map_err(RequestFailure::Fatal)?;
        let payload = match self.transport.send(request).await {
            Ok(payload) => payload,
            Err(err) => {
                let error = unknown_error().with_server_response(err.to_string());
                return Err(RequestFailure::Transient(error));
            }
        };

        if info.success_codes.contains(&payload.status) {
            return (info.response_handler)(payload).map_err(RequestFailure::Fatal);
        }

        let error = match &info.error_handler {
            Some(handler) => handler(&payload),
            None => unknown_error()
                .with_status(payload.status)
                .with_server_response(payload.text()),
        };
        if policy.is_retryable_status(payload.status, &info.additional_retry_codes) {
            Err(RequestFailure::Transient(error))
        } else {
            Err(RequestFailure::Fatal(error))
        }
    }
}

/// Converts the last transient error into the error reported once retries are exhausted.
pub(crate) fn exhausted(last: StorageError) -> StorageError {
    let mut error = retry_limit_exceeded();
    error.status = last.status;
    let fallback = last.to_string();
    error.server_response = last.server_response.or(Some(fallback));
    error
}

fn build_http_request<O>(info: &RequestInfo<O>) -> StorageResult<HttpRequest> {
    let mut url = Url::parse(&info.url).map_err(|err| internal_error(format!("invalid storage URL '{}': {err}", info.url)))?;
    if !info.query_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &info.query_params {
            pairs.append_pair(key, value);
        }
    }

    Ok(HttpRequest {
        method: info.method.clone(),
        url: url.to_string(),
        headers: info.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        body: info.body.clone().into_bytes(),
        timeout: info.timeout,
    })
}
