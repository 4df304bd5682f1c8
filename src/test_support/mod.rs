//! Test utilities shared across crate-level unit tests.

pub mod backend;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::app::{FirebaseApp, FirebaseAppConfig, FirebaseOptions};
use crate::storage::request::TransportArc;
use crate::storage::FirebaseStorageImpl;

pub use backend::{ChunkGate, FakeObject, FakeStorageBackend};

static APP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// App names must be unique per test because the registry is process wide.
pub fn unique_app_name(prefix: &str) -> String {
    format!("{prefix}-{}", APP_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// An unregistered app with its own service registry.
pub fn test_app(prefix: &str, bucket: Option<&str>) -> FirebaseApp {
    let options = FirebaseOptions {
        api_key: Some("test-api-key".into()),
        project_id: Some("demo-project".into()),
        storage_bucket: bucket.map(str::to_owned),
        ..Default::default()
    };
    FirebaseApp::new(options, FirebaseAppConfig::new(unique_app_name(prefix), false))
}

/// Storage for `bucket` backed by a fresh in-memory backend.
pub fn storage_with_bucket(bucket: &str) -> Arc<FirebaseStorageImpl> {
    storage_with_backend(bucket, &FakeStorageBackend::new())
}

pub fn storage_with_backend(bucket: &str, backend: &FakeStorageBackend) -> Arc<FirebaseStorageImpl> {
    let app = test_app("storage", Some(bucket));
    let transport: TransportArc = Arc::new(backend.clone());
    match FirebaseStorageImpl::new(app, None, Some(transport)) {
        Ok(storage) => Arc::new(storage),
        Err(err) => panic!("failed to build test storage: {err}"),
    }
}
