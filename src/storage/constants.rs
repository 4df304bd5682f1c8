pub const STORAGE_TYPE: &str = "storage";

pub const DEFAULT_HOST: &str = "firebasestorage.googleapis.com";

pub const DEFAULT_PROTOCOL: &str = "https";

pub const DEFAULT_MAX_OPERATION_RETRY_TIME_MS: u64 = 2 * 60 * 1_000;

pub const DEFAULT_MAX_UPLOAD_RETRY_TIME_MS: u64 = 10 * 60 * 1_000;

/// Uploads up to this size go out as a single multipart request.
pub const RESUMABLE_UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

pub const MAX_RESUMABLE_CHUNK_SIZE: usize = 32 * 1024 * 1024;

pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1_000;

pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 64_000;

pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 8;

pub const MAX_LIST_RESULTS: u32 = 1_000;

/// Cloud Storage hosts accepted in addition to the configured one when it is the default host.
pub const CLOUD_STORAGE_HOSTS: [&str; 2] = ["storage.googleapis.com", "storage.cloud.google.com"];
