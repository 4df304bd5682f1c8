use std::time::Duration;

use crate::storage::constants::{
    DEFAULT_MAX_OPERATION_RETRY_TIME_MS, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_MAX_UPLOAD_RETRY_TIME_MS,
    DEFAULT_RETRY_INITIAL_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, MAX_RESUMABLE_CHUNK_SIZE, RESUMABLE_UPLOAD_CHUNK_SIZE,
};
use crate::storage::error::{invalid_argument, StorageResult};

/// Which failures are retried and how long to wait between attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retries allowed after the first attempt.
    pub max_attempts: u32,
    /// Status codes retried in addition to 5xx, 408 and 429.
    pub extra_retry_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            extra_retry_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16, request_codes: &[u16]) -> bool {
        (500..600).contains(&status)
            || matches!(status, 408 | 429)
            || self.extra_retry_codes.contains(&status)
            || request_codes.contains(&status)
    }
}

/// Tunables applied to every request issued by one storage instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageSettings {
    pub max_operation_retry_time: Duration,
    pub max_upload_retry_time: Duration,
    /// First resumable chunk size; must be a positive multiple of 256 KiB.
    pub chunk_size: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_operation_retry_time: Duration::from_millis(DEFAULT_MAX_OPERATION_RETRY_TIME_MS),
            max_upload_retry_time: Duration::from_millis(DEFAULT_MAX_UPLOAD_RETRY_TIME_MS),
            chunk_size: RESUMABLE_UPLOAD_CHUNK_SIZE,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl StorageSettings {
    pub fn validate(&self) -> StorageResult<()> {
        if self.chunk_size == 0
            || self.chunk_size % RESUMABLE_UPLOAD_CHUNK_SIZE != 0
            || self.chunk_size > MAX_RESUMABLE_CHUNK_SIZE
        {
            return Err(invalid_argument(format!(
                "chunk_size must be a multiple of {RESUMABLE_UPLOAD_CHUNK_SIZE} bytes no larger than {MAX_RESUMABLE_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.retry_policy.initial_delay > self.retry_policy.max_delay {
            return Err(invalid_argument("retry initial_delay must not exceed max_delay"));
        }
        Ok(())
    }
}
