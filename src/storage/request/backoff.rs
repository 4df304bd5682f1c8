use rand::Rng;
use std::time::{Duration, Instant};

use crate::storage::settings::RetryPolicy;

/// Configuration for exponential backoff when issuing storage requests.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Total time budget for the request, including all retries.
    pub total_timeout: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl BackoffConfig {
    pub fn from_policy(policy: &RetryPolicy, total_timeout: Duration) -> Self {
        Self {
            initial_delay: policy.initial_delay,
            max_delay: policy.max_delay,
            total_timeout,
            max_retries: policy.max_attempts,
        }
    }
}

/// Tracks the evolving backoff state across attempts.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    retries: u32,
    deadline: Instant,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        let deadline = Instant::now() + config.total_timeout;
        Self {
            config,
            retries: 0,
            deadline,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn has_time_remaining(&self) -> bool {
        Instant::now() < self.deadline
    }

    pub fn can_retry(&self) -> bool {
        self.retries < self.config.max_retries && self.has_time_remaining()
    }

    /// Consumes one retry and returns how long to wait before issuing it.
    pub fn next_delay(&mut self) -> Duration {
        let exp = 2u32.saturating_pow(self.retries.min(16));
        self.retries += 1;

        let base = self.config.initial_delay.saturating_mul(exp).min(self.config.max_delay);
        let jitter: f64 = rand::thread_rng().gen();
        let jittered = base.mul_f64(1.0 + jitter).min(self.config.max_delay);

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        jittered.min(remaining)
    }

    /// Starts a fresh retry sequence after a success, keeping the overall deadline.
    pub fn reset(&mut self) {
        self.retries = 0;
    }
}
