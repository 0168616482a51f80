use std::time::Duration;

use crate::config::ClientConfig;
use crate::errors::Error;
use crate::request::RequestDescriptor;

use super::classify::{FailureKind, classify};

/// Decision returned by the retry plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Bounded exponential backoff for idempotent requests.
#[derive(Clone, Debug)]
pub struct RetryPlan {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each one after.
    pub retry_delay: Duration,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPlan {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// A plan that never retries.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// `retry_delay × 2^(n−1)` for the 1-based retry `n`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1u32 << exp)
    }

    pub fn decide(&self, descriptor: &RequestDescriptor, err: &Error) -> RetryDecision {
        if !descriptor.is_idempotent() || classify(err) != FailureKind::Transient {
            return RetryDecision::NoRetry;
        }
        if descriptor.attempt >= self.max_retries {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for_attempt(descriptor.attempt + 1))
    }
}
