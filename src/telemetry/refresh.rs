use std::time::{Duration, SystemTime};

use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

/// Tags every event of one refresh exchange with a shared attempt id.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn emit_start(&self, at: SystemTime) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            timestamp = ?at,
            "refresh.start"
        );
    }

    pub fn emit_queued(&self, waiters: usize) {
        event!(
            Level::DEBUG,
            attempt_id = %self.attempt_id,
            context = %self.context,
            waiters,
            "refresh.queued"
        );
    }

    pub fn emit_success(&self, waiters: usize, elapsed: Duration) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            waiters,
            elapsed_ms = elapsed.as_millis() as u64,
            "refresh.success"
        );
    }

    pub fn emit_failure(&self, error: &Error, waiters: usize) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            waiters,
            error = %error,
            "refresh.failure"
        );
    }
}
