use std::time::Duration;

use tracing::Level;
use tracing::event;

#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub method: String,
    pub url: String,
    pub attempts: u32,
    pub success: bool,
    pub total_delay: Duration,
}

impl RetryOutcome {
    pub fn log(&self) {
        event!(
            Level::INFO,
            method = %self.method,
            url = %self.url,
            attempts = self.attempts,
            success = self.success,
            total_delay_ms = self.total_delay.as_millis() as u64,
            "retry.outcome"
        );
    }
}
