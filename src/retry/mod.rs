//! Retry and backoff policy for transient failures.
//!
//! Classification lives here too so the pipeline and the policy agree on which
//! failures are transient.

mod classify;
mod outcome;
mod plan;

pub use classify::{FailureKind, classify};
pub use outcome::RetryOutcome;
pub use plan::{RetryDecision, RetryPlan};
