//! Per-call protocol: dedupe registration, auth attachment, 401 refresh-and-replay,
//! transient retry and envelope unwrapping.

mod envelope;
mod transport;

use std::future::Future;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::Error;
use crate::request::{CancelSignal, PendingGuard, RequestDescriptor, RequestKey};
use crate::request_context::RequestDispatchContext;
use crate::retry::{FailureKind, RetryDecision, RetryOutcome, classify};

pub use envelope::{normalize, raw_envelope, unwrap_envelope};
pub use transport::{RawResponse, ReqwestTransport, Transport};

#[derive(Clone)]
pub struct RequestPipeline {
    ctx: RequestDispatchContext,
}

impl RequestPipeline {
    pub fn new(ctx: RequestDispatchContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RequestDispatchContext {
        &self.ctx
    }

    /// Registers the call under its request key before returning, cancelling any
    /// identical call still in flight. The returned future performs the call and
    /// releases the registration when it settles or is dropped.
    pub fn execute(
        &self,
        descriptor: RequestDescriptor,
    ) -> impl Future<Output = Result<Value, Error>> + Send + use<> {
        let key = RequestKey::from_descriptor(&descriptor);
        let pending = self.ctx.pending();
        let (guard, signal) = if descriptor.dedupe {
            let (ticket, signal) = pending.register(key.clone());
            (PendingGuard::new(pending, ticket), signal)
        } else {
            (PendingGuard::detached(pending), CancelSignal::detached())
        };
        let ctx = self.ctx.clone();
        async move {
            let _guard = guard;
            let result = Dispatch { ctx: &ctx, key: &key }.run(descriptor, signal).await;
            if let Err(err @ Error::Cancelled { .. }) = &result {
                debug!(error = %err, "request.cancelled");
            }
            result
        }
    }
}

struct Dispatch<'a> {
    ctx: &'a RequestDispatchContext,
    key: &'a RequestKey,
}

impl Dispatch<'_> {
    async fn run(
        &self,
        mut descriptor: RequestDescriptor,
        mut signal: CancelSignal,
    ) -> Result<Value, Error> {
        let started = Instant::now();
        let plan = descriptor
            .retry
            .clone()
            .unwrap_or_else(|| self.ctx.retry().clone());
        // credentials delivered by a refresh, used for the replay that follows it
        let mut replay_auth: Option<String> = None;

        let result = loop {
            match replay_auth.take() {
                Some(auth) => descriptor.set_authorization(auth),
                None => self.attach_authorization(&mut descriptor).await,
            }

            let attempt = tokio::select! {
                biased;
                _ = signal.cancelled() => Err(self.cancelled()),
                res = self.dispatch(&descriptor) => res,
            };
            let err = match attempt {
                Ok(value) => break Ok(value),
                Err(err) => err,
            };

            match classify(&err) {
                FailureKind::Cancelled => break Err(err),
                FailureKind::AuthExpired if self.may_refresh(&descriptor) => {
                    descriptor.auth_retried = true;
                    let refreshed = tokio::select! {
                        biased;
                        _ = signal.cancelled() => Err(self.cancelled()),
                        res = self.fresh_authorization(&descriptor) => res,
                    };
                    match refreshed {
                        Ok(auth) => {
                            replay_auth = Some(auth);
                            continue;
                        }
                        Err(err) => break Err(err),
                    }
                }
                _ => {}
            }

            match plan.decide(&descriptor, &err) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        method = %descriptor.method,
                        url = %descriptor.url,
                        attempt = descriptor.attempt + 1,
                        max_retries = plan.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retry.scheduling"
                    );
                    tokio::select! {
                        biased;
                        _ = signal.cancelled() => break Err(self.cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    descriptor.attempt += 1;
                    descriptor.transient_retried = true;
                }
                RetryDecision::NoRetry => break Err(err),
            }
        };

        if descriptor.transient_retried {
            RetryOutcome {
                method: descriptor.method.to_string(),
                url: descriptor.url.clone(),
                attempts: descriptor.attempt + 1,
                success: result.is_ok(),
                total_delay: started.elapsed(),
            }
            .log();
        }
        result
    }

    /// Sends one attempt under the effective timeout and unwraps the envelope.
    async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Value, Error> {
        let config = self.ctx.config();
        let timeout = descriptor.timeout.unwrap_or_else(|| config.timeout());
        debug!(
            method = %descriptor.method,
            url = %descriptor.url,
            attempt = descriptor.attempt,
            auth_retried = descriptor.auth_retried,
            "request.dispatch"
        );
        let raw = tokio::time::timeout(timeout, self.ctx.transport().send(descriptor))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        if !raw.status.is_success() {
            return Err(Error::Http {
                status: raw.status,
                body: raw.body,
            });
        }
        if descriptor.transform_response {
            normalize(&descriptor.method, raw, config.success_code)
        } else {
            raw_envelope(&descriptor.method, raw)
        }
    }

    async fn attach_authorization(&self, descriptor: &mut RequestDescriptor) {
        if !descriptor.with_token {
            return;
        }
        match self.ctx.tokens().authorization().await {
            Some(auth) => descriptor.set_authorization(auth),
            None => descriptor.clear_authorization(),
        }
    }

    /// Calls sent without credentials never refresh; their 401 is the caller's.
    fn may_refresh(&self, descriptor: &RequestDescriptor) -> bool {
        descriptor.with_token
            && !descriptor.auth_retried
            && !self.ctx.config().is_refresh_excluded(&descriptor.url)
    }

    /// Credentials for the replay after a 401. When the store already holds a token
    /// other than the one this attempt sent, a refresh finished in the meantime and
    /// the request is replayed with it directly.
    async fn fresh_authorization(&self, descriptor: &RequestDescriptor) -> Result<String, Error> {
        if let Some(current) = self.ctx.tokens().authorization().await
            && descriptor.authorization() != Some(current.as_str())
        {
            debug!(url = %descriptor.url, "refresh.skipped");
            return Ok(current);
        }
        self.ctx.refresh().refresh().await.map(|token| token.authorization())
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            key: self.key.to_string(),
        }
    }
}
