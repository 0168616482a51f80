mod client;
mod config;
mod errors;
mod pipeline;
mod refresh;
mod request;
mod request_context;
mod retry;
mod telemetry;
mod token;
mod types;

pub use client::{AdminClient, AuthApi};
pub use config::{
    ClientConfig, ConfigLocation, DEFAULT_BASE_URL, LOGIN_API, LOGOUT_API, REFRESH_TOKEN_API,
    read_config,
};
pub use errors::Error;
pub use pipeline::{
    RawResponse, RequestPipeline, ReqwestTransport, Transport, raw_envelope, unwrap_envelope,
};
pub use refresh::{RefreshCoordinator, RefreshPhase, RefreshedToken, TokenRefresher};
pub use request::{
    AUTHORIZATION, CancelSignal, PendingRegistry, PendingTicket, RequestDescriptor, RequestKey,
    RequestOptions, canonical_json,
};
pub use request_context::RequestDispatchContext;
pub use retry::{FailureKind, RetryDecision, RetryOutcome, RetryPlan, classify};
pub use telemetry::refresh::RefreshTelemetry;
pub use token::{
    FileStorage, MemoryStorage, RefreshTokenCipher, TokenMeta, TokenRecord, TokenStorage,
    TokenStore, jwt_expiry,
};
pub use types::{Envelope, LoginRequest, RefreshTokenRequest, TokenResponse};

#[cfg(test)]
mod tests;
