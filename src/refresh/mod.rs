//! Single-flight refresh of the access token.

mod coordinator;

use async_trait::async_trait;

use crate::errors::Error;
use crate::types::TokenResponse;

pub use coordinator::{RefreshCoordinator, RefreshPhase, RefreshedToken};

/// Performs the refresh-token exchange against the auth server.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, Error>;
}
