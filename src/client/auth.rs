use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::info;

use crate::config::ClientConfig;
use crate::errors::Error;
use crate::pipeline::{Transport, unwrap_envelope};
use crate::refresh::TokenRefresher;
use crate::request::{RequestDescriptor, RequestOptions};
use crate::types::{RefreshTokenRequest, TokenResponse};

/// Talks to the refresh endpoint directly over the transport so the exchange never
/// re-enters the pipeline's own 401 handling.
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<ClientConfig>) -> Self {
        Self { transport, config }
    }
}

#[async_trait]
impl TokenRefresher for AuthApi {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let descriptor = RequestDescriptor::new(Method::POST, self.config.refresh_path.clone())
            .with_options(RequestOptions::without_token())
            .json(&RefreshTokenRequest { refresh_token })?;
        let timeout = self.config.refresh_timeout();
        let raw = tokio::time::timeout(timeout, self.transport.send(&descriptor))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        if !raw.status.is_success() {
            return Err(Error::Http {
                status: raw.status,
                body: raw.body,
            });
        }
        let data = unwrap_envelope(&raw.body, self.config.success_code)?;
        let resp: TokenResponse = serde_json::from_value(data)?;
        info!(
            rotated = resp.refresh_token.is_some(),
            "refresh token exchanged"
        );
        Ok(resp)
    }
}
