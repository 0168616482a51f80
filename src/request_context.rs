use std::sync::Arc;

use crate::config::ClientConfig;
use crate::pipeline::Transport;
use crate::refresh::{RefreshCoordinator, TokenRefresher};
use crate::request::PendingRegistry;
use crate::retry::RetryPlan;
use crate::token::TokenStore;

/// Shared context for outbound requests ensuring consistent retry/token handling.
#[derive(Clone)]
pub struct RequestDispatchContext {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    pending: Arc<PendingRegistry>,
    refresh: RefreshCoordinator,
    retry: RetryPlan,
    config: Arc<ClientConfig>,
}

impl RequestDispatchContext {
    pub fn build(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let refresh = RefreshCoordinator::new(Arc::clone(&tokens), refresher);
        Self {
            transport,
            tokens,
            pending: Arc::new(PendingRegistry::new()),
            refresh,
            retry: RetryPlan::from_config(&config),
            config,
        }
    }

    pub fn with_retry_plan(mut self, retry: RetryPlan) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn pending(&self) -> Arc<PendingRegistry> {
        Arc::clone(&self.pending)
    }

    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub fn retry(&self) -> &RetryPlan {
        &self.retry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
