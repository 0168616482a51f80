use std::sync::Arc;

use crate::config::ClientConfig;
use crate::pipeline::RequestPipeline;

mod auth;
mod impls;

pub use auth::AuthApi;

/// Entry point for dashboard API calls. Cheap to clone; clones share the token
/// store, the pending registry and the refresh coordinator.
#[derive(Clone)]
pub struct AdminClient {
    pipeline: RequestPipeline,
    config: Arc<ClientConfig>,
}
