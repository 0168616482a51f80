use std::future::Future;
use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::client::auth::AuthApi;
use crate::config::{ClientConfig, ConfigLocation, read_config};
use crate::errors::Error;
use crate::pipeline::{RequestPipeline, ReqwestTransport, Transport};
use crate::refresh::RefreshPhase;
use crate::request::{PendingRegistry, RequestDescriptor, RequestOptions};
use crate::request_context::RequestDispatchContext;
use crate::retry::RetryPlan;
use crate::token::{
    FileStorage, MemoryStorage, RefreshTokenCipher, TokenMeta, TokenRecord, TokenStorage,
    TokenStore,
};
use crate::types::{LoginRequest, RefreshTokenRequest, TokenResponse};

use super::AdminClient;

impl AdminClient {
    /// Create a new AdminClient
    /// # Arguments
    /// * `config` - Explicit configuration (`ClientConfig`), typically loaded via `ClientConfig::from_file` or `ClientConfig::from_env`.
    /// # ENV Vars (when using `ClientConfig::from_env`)
    /// * `ADMIN_API_URL` - Dashboard API base URL
    /// * `ADMIN_TOKEN_PATH` - Optional JSON file the tokens persist to
    /// * `ADMIN_ENCRYPT_REFRESH_TOKEN` - Encrypt the persisted refresh token
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.base_url.clone())?);
        let tokens = Arc::new(open_token_store(&config)?);
        Ok(Self::with_transport(config, transport, tokens))
    }

    pub fn from_location(loc: ConfigLocation) -> Result<Self, Error> {
        Self::new(read_config(loc)?)
    }

    /// Assembles a client over any transport and token store.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
    ) -> Self {
        let config = Arc::new(config);
        let auth = Arc::new(AuthApi::new(Arc::clone(&transport), Arc::clone(&config)));
        let ctx = RequestDispatchContext::build(Arc::clone(&config), transport, tokens, auth);
        Self {
            pipeline: RequestPipeline::new(ctx),
            config,
        }
    }

    pub fn with_retry_plan(mut self, plan: RetryPlan) -> Self {
        let ctx = self.pipeline.context().clone().with_retry_plan(plan);
        self.pipeline = RequestPipeline::new(ctx);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> Arc<TokenStore> {
        self.pipeline.context().tokens()
    }

    pub fn pending(&self) -> Arc<PendingRegistry> {
        self.pipeline.context().pending()
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        self.pipeline.context().refresh().phase()
    }

    /// Issues a prepared request. Registration for dedupe happens before this returns,
    /// so a later identical call cancels this one even if it has not been polled yet.
    pub fn request<T>(
        &self,
        descriptor: RequestDescriptor,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T>
    where
        T: DeserializeOwned,
    {
        self.call(Ok(descriptor))
    }

    pub fn get<T, P>(
        &self,
        url: &str,
        params: &P,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T, P>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.call(
            RequestDescriptor::new(Method::GET, url)
                .with_options(options)
                .params(params),
        )
    }

    pub fn delete<T, P>(
        &self,
        url: &str,
        params: &P,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T, P>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.call(
            RequestDescriptor::new(Method::DELETE, url)
                .with_options(options)
                .params(params),
        )
    }

    pub fn post<T, B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T, B>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(
            RequestDescriptor::new(Method::POST, url)
                .with_options(options)
                .json(body),
        )
    }

    pub fn put<T, B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T, B>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(
            RequestDescriptor::new(Method::PUT, url)
                .with_options(options)
                .json(body),
        )
    }

    pub fn patch<T, B>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T, B>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(
            RequestDescriptor::new(Method::PATCH, url)
                .with_options(options)
                .json(body),
        )
    }

    /// Exchanges credentials for a token pair and stores it.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenRecord, Error> {
        let resp: TokenResponse = self
            .post(
                &self.config.login_path,
                &LoginRequest { username, password },
                RequestOptions::without_token(),
            )
            .await?;
        let meta = TokenMeta::from_response(&resp)?;
        let record = TokenRecord::new(
            resp.access_token,
            resp.refresh_token.unwrap_or_default(),
            meta,
        );
        // a persistence failure is logged by the store; the session still works
        let _ = self
            .tokens()
            .set_tokens(
                record.access_token.clone(),
                record.refresh_token.clone(),
                record.meta.clone(),
            )
            .await;
        info!(username, "login ok");
        Ok(record)
    }

    /// Revokes the refresh token server-side, then cancels every pending request and
    /// clears the stored tokens. Local state is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), Error> {
        let tokens = self.tokens();
        let revoked = match tokens.refresh_token().await {
            Some(refresh_token) => self
                .post::<Value, _>(
                    &self.config.logout_path,
                    &RefreshTokenRequest {
                        refresh_token: &refresh_token,
                    },
                    RequestOptions::default(),
                )
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        let cancelled = self.cancel_all();
        let _ = tokens.clear().await;
        info!(cancelled, revoked = revoked.is_ok(), "logout");
        revoked
    }

    /// Cancels every pending request; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.pending().release_all()
    }

    pub async fn is_authenticated(&self) -> bool {
        let tokens = self.tokens();
        tokens.access_token().await.is_some() && !tokens.is_access_token_expired().await
    }

    fn call<T>(
        &self,
        built: Result<RequestDescriptor, Error>,
    ) -> impl Future<Output = Result<T, Error>> + Send + use<T>
    where
        T: DeserializeOwned,
    {
        let call = built.map(|descriptor| self.pipeline.execute(descriptor));
        async move {
            let value = call?.await?;
            Ok(serde_json::from_value(value)?)
        }
    }
}

fn open_token_store(config: &ClientConfig) -> Result<TokenStore, Error> {
    let storage: Arc<dyn TokenStorage> = match &config.token_path {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(MemoryStorage::new()),
    };
    let cipher = config
        .encrypt_refresh_token
        .then(RefreshTokenCipher::default);
    TokenStore::load(storage, cipher)
}
