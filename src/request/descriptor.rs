use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::errors::Error;
use crate::retry::RetryPlan;

pub const AUTHORIZATION: &str = "Authorization";

/// Per-call switches callers may flip; everything else comes from the client config.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Attach the `Authorization` header. Only the login call turns this off.
    pub with_token: bool,
    /// Cancel an identical in-flight request when this one is issued.
    pub dedupe: bool,
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
    /// Replaces the client's retry plan for this call.
    pub retry: Option<RetryPlan>,
    /// Resolve with `data` after checking `code`. When off, the call resolves with
    /// the whole `{code, message, data}` envelope and never fails on `code`.
    pub transform_response: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            with_token: true,
            dedupe: true,
            timeout: None,
            headers: BTreeMap::new(),
            retry: None,
            transform_response: true,
        }
    }
}

impl RequestOptions {
    pub fn without_token() -> Self {
        Self {
            with_token: false,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Let identical requests run side by side instead of superseding each other.
    pub fn allow_duplicates(mut self) -> Self {
        self.dedupe = false;
        self
    }

    /// `Some(plan)` overrides the client's retry plan; `None` disables retries.
    pub fn retry(mut self, plan: Option<RetryPlan>) -> Self {
        self.retry = Some(plan.unwrap_or_else(RetryPlan::disabled));
        self
    }

    pub fn raw_envelope(mut self) -> Self {
        self.transform_response = false;
        self
    }
}

/// One logical call. Created once and threaded through every retry and replay.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub params: BTreeMap<String, Value>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    /// Transient-failure retries performed so far.
    pub attempt: u32,
    /// Set once the call has been replayed after a token refresh.
    pub auth_retried: bool,
    /// Set once the call has been resent after a transient failure.
    pub transient_retried: bool,
    pub with_token: bool,
    pub dedupe: bool,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPlan>,
    pub transform_response: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            body: None,
            headers: BTreeMap::new(),
            attempt: 0,
            auth_retried: false,
            transient_retried: false,
            with_token: true,
            dedupe: true,
            timeout: None,
            retry: None,
            transform_response: true,
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.with_token = options.with_token;
        self.dedupe = options.dedupe;
        self.timeout = options.timeout;
        self.retry = options.retry;
        self.transform_response = options.transform_response;
        self.headers.extend(options.headers);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Merges a serializable struct or map into the query parameters.
    pub fn params<P: Serialize + ?Sized>(mut self, params: &P) -> Result<Self, Error> {
        match serde_json::to_value(params)? {
            Value::Object(map) => {
                self.params.extend(map);
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(Error::Config(format!(
                "query parameters must serialize to an object, got {other}"
            ))),
        }
    }

    /// Sets the JSON body. A body serializing to `null` sends nothing.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?).filter(|b| !b.is_null());
        Ok(self)
    }

    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE
        )
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).map(String::as_str)
    }

    pub(crate) fn set_authorization(&mut self, value: impl Into<String>) {
        self.headers.insert(AUTHORIZATION.to_string(), value.into());
    }

    pub(crate) fn clear_authorization(&mut self) {
        self.headers.remove(AUTHORIZATION);
    }

    /// Query parameters rendered for the wire; `null` values are dropped.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), render_param(value)))
            .collect()
    }
}

pub(crate) fn render_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => super::key::canonical_json(other),
    }
}
