use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

use crate::pipeline::{RawResponse, Transport};
use crate::request::{AUTHORIZATION, RequestDescriptor};
use crate::token::{TokenMeta, TokenStore};
use crate::{AdminClient, ClientConfig, Error};

pub const BASE_URL: &str = "http://admin.test";

pub fn base_config() -> ClientConfig {
    ClientConfig {
        retry_delay_ms: 100,
        ..ClientConfig::with_base_url(BASE_URL)
    }
}

/// What the scripted server does with one request.
pub struct Reply {
    delay: Duration,
    result: Result<RawResponse, Error>,
}

impl Reply {
    pub fn data(data: Value) -> Self {
        Self::status(StatusCode::OK, json!({"code": 0, "message": "ok", "data": data}))
    }

    pub fn business(code: i64, message: &str) -> Self {
        Self::status(StatusCode::OK, json!({"code": code, "message": message}))
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(RawResponse::new(status, body.to_string())),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(RawResponse::new(status, "")),
        }
    }

    pub fn tokens(access: &str, refresh: &str) -> Self {
        Self::data(json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
        }))
    }

    pub fn network() -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(Error::Network("connection reset".into())),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
pub struct SentRequest {
    pub descriptor: RequestDescriptor,
    pub at: Instant,
}

impl SentRequest {
    pub fn authorization(&self) -> Option<&str> {
        self.descriptor.headers.get(AUTHORIZATION).map(String::as_str)
    }
}

type Handler = Box<dyn Fn(&RequestDescriptor) -> Reply + Send + Sync>;

/// In-process transport answering from a closure and recording every attempt.
pub struct ScriptedTransport {
    handler: Handler,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&RequestDescriptor) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, url: &str) -> Vec<SentRequest> {
        self.sent()
            .into_iter()
            .filter(|r| r.descriptor.url == url)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, Error> {
        self.sent.lock().unwrap().push(SentRequest {
            descriptor: request.clone(),
            at: Instant::now(),
        });
        let reply = (self.handler)(request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

pub fn scripted_client(transport: &Arc<ScriptedTransport>) -> AdminClient {
    scripted_client_with(base_config(), transport)
}

pub fn scripted_client_with(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> AdminClient {
    AdminClient::with_transport(
        config,
        transport.clone(),
        Arc::new(TokenStore::in_memory()),
    )
}

pub async fn sign_in(client: &AdminClient, access: &str, refresh: &str) {
    client
        .tokens()
        .set_tokens(access, refresh, TokenMeta::default())
        .await
        .unwrap();
}

struct VecWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl std::io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.lines.lock().unwrap();
        guard.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn make_subscriber(lines: Arc<Mutex<Vec<String>>>) -> impl tracing::Subscriber + Send + Sync {
    let writer_lines = lines.clone();
    Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    )
}

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let guard = set_default(make_subscriber(lines.clone()));
    (lines, guard)
}

pub fn drain_logs(lines: Arc<Mutex<Vec<String>>>) -> Vec<String> {
    Arc::try_unwrap(lines).unwrap().into_inner().unwrap()
}
