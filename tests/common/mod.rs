#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dashboard_http::{AdminClient, ClientConfig};
use serde_json::{Value, json};
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Registry, fmt};
use wiremock::{MockServer, ResponseTemplate};

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

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let writer_lines = lines.clone();
    let subscriber = Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    );
    let guard = set_default(subscriber);
    (lines, guard)
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        retry_delay_ms: 50,
        ..ClientConfig::with_base_url(server.uri())
    }
}

pub fn client(server: &MockServer) -> AdminClient {
    AdminClient::new(config(server)).expect("client should build")
}

pub fn envelope(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 0, "message": "ok", "data": data}))
}

pub fn tokens(access: &str, refresh: &str) -> ResponseTemplate {
    envelope(json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "Bearer",
    }))
}

pub fn bearer(req: &wiremock::Request) -> Option<String> {
    req.headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}
