mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashboard_http::RequestOptions;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::{capture_logs, client, envelope};

#[tokio::test]
async fn get_backs_off_exponentially_on_503() {
    let server = MockServer::start().await;
    let arrivals: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let arrivals_clone = arrivals.clone();

    Mock::given(method("GET"))
        .and(path("/monitor/server"))
        .respond_with(move |_: &Request| {
            let mut guard = arrivals_clone.lock().unwrap();
            guard.push(Instant::now());
            if guard.len() < 3 {
                ResponseTemplate::new(503)
            } else {
                envelope(json!({"cpu": 12}))
            }
        })
        .expect(3)
        .mount(&server)
        .await;

    let (lines, guard) = capture_logs();
    let value: Value = client(&server)
        .get("/monitor/server", &(), RequestOptions::default())
        .await
        .expect("third attempt succeeds");
    drop(guard);
    assert_eq!(value, json!({"cpu": 12}));

    let arrivals = arrivals.lock().unwrap();
    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];
    assert!(first_gap >= Duration::from_millis(50), "first gap {first_gap:?}");
    assert!(second_gap >= Duration::from_millis(100), "second gap {second_gap:?}");

    let logs = lines.lock().unwrap().clone();
    assert!(
        logs.iter()
            .any(|line| line.contains("WARN") && line.contains("retry.scheduling")),
        "expected retry.scheduling warning, got: {:?}",
        logs
    );
}

#[tokio::test]
async fn post_503_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/system/users"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .post::<Value, _>("/system/users", &json!({"name": "ann"}), RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn exhausted_retries_return_the_last_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/cache"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .get::<Value, _>("/monitor/cache", &(), RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_GATEWAY));
}
