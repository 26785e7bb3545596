//! ---
//! pulse_section: "15-testing-qa-runbook"
//! pulse_subsection: "tests"
//! pulse_type: "test"
//! pulse_scope: "code"
//! pulse_description: "Every log line of a request carries that request's trace identifier."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use pulse_api::{build_router, with_request_pipeline, ApiState};
use pulse_logging::{PipelineLayer, RecordFormat, Sink};
use serde_json::Value;
use tower::ServiceExt;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn records(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let layer = PipelineLayer::new().with_sink(Sink::new(
        "json",
        RecordFormat::Json,
        LevelFilter::DEBUG,
        captured.clone(),
    ));
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));
    (captured, guard)
}

fn traced_request(method: &str, uri: &str, trace_id: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-trace-id", trace_id)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

/// Records produced by the service itself, leaving out the HTTP span events.
fn service_records(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter(|record| !record["name"].as_str().unwrap_or_default().starts_with("tower_http"))
        .collect()
}

#[tokio::test]
async fn create_request_lines_share_trace_id() {
    let (captured, _guard) = capture();
    let router = build_router(Arc::new(ApiState::new("test")));

    let response = router
        .oneshot(traced_request("POST", "/api/v1/data", "corr-create", r#"{"key":"value"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let records = service_records(captured.records());
    let messages: Vec<&str> = records
        .iter()
        .map(|record| record["message"].as_str().unwrap())
        .collect();
    assert_eq!(
        messages.first().copied(),
        Some("Request: POST /api/v1/data")
    );
    assert!(messages.iter().any(|m| m.starts_with("Calling create_data with args=")));
    assert!(messages.iter().any(|m| m.starts_with("Creating new data: ")));
    assert!(messages.iter().any(|m| m.starts_with("create_data returned ")));
    assert_eq!(
        messages.last().copied(),
        Some("Response: POST /api/v1/data -> 201")
    );
    for record in &records {
        assert_eq!(record["trace_id"], "corr-create", "record {record}");
        assert!(record["request_id"].is_string());
    }
}

#[tokio::test]
async fn rejected_request_is_still_correlated() {
    let (captured, _guard) = capture();
    let router = build_router(Arc::new(ApiState::new("test")));

    let response = router
        .oneshot(traced_request("POST", "/api/v1/data", "corr-bad", "{broken"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let records = service_records(captured.records());
    assert!(!records.is_empty());
    assert!(records.iter().all(|record| record["trace_id"] == "corr-bad"));
    assert!(records
        .iter()
        .all(|record| !record["message"].as_str().unwrap().starts_with("Calling create_data")));
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_trace_ids() {
    let (captured, _guard) = capture();
    let routes = Router::new().route(
        "/work",
        get(|| async {
            info!("step one");
            tokio::time::sleep(Duration::from_millis(20)).await;
            info!("step two");
            "done"
        }),
    );
    let router = with_request_pipeline(routes);

    let requests = (0..6).map(|n| {
        let router = router.clone();
        async move {
            router
                .oneshot(traced_request("GET", "/work", &format!("worker-{n}"), ""))
                .await
                .unwrap()
        }
    });
    for response in futures::future::join_all(requests).await {
        assert_eq!(response.status(), 200);
    }

    let mut by_trace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in service_records(captured.records()) {
        by_trace
            .entry(record["trace_id"].as_str().unwrap().to_owned())
            .or_default()
            .push(record["message"].as_str().unwrap().to_owned());
    }
    assert_eq!(by_trace.len(), 6);
    for (trace_id, messages) in by_trace {
        assert!(trace_id.starts_with("worker-"));
        assert_eq!(
            messages,
            vec![
                "Request: GET /work".to_owned(),
                "step one".to_owned(),
                "step two".to_owned(),
                "Response: GET /work -> 200".to_owned(),
            ],
            "trace {trace_id}"
        );
    }
}
