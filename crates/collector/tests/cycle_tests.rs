//! End-to-end collection cycles against a mock API and a recording publisher
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use collector::normalizer::Normalizer;
use collector::orchestrator::{CycleOrchestrator, CycleOutcome, CycleStage, FetchRequest};
use common::{Event, RecordingPublisher};
use collector::publisher::Publisher;
use serde_json::{json, Map};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api_returning(body: serde_json::Value) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;
    mock_server
}

fn orchestrator(server: &MockServer, max_attempts: u32) -> CycleOrchestrator {
    CycleOrchestrator::new(
        common::fetcher(&server.uri(), max_attempts, 1),
        Normalizer::default(),
        FetchRequest::new(Some("/items".to_string())),
    )
}

#[tokio::test]
async fn test_cycle_publishes_one_record_per_item() {
    let mock_server = api_returning(json!([{"id": 1}, {"id": 2}])).await;
    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();

    let outcome = orchestrator(&mock_server, 3).run_cycle(&mut publisher).await;

    assert_eq!(outcome, CycleOutcome::Completed { published: 2 });

    let log = publisher.log();
    let log = log.lock().unwrap();
    assert_eq!(log.messages.len(), 2);
    assert_eq!(log.messages[0].data, json!({"id": 1}));
    assert_eq!(log.messages[1].data, json!({"id": 2}));
    for record in &log.messages {
        assert_eq!(record.source(), Some("api_collector"));
        assert_eq!(record.version(), Some("1.0"));
        assert!(record.collected_at().is_some());
    }
}

#[tokio::test]
async fn test_cycle_wraps_single_object() {
    let mock_server = api_returning(json!({"status": "ok", "count": 3})).await;
    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();

    let outcome = orchestrator(&mock_server, 1).run_cycle(&mut publisher).await;

    assert_eq!(outcome, CycleOutcome::Completed { published: 1 });
    let log = publisher.log();
    assert_eq!(
        log.lock().unwrap().messages[0].data,
        json!({"status": "ok", "count": 3})
    );
}

#[tokio::test]
async fn test_cycle_merges_extra_metadata() {
    let mock_server = api_returning(json!([{"id": 1}])).await;
    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();

    let mut extra = Map::new();
    extra.insert("region".to_string(), json!("eu"));
    extra.insert("source".to_string(), json!("weather_api"));
    let outcome = orchestrator(&mock_server, 1)
        .with_extra_metadata(extra)
        .run_cycle(&mut publisher)
        .await;

    assert!(outcome.is_success());
    let log = publisher.log();
    let log = log.lock().unwrap();
    assert_eq!(log.messages[0].metadata.get("region"), Some(&json!("eu")));
    assert_eq!(log.messages[0].source(), Some("weather_api"));
}

#[tokio::test]
async fn test_fetch_failure_skips_publish() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();

    let outcome = orchestrator(&mock_server, 2).run_cycle(&mut publisher).await;

    match outcome {
        CycleOutcome::Failed { stage, error } => {
            assert_eq!(stage, CycleStage::Fetch);
            assert!(error.contains("2 attempt(s)"), "error: {error}");
        },
        other => panic!("unexpected outcome: {other:?}"),
    }
    let log = publisher.log();
    assert_eq!(log.lock().unwrap().events, vec![Event::Connect]);
}

#[tokio::test]
async fn test_publish_failure_aborts_rest_of_batch() {
    let mock_server = api_returning(json!([{"id": 1}, {"id": 2}, {"id": 3}])).await;
    let mut publisher = RecordingPublisher::new().failing_at(1);
    publisher.connect().await.unwrap();

    let outcome = orchestrator(&mock_server, 1).run_cycle(&mut publisher).await;

    match outcome {
        CycleOutcome::Failed { stage, error } => {
            assert_eq!(stage, CycleStage::Publish);
            assert!(error.contains("after 1 message(s)"), "error: {error}");
        },
        other => panic!("unexpected outcome: {other:?}"),
    }

    let log = publisher.log();
    let log = log.lock().unwrap();
    assert_eq!(log.messages.len(), 1);
    assert_eq!(log.messages[0].data, json!({"id": 1}));
}

#[tokio::test]
async fn test_empty_array_completes_with_nothing_published() {
    let mock_server = api_returning(json!([])).await;
    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();

    let outcome = orchestrator(&mock_server, 1).run_cycle(&mut publisher).await;

    assert_eq!(outcome, CycleOutcome::Completed { published: 0 });
}

#[tokio::test]
async fn test_each_cycle_starts_clean_after_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 9}])))
        .mount(&mock_server)
        .await;

    let mut publisher = RecordingPublisher::new();
    publisher.connect().await.unwrap();
    let orchestrator = orchestrator(&mock_server, 1);

    let first = orchestrator.run_cycle(&mut publisher).await;
    let second = orchestrator.run_cycle(&mut publisher).await;

    assert!(!first.is_success());
    assert_eq!(second, CycleOutcome::Completed { published: 1 });
}
