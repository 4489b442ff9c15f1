use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::scripted::{ScriptedSource, Step};
use crate::core::job::{JobRecord, JobStatus, RelayEvent};
use crate::core::relay::{RelayOutcome, RelaySettings, StreamRelay, encode};
use crate::core::store::{JobStore, MemorySubstrate};

async fn run_to_end(
    source: Arc<ScriptedSource>,
    settings: RelaySettings,
) -> (Vec<RelayEvent>, RelayOutcome) {
    let relay = StreamRelay::new(source, settings);
    let (mut rx, handle) = relay.spawn("job-1");
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (events, handle.await.expect("relay task should not panic"))
}

fn frame_names(events: &[RelayEvent]) -> Vec<&'static str> {
    events.iter().map(|e| encode(e).event).collect()
}

#[tokio::test(start_paused = true)]
async fn scripted_job_streams_in_order_and_folds_into_store() {
    let source = Arc::new(ScriptedSource::new(vec![
        Step::Reply(json!({ "status": "IN_QUEUE" })),
        Step::Reply(json!({ "status": "IN_PROGRESS", "stream": [{ "message": "cloning" }] })),
        Step::Reply(json!({ "status": "COMPLETED", "output": [{ "data_chunk": "X" }] })),
    ]));
    let (events, outcome) = run_to_end(source.clone(), RelaySettings::default()).await;

    assert_eq!(outcome, RelayOutcome::Completed);
    assert_eq!(frame_names(&events), vec!["status", "log", "data", "complete"]);
    assert_eq!(encode(&events[0]).data, json!({ "status": "queued", "message": "Job is waiting in queue..." }).to_string());
    assert_eq!(events[1], RelayEvent::Log("cloning".to_string()));
    assert_eq!(events[2], RelayEvent::DataChunk("X".to_string()));
    assert_eq!(source.requests(), 3);

    let store = JobStore::open(Arc::new(MemorySubstrate::new())).await.unwrap();
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    for event in &events {
        store.fold("job-1", event).await.unwrap();
    }
    let record = store.get("job-1").await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.logs, vec!["cloning".to_string()]);
    assert_eq!(record.data_chunks, vec!["X".to_string()]);
    assert!(record.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn completion_is_the_single_final_frame() {
    let source = Arc::new(ScriptedSource::new(vec![
        Step::Reply(json!({ "status": "IN_PROGRESS", "stream": [
            { "status": "analyzing", "progress": 10 },
            { "message": "parsing modules", "data_chunk": "a" }
        ] })),
        Step::Reply(json!({ "status": "IN_PROGRESS" })),
        Step::Reply(json!({ "status": "COMPLETED", "output": [
            { "data_chunk": "b" },
            { "status": "uploading", "message": "writing artifact" }
        ] })),
    ]));
    let (events, outcome) = run_to_end(source, RelaySettings::default()).await;

    assert_eq!(outcome, RelayOutcome::Completed);
    let names = frame_names(&events);
    assert_eq!(names.iter().filter(|n| **n == "complete").count(), 1);
    assert_eq!(names.last(), Some(&"complete"));
    assert!(
        names[..names.len() - 1]
            .iter()
            .all(|n| matches!(*n, "status" | "progress" | "log" | "data"))
    );
    assert_eq!(
        names,
        vec!["progress", "log", "data", "data", "progress", "log", "complete"]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_completion_is_reported_as_error() {
    let source = Arc::new(ScriptedSource::new(vec![
        Step::Reply(json!({ "status": "IN_QUEUE" })),
        Step::Reply(json!({ "status": "COMPLETED", "output": [] })),
    ]));
    let (events, outcome) = run_to_end(source, RelaySettings::default()).await;

    assert_eq!(outcome, RelayOutcome::Failed("No output generated".to_string()));
    let names = frame_names(&events);
    assert_eq!(names.iter().filter(|n| **n == "error").count(), 1);
    assert!(!names.contains(&"complete"));
    match events.last() {
        Some(RelayEvent::Error(failure)) => assert_eq!(failure.reason, "No output generated"),
        other => panic!("expected a terminal error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn poll_cap_stops_at_exactly_max_polls() {
    let source = Arc::new(ScriptedSource::with_fallback(
        Vec::new(),
        json!({ "status": "IN_PROGRESS" }),
    ));
    let started = tokio::time::Instant::now();
    let (events, outcome) = run_to_end(source.clone(), RelaySettings::default()).await;

    assert_eq!(outcome, RelayOutcome::Failed("Polling timeout".to_string()));
    assert_eq!(source.requests(), 600);
    assert_eq!(events.len(), 1);
    match &events[0] {
        RelayEvent::Error(failure) => assert_eq!(failure.reason, "Polling timeout"),
        other => panic!("expected polling timeout, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn queued_forever_still_ends_with_one_timeout() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let settings = RelaySettings {
        poll_interval: Duration::from_millis(500),
        max_polls: 5,
    };
    let (events, _) = run_to_end(source.clone(), settings).await;

    assert_eq!(source.requests(), 5);
    let names = frame_names(&events);
    assert_eq!(names, vec!["status", "status", "status", "status", "status", "error"]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_upstream_ends_with_single_error_and_no_retry() {
    let source = Arc::new(ScriptedSource::new(vec![
        Step::Reply(json!({ "status": "IN_QUEUE" })),
        Step::Unreachable("RunPod API error: 503"),
        Step::Reply(json!({ "status": "COMPLETED", "output": [{ "data_chunk": "late" }] })),
    ]));
    let (events, outcome) = run_to_end(source.clone(), RelaySettings::default()).await;

    assert_eq!(source.requests(), 2);
    assert_eq!(outcome, RelayOutcome::Failed("Failed to fetch job status".to_string()));
    match events.last() {
        Some(RelayEvent::Error(failure)) => assert_eq!(failure.detail, "RunPod API error: 503"),
        other => panic!("expected unreachable error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn missing_job_is_terminal() {
    let source = Arc::new(ScriptedSource::new(vec![Step::NotFound]));
    let (events, outcome) = run_to_end(source.clone(), RelaySettings::default()).await;

    assert_eq!(source.requests(), 1);
    assert_eq!(outcome, RelayOutcome::Failed("Job not found".to_string()));
    assert_eq!(frame_names(&events), vec!["error"]);
}
