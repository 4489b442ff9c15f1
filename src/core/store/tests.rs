use std::sync::Arc;

use super::*;
use crate::core::job::{Failure, JobStatus, StatusOrigin, StatusUpdate};

fn status(state: &str, progress: f64) -> RelayEvent {
    RelayEvent::Status(StatusUpdate {
        origin: StatusOrigin::Item,
        state: state.to_string(),
        progress: Some(progress),
        message: None,
    })
}

fn failure(reason: &str) -> RelayEvent {
    RelayEvent::Error(Failure {
        reason: reason.to_string(),
        detail: reason.to_string(),
    })
}

async fn memory_store() -> JobStore {
    JobStore::open(Arc::new(MemorySubstrate::new())).await.unwrap()
}

#[tokio::test]
async fn create_is_idempotent_per_repository() {
    let store = memory_store().await;
    let first = store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    let second = store
        .create(JobRecord::new("job-2", "octo", "hello", "dev"))
        .await
        .unwrap();

    assert!(matches!(first, CreateOutcome::Created(_)));
    assert!(matches!(second, CreateOutcome::Existing(_)));
    assert_eq!(second.record().id, "job-1");
    assert_eq!(store.list().await.len(), 1);
    assert!(store.get("job-2").await.is_none());
    assert!(store.has_repo("octo", "hello").await);
    assert!(!store.has_repo("octo", "world").await);
}

#[tokio::test]
async fn create_refuses_a_reused_job_id() {
    let store = memory_store().await;
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    let second = store
        .create(JobRecord::new("job-1", "octo", "world", "main"))
        .await
        .unwrap();

    assert!(matches!(&second, CreateOutcome::Existing(r) if r.repo_name == "hello"));
    assert_eq!(store.list().await.len(), 1);
    assert!(!store.has_repo("octo", "world").await);

    store.fold("job-1", &RelayEvent::Complete).await.unwrap();
    let records = store.list().await;
    assert!(records.iter().all(|r| r.status == JobStatus::Completed));
}

#[tokio::test]
async fn terminal_records_ignore_later_folds() {
    let store = memory_store().await;
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store.fold("job-1", &RelayEvent::Log("one".into())).await.unwrap();
    store.fold("job-1", &RelayEvent::Complete).await.unwrap();
    let settled = store.get("job-1").await.unwrap();

    for event in [
        RelayEvent::Log("late".into()),
        RelayEvent::DataChunk("late".into()),
        status("processing", 20.0),
        failure("Polling timeout"),
        RelayEvent::Complete,
    ] {
        assert_eq!(store.fold("job-1", &event).await.unwrap(), FoldOutcome::Ignored);
    }
    assert_eq!(store.get("job-1").await.unwrap(), settled);
}

#[tokio::test]
async fn failed_record_keeps_first_error() {
    let store = memory_store().await;
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store.fold("job-1", &failure("Job not found")).await.unwrap();
    store.fold("job-1", &failure("Polling timeout")).await.unwrap();

    let record = store.get("job-1").await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("Job not found"));
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn folding_into_unknown_job_is_reported() {
    let store = memory_store().await;
    assert_eq!(
        store.fold("nope", &RelayEvent::Complete).await.unwrap(),
        FoldOutcome::Missing
    );
}

#[tokio::test]
async fn reload_reproduces_identical_mapping() {
    let substrate: Arc<dyn RecordSubstrate> = Arc::new(MemorySubstrate::new());
    let store = JobStore::open(substrate.clone()).await.unwrap();
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store
        .create(JobRecord::new("job-2", "octo", "world", "main"))
        .await
        .unwrap();
    for event in [
        status("analyzing", 42.5),
        RelayEvent::Log("b".into()),
        RelayEvent::Log("a".into()),
        RelayEvent::DataChunk("{\"k\":1}".into()),
        RelayEvent::Complete,
    ] {
        store.fold("job-1", &event).await.unwrap();
    }
    store
        .attach_result(
            "job-1",
            ResultLocator {
                s3_key: Some("docpacks/octo/hello.jsonl".into()),
                docpack_url: None,
            },
        )
        .await
        .unwrap();
    store.fold("job-2", &failure("No output generated")).await.unwrap();

    let reloaded = JobStore::open(substrate).await.unwrap();
    assert_eq!(reloaded.list().await, store.list().await);
    let record = reloaded.get("job-1").await.unwrap();
    assert_eq!(record.logs, vec!["b".to_string(), "a".to_string()]);
    assert_eq!(record.s3_key.as_deref(), Some("docpacks/octo/hello.jsonl"));
}

#[tokio::test]
async fn stored_value_uses_camel_case_envelope() {
    let substrate = Arc::new(MemorySubstrate::new());
    let store = JobStore::open(substrate.clone()).await.unwrap();
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store.fold("job-1", &RelayEvent::DataChunk("X".into())).await.unwrap();

    let raw = substrate.read(STORE_KEY).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let record = &value["docpacks"][0];
    assert_eq!(record["repoOwner"], "octo");
    assert_eq!(record["repoName"], "hello");
    assert_eq!(record["status"], "queued");
    assert_eq!(record["jsonlData"][0], "X");
    assert!(record.get("createdAt").is_some());
}

#[tokio::test]
async fn corrupt_state_recovers_as_empty_store() {
    let substrate = Arc::new(MemorySubstrate::seeded(STORE_KEY, "{\"docpacks\": [oops"));
    let store = JobStore::open(substrate.clone()).await.unwrap();
    assert!(store.list().await.is_empty());

    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    let raw = substrate.read(STORE_KEY).await.unwrap().unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
}

#[tokio::test]
async fn attach_result_requires_completion() {
    let store = memory_store().await;
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    let locator = ResultLocator {
        s3_key: None,
        docpack_url: Some("https://example.invalid/hello.docpack".into()),
    };

    assert!(store.attach_result("job-1", locator.clone()).await.unwrap().is_none());
    store.fold("job-1", &RelayEvent::Complete).await.unwrap();
    let record = store.attach_result("job-1", locator).await.unwrap().unwrap();
    assert_eq!(
        record.docpack_url.as_deref(),
        Some("https://example.invalid/hello.docpack")
    );
}

#[tokio::test]
async fn remove_and_clear_notify_subscribers() {
    let store = memory_store().await;
    let mut changes = store.subscribe();
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store
        .create(JobRecord::new("job-2", "octo", "world", "main"))
        .await
        .unwrap();
    assert!(store.remove("job-1").await.unwrap());
    assert!(!store.remove("job-1").await.unwrap());
    store.clear().await.unwrap();

    assert!(matches!(changes.recv().await.unwrap(), StoreChange::Created(r) if r.id == "job-1"));
    assert!(matches!(changes.recv().await.unwrap(), StoreChange::Created(r) if r.id == "job-2"));
    assert_eq!(changes.recv().await.unwrap(), StoreChange::Removed("job-1".into()));
    assert_eq!(changes.recv().await.unwrap(), StoreChange::Cleared);
    assert!(store.list().await.is_empty());
}

#[tokio::test]
async fn ignored_folds_do_not_notify() {
    let store = memory_store().await;
    store
        .create(JobRecord::new("job-1", "octo", "hello", "main"))
        .await
        .unwrap();
    store.fold("job-1", &RelayEvent::Complete).await.unwrap();
    let mut changes = store.subscribe();
    store.fold("job-1", &RelayEvent::Log("late".into())).await.unwrap();

    assert!(matches!(
        changes.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_folds_keep_every_line() {
    let store = Arc::new(memory_store().await);
    for job in ["a", "b", "c", "d"] {
        store
            .create(JobRecord::new(job, "octo", job, "main"))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for job in ["a", "b", "c", "d"] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                store
                    .fold(job, &RelayEvent::Log(format!("{} {}", job, i)))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for job in ["a", "b", "c", "d"] {
        let record = store.get(job).await.unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("{} {}", job, i)).collect();
        assert_eq!(record.logs, expected);
    }
}

#[tokio::test]
async fn file_backed_store_survives_restart() {
    let tmpdir = tempfile::tempdir().unwrap();
    {
        let store = JobStore::open(Arc::new(FileSubstrate::new(tmpdir.path())))
            .await
            .unwrap();
        store
            .create(JobRecord::new("job-1", "octo", "hello", "main"))
            .await
            .unwrap();
        store.fold("job-1", &RelayEvent::Log("cloning".into())).await.unwrap();
    }

    let store = JobStore::open(Arc::new(FileSubstrate::new(tmpdir.path())))
        .await
        .unwrap();
    let record = store.get_by_repo("octo", "hello").await.unwrap();
    assert_eq!(record.id, "job-1");
    assert_eq!(record.logs, vec!["cloning".to_string()]);
    assert!(tmpdir.path().join("docpacks.json").exists());
}
