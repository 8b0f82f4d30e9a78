//! End-to-end tests for the analysis pipeline.
//!
//! Each test wires the real worker, executors and extractors to the
//! in-memory store and queue, with a scripted generation backend standing in
//! for the model.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tempfile::NamedTempFile;
use tokio::time::sleep;
use uuid::Uuid;

use chaincv_core::{
    defaults, AnalysisRepository, CreateDocumentRequest, DocumentRepository, DocumentStatus,
    Result, Task, TaskQueue, TaskStatus, TaskUpdate,
};
use chaincv_db::MemoryStore;
use chaincv_inference::{AnalysisClient, MockGenerationBackend};
use chaincv_jobs::{
    DocumentExtractor, FetchFilePathHandler, MemoryQueue, ProcessDocumentHandler, TaskContext,
    TaskHandler, WorkerBuilder, WorkerConfig, WorkerContext, WorkerEvent, WorkerHandle,
    WorkflowRun, WorkflowStatus,
};

// ============================================================================
// HELPERS
// ============================================================================

const OWNER: &str = "candidate@example.com";

fn context(store: &MemoryStore, backend: &MockGenerationBackend) -> Arc<WorkerContext> {
    Arc::new(WorkerContext::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        AnalysisClient::new(Arc::new(backend.clone())),
        Arc::new(DocumentExtractor::new()),
    ))
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_worker_id("test-worker")
        .with_poll_interval(10)
        .with_report_retry(3, 10)
}

fn start_worker(
    queue: Arc<dyn TaskQueue>,
    ctx: Arc<WorkerContext>,
    config: WorkerConfig,
) -> WorkerHandle {
    WorkerBuilder::new(queue)
        .with_config(config)
        .with_pipeline(ctx)
        .build()
        .start()
}

fn write_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents).expect("write temp file");
    file
}

async fn insert_document(store: &MemoryStore, path: &str) -> Uuid {
    store
        .insert(CreateDocumentRequest {
            original_name: "resume.txt".to_string(),
            storage_path: path.to_string(),
            owner: OWNER.to_string(),
        })
        .await
        .expect("insert document")
}

/// Start the workflow and move the document to PROCESSING, as a trigger does.
async fn trigger(store: &MemoryStore, queue: &MemoryQueue, id: Uuid) -> String {
    let workflow_id = queue
        .start_workflow(
            defaults::WORKFLOW_NAME,
            defaults::WORKFLOW_VERSION,
            json!({"documentId": id.to_string(), "owner": OWNER}),
        )
        .await
        .expect("start workflow");
    assert!(store.mark_processing(id).await.expect("mark processing"));
    workflow_id
}

async fn wait_for_workflow(queue: &MemoryQueue, workflow_id: &str, timeout: Duration) -> WorkflowRun {
    let start = Instant::now();
    loop {
        let run = queue.workflow(workflow_id).expect("workflow exists");
        if run.status != WorkflowStatus::Running {
            return run;
        }
        assert!(
            start.elapsed() < timeout,
            "workflow {} did not finish in {:?}",
            workflow_id,
            timeout
        );
        sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// PIPELINE OUTCOMES
// ============================================================================

#[tokio::test]
async fn test_text_resume_is_analyzed() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let file = write_file(b"Jane Doe\nSenior Rust engineer, 8 years of distributed systems.");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    let run = wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(run.status, WorkflowStatus::Completed);
    let output = run.output.unwrap();
    assert_eq!(output["status"], "Success");
    assert_eq!(output["documentId"], id.to_string());

    let doc = store.get(id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert!(doc.error.is_none());

    let record = store.get_for_document(id).await.unwrap().unwrap();
    assert_eq!(record.analysis.score(), 82.0);
    assert_eq!(record.analysis.strengths.len(), 3);
    assert_eq!(backend.call_count(), 1);
    assert!(backend.calls()[0].prompt.contains("Senior Rust engineer"));
}

#[tokio::test]
async fn test_deleted_file_fails_document() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let file = write_file(b"Jane Doe");
    let path = file.path().to_str().unwrap().to_string();
    let id = insert_document(&store, &path).await;
    drop(file);

    let workflow_id = trigger(&store, &queue, id).await;
    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    let run = wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    // Business failures still complete the workflow.
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(run.output.unwrap()["status"], "Failure");

    let doc = store.get(id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(
        doc.error.as_deref(),
        Some(format!("File not found at path: {}", path).as_str())
    );
    assert_eq!(backend.call_count(), 0);
    assert!(store.get_for_document(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_blank_text_fails_document() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let file = write_file(b"   \n\n\t  ");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let doc = store.get(id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(doc.error.unwrap().contains("empty content"));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_model_reply_fails_document() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new()
        .with_response(r#"{"summary": "s", "strengths": [], "overallScore": 70}"#);
    let file = write_file(b"Jane Doe, data engineer");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let doc = store.get(id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(
        doc.error.as_deref(),
        Some("Missing required fields: suggestion")
    );
}

#[tokio::test]
async fn test_long_text_is_truncated_before_analysis() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let text = "x".repeat(20_000);
    let file = write_file(text.as_bytes());
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let prompt = &backend.calls()[0].prompt;
    assert!(prompt.contains(&"x".repeat(defaults::ANALYSIS_MAX_INPUT_CHARS)));
    assert!(!prompt.contains(&"x".repeat(defaults::ANALYSIS_MAX_INPUT_CHARS + 1)));
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        DocumentStatus::Completed
    );
}

// ============================================================================
// REDELIVERY
// ============================================================================

#[tokio::test]
async fn test_redelivered_task_does_not_reanalyze() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let ctx = context(&store, &backend);
    let file = write_file(b"Jane Doe, platform engineer");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    // First worker resolves the path and analyzes, then loses its lease
    // before reporting.
    let fetch = queue.poll("fetch_file_path", "w-1", 1).await.unwrap().remove(0);
    let outcome = FetchFilePathHandler::new(ctx.clone())
        .execute(TaskContext::new(fetch.clone()))
        .await;
    queue.update(outcome.into_update(&fetch, "w-1")).await.unwrap();

    let process = queue.poll("process_document", "w-1", 1).await.unwrap().remove(0);
    let first = ProcessDocumentHandler::new(ctx.clone())
        .execute(TaskContext::new(process))
        .await;
    assert!(first.is_success());
    assert_eq!(queue.expire_leases(), 1);

    let handle = start_worker(Arc::new(queue.clone()), ctx, fast_config());
    let run = wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let output = run.output.unwrap();
    assert_eq!(output["status"], "Success");
    assert_eq!(output["message"], "Analysis already recorded");
    assert_eq!(backend.call_count(), 1);
    assert_eq!(store.analysis_count().await, 1);
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        DocumentStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_record_one_analysis() {
    let store = MemoryStore::new();
    let backend = MockGenerationBackend::new().with_latency(Duration::from_millis(50));
    let file = write_file(b"Jane Doe, data engineer with eight years of Rust");
    let path = file.path().to_str().unwrap().to_string();
    let id = insert_document(&store, &path).await;
    assert!(store.mark_processing(id).await.unwrap());
    let handler = Arc::new(ProcessDocumentHandler::new(context(&store, &backend)));

    let deliveries: Vec<_> = (0..8)
        .map(|n| {
            let handler = handler.clone();
            let task = Task {
                task_id: format!("process-{}", n),
                workflow_instance_id: "wf-concurrent".to_string(),
                task_type: "process_document".to_string(),
                input_data: json!({"documentId": id.to_string(), "storagePath": path})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                poll_count: n,
            };
            tokio::spawn(async move { handler.execute(TaskContext::new(task)).await })
        })
        .collect();

    for delivery in deliveries {
        let outcome = delivery.await.unwrap();
        assert!(outcome.is_success(), "outcome: {:?}", outcome);
    }
    assert_eq!(store.analysis_count().await, 1);
    assert!(backend.call_count() >= 1);
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        DocumentStatus::Completed
    );
}

// ============================================================================
// WORKER BEHAVIOR
// ============================================================================

#[tokio::test]
async fn test_many_documents_run_concurrently() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new().with_latency(Duration::from_millis(300));
    let file = write_file(b"Jane Doe, SRE");
    let path = file.path().to_str().unwrap().to_string();

    let mut workflows = Vec::new();
    for _ in 0..4 {
        let id = insert_document(&store, &path).await;
        workflows.push(trigger(&store, &queue, id).await);
    }

    let start = Instant::now();
    let handle = start_worker(
        Arc::new(queue.clone()),
        context(&store, &backend),
        fast_config().with_max_concurrent(4),
    );
    for workflow_id in &workflows {
        let run = wait_for_workflow(&queue, workflow_id, Duration::from_secs(5)).await;
        assert_eq!(run.output.unwrap()["status"], "Success");
    }
    let elapsed = start.elapsed();
    handle.shutdown().await.unwrap();

    // Serial execution would take at least 4 x 300ms.
    assert!(elapsed < Duration::from_millis(1100), "took {:?}", elapsed);
    assert_eq!(store.analysis_count().await, 4);
}

#[tokio::test]
async fn test_events_report_business_outcome() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new();
    let id = insert_document(&store, "/nonexistent/chaincv/resume.pdf").await;
    let workflow_id = trigger(&store, &queue, id).await;

    let worker = WorkerBuilder::new(Arc::new(queue.clone()))
        .with_config(fast_config())
        .with_pipeline(context(&store, &backend))
        .build();
    let mut events = worker.events();
    let handle = worker.start();
    wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.first(), Some(&WorkerEvent::WorkerStarted));
    assert_eq!(seen.last(), Some(&WorkerEvent::WorkerStopped));
    assert!(seen.iter().any(|e| matches!(
        e,
        WorkerEvent::TaskCompleted { task_type, success: true, .. } if task_type == "fetch_file_path"
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        WorkerEvent::TaskCompleted { task_type, success: false, .. } if task_type == "process_document"
    )));
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_tasks() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new().with_latency(Duration::from_millis(300));
    let file = write_file(b"Jane Doe, backend engineer");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(Arc::new(queue.clone()), context(&store, &backend), fast_config());
    let mut events = handle.events();
    loop {
        match events.recv().await.unwrap() {
            WorkerEvent::TaskStarted { task_type, .. } if task_type == "process_document" => break,
            _ => {}
        }
    }
    handle.shutdown().await.unwrap();

    let run = queue.workflow(&workflow_id).unwrap();
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn test_timed_out_task_is_reported_failed() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let backend = MockGenerationBackend::new().with_latency(Duration::from_secs(3));
    let file = write_file(b"Jane Doe");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &queue, id).await;

    let handle = start_worker(
        Arc::new(queue.clone()),
        context(&store, &backend),
        fast_config().with_task_timeout(1),
    );
    let run = wait_for_workflow(&queue, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(run.status, WorkflowStatus::Failed);
    assert_eq!(run.reason.as_deref(), Some("Task exceeded timeout of 1s"));
    // The queue owns the retry; the document is left for the next delivery.
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        DocumentStatus::Processing
    );
}

#[tokio::test]
async fn test_disabled_worker_leases_nothing() {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let id = insert_document(&store, "/tmp/x.pdf").await;
    trigger(&store, &queue, id).await;

    let handle = start_worker(
        Arc::new(queue.clone()),
        context(&store, &MockGenerationBackend::new()),
        fast_config().with_enabled(false),
    );
    sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();
    assert_eq!(queue.pending_count(), 1);
    assert_eq!(queue.leased_count(), 0);
}

// ============================================================================
// QUEUE EDGE CASES
// ============================================================================

/// Queue that hands out one task of an unregistered type, then nothing.
#[derive(Default)]
struct StrayTaskQueue {
    delivered: Mutex<bool>,
    updates: Mutex<Vec<TaskUpdate>>,
}

#[async_trait]
impl TaskQueue for StrayTaskQueue {
    async fn poll(&self, _task_type: &str, _worker_id: &str, _count: usize) -> Result<Vec<Task>> {
        let mut delivered = self.delivered.lock().unwrap();
        if *delivered {
            return Ok(Vec::new());
        }
        *delivered = true;
        Ok(vec![Task {
            task_id: "stray-1".to_string(),
            workflow_instance_id: "wf-stray".to_string(),
            task_type: "render_thumbnail".to_string(),
            input_data: serde_json::Map::new(),
            poll_count: 1,
        }])
    }

    async fn update(&self, update: TaskUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }

    async fn start_workflow(&self, _name: &str, _version: i32, _input: JsonValue) -> Result<String> {
        Ok("wf-stray".to_string())
    }
}

#[tokio::test]
async fn test_unknown_task_type_is_reported_failed() {
    let store = MemoryStore::new();
    let queue = Arc::new(StrayTaskQueue::default());

    let handle = start_worker(
        queue.clone(),
        context(&store, &MockGenerationBackend::new()),
        fast_config(),
    );
    let start = Instant::now();
    while queue.updates.lock().unwrap().is_empty() {
        assert!(start.elapsed() < Duration::from_secs(5));
        sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await.unwrap();

    let updates = queue.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].task_id, "stray-1");
    assert_eq!(updates[0].status, TaskStatus::Failed);
    assert_eq!(
        updates[0].reason_for_incompletion.as_deref(),
        Some("No handler for task type: render_thumbnail")
    );
}

/// Queue whose first `failures` updates are rejected.
struct FlakyReportQueue {
    inner: MemoryQueue,
    failures: Mutex<u32>,
}

#[async_trait]
impl TaskQueue for FlakyReportQueue {
    async fn poll(&self, task_type: &str, worker_id: &str, count: usize) -> Result<Vec<Task>> {
        self.inner.poll(task_type, worker_id, count).await
    }

    async fn update(&self, update: TaskUpdate) -> Result<()> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(chaincv_core::Error::Queue("connection reset".to_string()));
            }
        }
        self.inner.update(update).await
    }

    async fn start_workflow(&self, name: &str, version: i32, input: JsonValue) -> Result<String> {
        self.inner.start_workflow(name, version, input).await
    }
}

#[tokio::test]
async fn test_report_is_retried() {
    let store = MemoryStore::new();
    let inner = MemoryQueue::new();
    let file = write_file(b"Jane Doe, analyst");
    let id = insert_document(&store, file.path().to_str().unwrap()).await;
    let workflow_id = trigger(&store, &inner, id).await;

    let queue = Arc::new(FlakyReportQueue {
        inner: inner.clone(),
        failures: Mutex::new(2),
    });
    let handle = start_worker(
        queue,
        context(&store, &MockGenerationBackend::new()),
        fast_config(),
    );
    let run = wait_for_workflow(&inner, &workflow_id, Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(run.output.unwrap()["status"], "Success");
}
