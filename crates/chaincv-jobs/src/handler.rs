//! Task handlers for each task type.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use chaincv_core::{
    AnalysisRepository, DocumentRepository, Task, TaskStatus, TaskType, TaskUpdate, TextExtractor,
};
use chaincv_inference::AnalysisClient;

/// Shared collaborators of every executor, built once at startup.
#[derive(Clone)]
pub struct WorkerContext {
    pub documents: Arc<dyn DocumentRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub analyzer: AnalysisClient,
    pub extractor: Arc<dyn TextExtractor>,
    /// Base directory for relative storage paths. `None` leaves them
    /// relative to the working directory.
    pub upload_dir: Option<PathBuf>,
}

impl WorkerContext {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        analyzer: AnalysisClient,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            documents,
            analyses,
            analyzer,
            extractor,
            upload_dir: None,
        }
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Resolve a stored path to the file the worker should read.
    ///
    /// Absolute paths and paths already under the upload directory are used
    /// as given; other relative paths are joined onto the upload directory.
    pub fn resolve_storage_path(&self, storage_path: &str) -> PathBuf {
        let path = Path::new(storage_path);
        match &self.upload_dir {
            Some(dir) if path.is_relative() && !path.starts_with(dir) => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Context provided to task handlers.
pub struct TaskContext {
    /// The leased task being processed.
    pub task: Task,
}

impl TaskContext {
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    /// String input value, with blank strings treated as absent.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.task
            .input_data
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.task.workflow_instance_id
    }
}

/// Result of task execution.
///
/// Both variants are reported to the queue as `COMPLETED`; the business
/// outcome travels in `outputData`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(Map<String, JsonValue>),
    Failure {
        reason: String,
        output: Map<String, JsonValue>,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn output(&self) -> &Map<String, JsonValue> {
        match self {
            TaskOutcome::Success(output) | TaskOutcome::Failure { output, .. } => output,
        }
    }

    /// Completion report for the queue. Always `COMPLETED`.
    pub fn into_update(self, task: &Task, worker_id: &str) -> TaskUpdate {
        let output_data = match self {
            TaskOutcome::Success(output) | TaskOutcome::Failure { output, .. } => output,
        };
        TaskUpdate {
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            worker_id: worker_id.to_string(),
            status: TaskStatus::Completed,
            output_data,
            reason_for_incompletion: None,
        }
    }
}

/// Queue-level failure report, used when no executor produced an outcome.
pub fn failed_update(task: &Task, worker_id: &str, reason: impl Into<String>) -> TaskUpdate {
    TaskUpdate {
        task_id: task.task_id.clone(),
        workflow_instance_id: task.workflow_instance_id.clone(),
        worker_id: worker_id.to_string(),
        status: TaskStatus::Failed,
        output_data: Map::new(),
        reason_for_incompletion: Some(reason.into()),
    }
}

/// Trait for task handlers.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task type this handler processes.
    fn task_type(&self) -> TaskType;

    /// Execute the task. Business failures are outcomes, not errors.
    async fn execute(&self, ctx: TaskContext) -> TaskOutcome;

    /// Check if this handler can process the given task definition name.
    fn can_handle(&self, task_type: &str) -> bool {
        self.task_type().as_str() == task_type
    }
}
