//! In-process queue running the two-step analysis workflow.
//!
//! Starting a workflow schedules `fetch_file_path`; its completion schedules
//! `process_document` with the fetched output as input; completion of that
//! ends the workflow. Leases are explicit so tests can simulate a lease
//! expiring with [`MemoryQueue::expire_leases`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use chaincv_core::{
    defaults, new_v7, Error, Result, Task, TaskQueue, TaskStatus, TaskType, TaskUpdate,
};

/// Lifecycle of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// A workflow instance as tracked by the memory queue.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub id: String,
    pub name: String,
    pub version: i32,
    pub input: JsonValue,
    pub status: WorkflowStatus,
    pub output: Option<Map<String, JsonValue>>,
    pub reason: Option<String>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    leased: HashMap<String, Task>,
    attempts: HashMap<String, u32>,
    workflows: HashMap<String, WorkflowRun>,
    updates: Vec<TaskUpdate>,
}

/// In-memory [`TaskQueue`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<QueueState>>,
    retries: u32,
}

fn object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-queue a task reported `FAILED` up to `retries` times before
    /// failing its workflow.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn schedule(
        state: &mut QueueState,
        workflow_id: &str,
        task_type: &str,
        input: Map<String, JsonValue>,
    ) {
        let task = Task {
            task_id: new_v7().to_string(),
            workflow_instance_id: workflow_id.to_string(),
            task_type: task_type.to_string(),
            input_data: input,
            poll_count: 0,
        };
        debug!(task_id = %task.task_id, task_type, "Scheduled task");
        state.pending.push_back(task);
    }

    /// Add an arbitrary task, bypassing workflow scheduling.
    pub fn enqueue(&self, task: Task) {
        self.lock().pending.push_back(task);
    }

    /// Put every leased task back on the queue, as if its lease expired.
    pub fn expire_leases(&self) -> usize {
        let mut state = self.lock();
        let expired: Vec<Task> = state.leased.drain().map(|(_, t)| t).collect();
        let count = expired.len();
        state.pending.extend(expired);
        count
    }

    pub fn workflow(&self, id: &str) -> Option<WorkflowRun> {
        self.lock().workflows.get(id).cloned()
    }

    /// All completion reports received, in order.
    pub fn updates(&self) -> Vec<TaskUpdate> {
        self.lock().updates.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn leased_count(&self) -> usize {
        self.lock().leased.len()
    }

    /// Whether every known workflow has ended.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty()
            && state.leased.is_empty()
            && state
                .workflows
                .values()
                .all(|w| w.status != WorkflowStatus::Running)
    }

    fn finish(
        state: &mut QueueState,
        workflow_id: &str,
        status: WorkflowStatus,
        output: Option<Map<String, JsonValue>>,
        reason: Option<String>,
    ) {
        if let Some(run) = state.workflows.get_mut(workflow_id) {
            run.status = status;
            run.output = output;
            run.reason = reason;
        }
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn poll(&self, task_type: &str, _worker_id: &str, count: usize) -> Result<Vec<Task>> {
        let mut state = self.lock();
        let mut leased = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.pending.len());
        while let Some(mut task) = state.pending.pop_front() {
            if leased.len() < count && task.task_type == task_type {
                task.poll_count += 1;
                state.leased.insert(task.task_id.clone(), task.clone());
                leased.push(task);
            } else {
                remaining.push_back(task);
            }
        }
        state.pending = remaining;
        Ok(leased)
    }

    async fn update(&self, update: TaskUpdate) -> Result<()> {
        let mut state = self.lock();
        let task = state
            .leased
            .remove(&update.task_id)
            .ok_or_else(|| Error::Queue(format!("Task {} is not leased", update.task_id)))?;
        state.updates.push(update.clone());
        let workflow_id = task.workflow_instance_id.clone();

        match update.status {
            TaskStatus::Completed => match TaskType::parse(&task.task_type) {
                Some(TaskType::FetchFilePath) => {
                    let out = &update.output_data;
                    let input = object(json!({
                        "storagePath": out.get("storagePath").cloned().unwrap_or(JsonValue::Null),
                        "documentId": out.get("documentId").cloned().unwrap_or(JsonValue::Null),
                    }));
                    Self::schedule(
                        &mut state,
                        &workflow_id,
                        defaults::TASK_PROCESS_DOCUMENT,
                        input,
                    );
                }
                _ => Self::finish(
                    &mut state,
                    &workflow_id,
                    WorkflowStatus::Completed,
                    Some(update.output_data),
                    None,
                ),
            },
            TaskStatus::Failed => {
                let attempts = state.attempts.entry(task.task_id.clone()).or_insert(0);
                *attempts += 1;
                if *attempts <= self.retries {
                    state.pending.push_back(task);
                } else {
                    Self::finish(
                        &mut state,
                        &workflow_id,
                        WorkflowStatus::Failed,
                        None,
                        update.reason_for_incompletion,
                    );
                }
            }
        }
        Ok(())
    }

    async fn start_workflow(&self, name: &str, version: i32, input: JsonValue) -> Result<String> {
        let id = new_v7().to_string();
        let mut state = self.lock();
        state.workflows.insert(
            id.clone(),
            WorkflowRun {
                id: id.clone(),
                name: name.to_string(),
                version,
                input: input.clone(),
                status: WorkflowStatus::Running,
                output: None,
                reason: None,
            },
        );
        Self::schedule(&mut state, &id, defaults::TASK_FETCH_FILE_PATH, object(input));
        Ok(id)
    }
}
