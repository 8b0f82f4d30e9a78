//! Task worker that leases tasks from the queue and runs their executors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use chaincv_core::{defaults, Error, Result, Task, TaskQueue, TaskUpdate};

use crate::handler::{failed_update, TaskContext, TaskHandler, TaskOutcome, WorkerContext};
use crate::handlers::{FetchFilePathHandler, ProcessDocumentHandler};

/// Configuration for the task worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity reported to the queue service.
    pub worker_id: String,
    /// Delay after a cycle that leased nothing, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of tasks executing at once.
    pub max_concurrent_tasks: usize,
    /// Wall-clock budget per task execution.
    ///
    /// An overrun is reported to the queue as `FAILED` without touching the
    /// document, which stays `PROCESSING`. If the queue gives up retrying,
    /// status polls read `PENDING` from then on. Keep this above the
    /// generation timeout plus the extraction command timeout so a slow
    /// model or `pdftotext` fails the document first.
    pub task_timeout_secs: u64,
    /// Attempts made to deliver one completion report.
    pub report_attempts: u32,
    /// Base delay between report attempts, doubled each retry.
    pub report_backoff_ms: u64,
    /// Whether to process tasks at all.
    pub enabled: bool,
}

fn default_worker_id() -> String {
    format!("chaincv-worker-{}", std::process::id())
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            poll_interval_ms: defaults::TASK_POLL_INTERVAL_MS,
            max_concurrent_tasks: defaults::TASK_MAX_CONCURRENT,
            task_timeout_secs: defaults::TASK_TIMEOUT_SECS,
            report_attempts: defaults::TASK_REPORT_ATTEMPTS,
            report_backoff_ms: defaults::TASK_REPORT_BACKOFF_MS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ID` | `chaincv-worker-<pid>` | Worker identity |
    /// | `TASK_WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `TASK_MAX_CONCURRENT` | `5` | Max concurrent tasks |
    /// | `TASK_POLL_INTERVAL_MS` | `100` | Sleep when nothing was leased |
    /// | `TASK_TIMEOUT_SECS` | `300` | Per-task execution budget |
    pub fn from_env() -> Self {
        let worker_id = std::env::var("WORKER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_worker_id);

        let enabled = std::env::var("TASK_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_tasks = std::env::var("TASK_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::TASK_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("TASK_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::TASK_POLL_INTERVAL_MS);

        let task_timeout_secs = std::env::var("TASK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::TASK_TIMEOUT_SECS);

        Self {
            worker_id,
            poll_interval_ms,
            max_concurrent_tasks,
            task_timeout_secs,
            enabled,
            ..Self::default()
        }
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent tasks.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    pub fn with_task_timeout(mut self, secs: u64) -> Self {
        self.task_timeout_secs = secs;
        self
    }

    pub fn with_report_retry(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.report_attempts = attempts.max(1);
        self.report_backoff_ms = backoff_ms;
        self
    }

    /// Enable or disable task processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the task worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Worker started polling.
    WorkerStarted,
    /// A leased task was dispatched.
    TaskStarted { task_id: String, task_type: String },
    /// An executor produced an outcome and it was reported `COMPLETED`.
    /// `success` is the business outcome.
    TaskCompleted {
        task_id: String,
        task_type: String,
        success: bool,
    },
    /// The task timed out, had no executor, or its report could not be
    /// delivered.
    TaskFailed {
        task_id: String,
        task_type: String,
        error: String,
    },
    /// Worker stopped after draining in-flight tasks.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Stop leasing, wait for in-flight tasks to finish, then return.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited (disabled worker).
        let _ = self.shutdown_tx.send(()).await;
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Worker loop panicked: {}", e)))
    }
}

/// Everything a spawned task needs, cloned per task.
#[derive(Clone)]
struct TaskRunner {
    queue: Arc<dyn TaskQueue>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    config: Arc<WorkerConfig>,
}

impl TaskRunner {
    async fn execute(self, task: Task, _permit: OwnedSemaphorePermit) {
        let start = Instant::now();
        let task_id = task.task_id.clone();
        let task_type = task.task_type.clone();
        let worker_id = self.config.worker_id.as_str();

        debug!(%task_id, %task_type, workflow_id = %task.workflow_instance_id, "Dispatching task");
        let _ = self.event_tx.send(WorkerEvent::TaskStarted {
            task_id: task_id.clone(),
            task_type: task_type.clone(),
        });

        let timeout_secs = self.config.task_timeout_secs;
        let (update, result): (TaskUpdate, std::result::Result<bool, String>) =
            match self.handlers.get(&task_type).cloned() {
                Some(handler) => {
                    let run = handler.execute(TaskContext::new(task.clone()));
                    match tokio::time::timeout(Duration::from_secs(timeout_secs), run).await {
                        Ok(outcome) => {
                            let success = outcome.is_success();
                            if let TaskOutcome::Failure { reason, .. } = &outcome {
                                debug!(%task_id, %reason, "Task finished with business failure");
                            }
                            (outcome.into_update(&task, worker_id), Ok(success))
                        }
                        Err(_) => {
                            let reason = format!("Task exceeded timeout of {}s", timeout_secs);
                            warn!(%task_id, %task_type, "{}", reason);
                            (failed_update(&task, worker_id, reason.clone()), Err(reason))
                        }
                    }
                }
                None => {
                    let reason = format!("No handler for task type: {}", task_type);
                    warn!(%task_id, "{}", reason);
                    (failed_update(&task, worker_id, reason.clone()), Err(reason))
                }
            };

        let event = match (self.report(update).await, result) {
            (Ok(()), Ok(success)) => {
                info!(
                    %task_id,
                    %task_type,
                    success,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Task completed"
                );
                WorkerEvent::TaskCompleted {
                    task_id,
                    task_type,
                    success,
                }
            }
            (Ok(()), Err(error)) => WorkerEvent::TaskFailed {
                task_id,
                task_type,
                error,
            },
            (Err(e), _) => {
                error!(%task_id, %task_type, error = %e, "Giving up on task report, lease will expire");
                WorkerEvent::TaskFailed {
                    task_id,
                    task_type,
                    error: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(event);
    }

    /// Deliver a report, retrying with exponential backoff.
    async fn report(&self, update: TaskUpdate) -> Result<()> {
        let attempts = self.config.report_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.report_backoff_ms);
        let mut attempt = 1;
        loop {
            match self.queue.update(update.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        task_id = %update.task_id,
                        attempt,
                        error = %e,
                        "Task report failed, retrying"
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Task worker that leases tasks from the queue.
pub struct TaskWorker {
    queue: Arc<dyn TaskQueue>,
    config: Arc<WorkerConfig>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl TaskWorker {
    /// Task types this worker leases, in a stable order.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    fn runner(&self) -> TaskRunner {
        TaskRunner {
            queue: self.queue.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            config: self.config.clone(),
        }
    }

    /// Lease as many tasks as there are free permits and spawn them.
    /// Returns how many were leased.
    async fn lease_cycle(
        &self,
        task_types: &[String],
        semaphore: &Arc<Semaphore>,
        in_flight: &mut JoinSet<()>,
    ) -> usize {
        let mut leased = 0;
        for task_type in task_types {
            let free = semaphore.available_permits();
            if free == 0 {
                break;
            }
            let tasks = match self
                .queue
                .poll(task_type, &self.config.worker_id, free)
                .await
            {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(%task_type, error = %e, "Failed to poll queue");
                    continue;
                }
            };
            for task in tasks {
                // This loop is the only acquirer, so a permit is free for
                // every task we asked for; a server over-delivering waits.
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return leased,
                    },
                };
                leased += 1;
                in_flight.spawn(self.runner().execute(task, permit));
            }
        }
        leased
    }

    /// Run the lease loop until shutdown, then drain in-flight tasks.
    ///
    /// Never waits for earlier tasks before leasing more: it only blocks when
    /// every permit is taken, and then only until one task finishes.
    #[instrument(skip_all, fields(subsystem = "jobs", component = "worker", worker_id = %self.config.worker_id))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Task worker is disabled, not starting");
            return;
        }

        let task_types = self.task_types();
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_tasks,
            task_types = ?task_types,
            "Task worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let mut in_flight = JoinSet::new();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Task worker received shutdown signal");
                break;
            }

            // Reap finished tasks without waiting.
            while let Some(Some(result)) = in_flight.join_next().now_or_never() {
                if let Err(e) = result {
                    error!(error = ?e, "Task panicked, lease will expire");
                }
            }

            let leased = self.lease_cycle(&task_types, &semaphore, &mut in_flight).await;

            if leased == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else if semaphore.available_permits() == 0 {
                debug!(in_flight = in_flight.len(), "All permits taken, waiting for a task");
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task worker received shutdown signal");
                        break;
                    }
                    Some(result) = in_flight.join_next() => {
                        if let Err(e) = result {
                            error!(error = ?e, "Task panicked, lease will expire");
                        }
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Draining in-flight tasks");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Task panicked, lease will expire");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Task worker stopped");
    }
}

/// Builder for creating a task worker with handlers.
pub struct WorkerBuilder {
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn TaskHandler>>,
}

impl WorkerBuilder {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler. A later handler for the same task type wins.
    pub fn with_handler<H: TaskHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Register the `fetch_file_path` and `process_document` executors.
    pub fn with_pipeline(self, ctx: Arc<WorkerContext>) -> Self {
        self.with_handler(FetchFilePathHandler::new(ctx.clone()))
            .with_handler(ProcessDocumentHandler::new(ctx))
    }

    /// Build and return the worker.
    pub fn build(self) -> TaskWorker {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let handlers = self
            .handlers
            .into_iter()
            .map(|h| (h.task_type().as_str().to_string(), h))
            .collect::<HashMap<_, _>>();
        TaskWorker {
            queue: self.queue,
            config: Arc::new(self.config),
            handlers: Arc::new(handlers),
            event_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.task_timeout_secs, 300);
        assert_eq!(config.report_attempts, 3);
        assert!(config.enabled);
        assert!(config.worker_id.starts_with("chaincv-worker-"));
    }

    #[test]
    fn test_default_timeout_covers_pipeline_timeouts() {
        assert!(
            WorkerConfig::default().task_timeout_secs
                > defaults::GEN_TIMEOUT_SECS + defaults::EXTRACTION_CMD_TIMEOUT_SECS
        );
    }

    #[test]
    fn test_worker_config_builders() {
        let config = WorkerConfig::default()
            .with_worker_id("w-1")
            .with_poll_interval(10)
            .with_max_concurrent(0)
            .with_task_timeout(1)
            .with_report_retry(0, 5)
            .with_enabled(false);
        assert_eq!(config.worker_id, "w-1");
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.task_timeout_secs, 1);
        assert_eq!(config.report_attempts, 1);
        assert!(!config.enabled);
    }
}
