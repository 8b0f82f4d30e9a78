//! Structured logging field name constants for chaincv.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query the same keys across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, business failure, swallowed secondary error |
//! | INFO  | Lifecycle events (startup, shutdown), task completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-step detail of the response cleanup pipeline |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "server", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "worker", "conductor", "gemini", "analyzer"
pub const COMPONENT: &str = "component";

/// Worker identity reported to the queue service.
pub const WORKER_ID: &str = "worker_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Queue task identifier.
pub const TASK_ID: &str = "task_id";

/// Queue task type.
pub const TASK_TYPE: &str = "task_type";

/// Workflow instance identifier.
pub const WORKFLOW_ID: &str = "workflow_id";

/// Storage path of a document file.
pub const STORAGE_PATH: &str = "storage_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Character length of a prompt or extracted text.
pub const TEXT_LEN: &str = "text_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

/// Number of tasks leased in one poll.
pub const LEASED: &str = "leased";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
