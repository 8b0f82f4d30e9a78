//! Centralized default constants for chaincv.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// SUBMISSION
// =============================================================================

/// Owner recorded when the submitting layer does not supply one.
pub const DEFAULT_OWNER: &str = "default-user@example.com";

/// Directory uploaded documents are stored under.
pub const UPLOAD_DIR: &str = "uploads";

/// Interval polling clients should wait between status checks (milliseconds).
pub const STATUS_POLL_INTERVAL_MS: u64 = 3000;

// =============================================================================
// WORKFLOW
// =============================================================================

/// Workflow started for each triggered document.
pub const WORKFLOW_NAME: &str = "resume_analysis_workflow_v2";

/// Version of the workflow definition to start.
pub const WORKFLOW_VERSION: i32 = 1;

/// Task type that resolves a document to its storage path.
pub const TASK_FETCH_FILE_PATH: &str = "fetch_file_path";

/// Task type that extracts, analyzes and records a document.
pub const TASK_PROCESS_DOCUMENT: &str = "process_document";

/// Default Conductor server URL.
pub const ORKES_SERVER_URL: &str = "http://localhost:8080/api";

/// Timeout for a single queue service request in seconds.
pub const QUEUE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Long-poll wait the queue service may hold a batch poll open (milliseconds).
pub const QUEUE_POLL_WAIT_MS: u64 = 100;

// =============================================================================
// TASK PROCESSING
// =============================================================================

/// Maximum number of tasks executing at once.
pub const TASK_MAX_CONCURRENT: usize = 5;

/// Delay between lease-check cycles that leased nothing (milliseconds).
pub const TASK_POLL_INTERVAL_MS: u64 = 100;

/// Wall-clock budget for one task execution in seconds.
pub const TASK_TIMEOUT_SECS: u64 = 300;

/// Attempts made to report a task result before leaving it to redelivery.
pub const TASK_REPORT_ATTEMPTS: u32 = 3;

/// Base delay of the report backoff (milliseconds), doubled per attempt.
pub const TASK_REPORT_BACKOFF_MS: u64 = 200;

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Timeout for external extraction commands (pdftotext) in seconds.
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// ANALYSIS
// =============================================================================

/// Input text beyond this many characters is truncated before analysis.
pub const ANALYSIS_MAX_INPUT_CHARS: usize = 15_000;

/// Sampling temperature for analysis requests.
pub const ANALYSIS_TEMPERATURE: f32 = 0.1;

/// Nucleus sampling cutoff for analysis requests.
pub const ANALYSIS_TOP_P: f32 = 0.1;

/// Top-k sampling cutoff for analysis requests.
pub const ANALYSIS_TOP_K: u32 = 1;

/// Output token ceiling for analysis requests.
pub const ANALYSIS_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Lowest allowed overall score.
pub const SCORE_MIN: f64 = 0.0;

/// Highest allowed overall score.
pub const SCORE_MAX: f64 = 100.0;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Gemini API base URL.
pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Default Gemini model.
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Ollama generation model.
pub const OLLAMA_GEN_MODEL: &str = "llama3.1:8b";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;
