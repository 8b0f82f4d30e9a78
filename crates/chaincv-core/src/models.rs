//! Core data models for chaincv.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Lifecycle status of a submitted document.
///
/// Transitions only move forward: `Pending → Processing → Completed|Failed`.
/// `Pending` may also go straight to a terminal state when a workflow is
/// processed before the trigger flips the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            DocumentStatus::Pending => 0,
            DocumentStatus::Processing => 1,
            DocumentStatus::Completed | DocumentStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A submitted document and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub original_name: String,
    pub storage_path: String,
    pub owner: String,
    pub status: DocumentStatus,
    /// Set iff `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Request for creating a new document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub original_name: String,
    pub storage_path: String,
    pub owner: String,
}

// =============================================================================
// ANALYSIS TYPES
// =============================================================================

/// Keys every analysis payload must carry, in schema order.
pub const ANALYSIS_FIELDS: [&str; 4] = ["summary", "strengths", "suggestion", "overallScore"];

/// Structured analysis produced by the generative model.
///
/// `overall_score` keeps the model's numeric representation, so an integer
/// score serializes back as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub summary: String,
    pub strengths: Vec<String>,
    pub suggestion: String,
    pub overall_score: Number,
}

impl AnalysisPayload {
    /// Score as a float.
    pub fn score(&self) -> f64 {
        self.overall_score.as_f64().unwrap_or(f64::NAN)
    }
}

/// Immutable analysis result stored once per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub analysis: AnalysisPayload,
    pub created_at: DateTime<Utc>,
}

/// Answer of the status boundary observed by polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum AnalysisStatus {
    Completed { data: AnalysisPayload },
    Failed { message: String },
    Pending,
}

impl AnalysisStatus {
    /// Whether a polling client can stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

// =============================================================================
// GENERATION TYPES
// =============================================================================

/// Sampling parameters sent with a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl SamplingOptions {
    /// Low-temperature, low-diversity sampling used for structured output.
    pub fn deterministic() -> Self {
        Self {
            temperature: defaults::ANALYSIS_TEMPERATURE,
            top_p: defaults::ANALYSIS_TOP_P,
            top_k: defaults::ANALYSIS_TOP_K,
            max_output_tokens: defaults::ANALYSIS_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::deterministic()
    }
}

// =============================================================================
// TASK QUEUE TYPES
// =============================================================================

/// Task types this worker registers with the queue service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Resolve a document to its storage path
    FetchFilePath,
    /// Extract, analyze and record a document
    ProcessDocument,
}

impl TaskType {
    /// Name of the task definition on the queue service.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::FetchFilePath => defaults::TASK_FETCH_FILE_PATH,
            TaskType::ProcessDocument => defaults::TASK_PROCESS_DOCUMENT,
        }
    }

    /// Parse a task definition name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            defaults::TASK_FETCH_FILE_PATH => Some(TaskType::FetchFilePath),
            defaults::TASK_PROCESS_DOCUMENT => Some(TaskType::ProcessDocument),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leased unit of work as delivered by the queue service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub workflow_instance_id: String,
    #[serde(rename = "taskDefName")]
    pub task_type: String,
    #[serde(default)]
    pub input_data: Map<String, JsonValue>,
    #[serde(default)]
    pub poll_count: u32,
}

/// Task status reported back to the queue service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// Completion report for a leased task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub task_id: String,
    pub workflow_instance_id: String,
    pub worker_id: String,
    pub status: TaskStatus,
    pub output_data: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_for_incompletion: Option<String>,
}
