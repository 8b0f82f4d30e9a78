//! Core traits for chaincv.
//!
//! These are the seams between the job-processing core and its
//! collaborators: the document store, the generative model, the text
//! extractor and the remote task queue.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    AnalysisPayload, AnalysisRecord, CreateDocumentRequest, Document, Result, SamplingOptions,
    Task, TaskUpdate,
};

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for document state.
///
/// Every status mutation is conditional on the current status, so a document
/// never leaves `Completed` or `Failed`. The `mark_*` methods return whether a
/// row actually changed.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Create a document in `Pending` state.
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid>;

    /// Fetch a document by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Most recently created document of an owner.
    async fn find_latest_by_owner(&self, owner: &str) -> Result<Option<Document>>;

    /// `Pending → Processing`.
    async fn mark_processing(&self, id: Uuid) -> Result<bool>;

    /// Non-terminal → `Completed`, stamping `completed_at`.
    async fn mark_completed(&self, id: Uuid) -> Result<bool>;

    /// Non-terminal → `Failed`, stamping `failed_at` and recording `error`.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool>;

    /// Promote every non-terminal document that already has an analysis
    /// record to `Completed`. Returns the number of documents updated.
    async fn reconcile_completed(&self) -> Result<u64>;
}

/// Append-only store of analysis records.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Insert the analysis unless one already exists for the document.
    /// Returns `true` when this call created the record.
    async fn insert_if_absent(&self, document_id: Uuid, payload: &AnalysisPayload)
        -> Result<bool>;

    /// Analysis record of a document, if any.
    async fn get_for_document(&self, document_id: Uuid) -> Result<Option<AnalysisRecord>>;

    /// Whether the document has an analysis record.
    async fn exists(&self, document_id: Uuid) -> Result<bool> {
        Ok(self.get_for_document(document_id).await?.is_some())
    }
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for the prompt with the given sampling.
    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// EXTRACTION TRAITS
// =============================================================================

/// Converts a stored binary document into plain text.
///
/// Implementations return trimmed, non-empty text or `Error::Extraction`.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, data: &[u8]) -> Result<String>;
}

// =============================================================================
// QUEUE TRAITS
// =============================================================================

/// Client of the remote lease-based task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Lease up to `count` tasks of `task_type`.
    async fn poll(&self, task_type: &str, worker_id: &str, count: usize) -> Result<Vec<Task>>;

    /// Report the result of a leased task.
    async fn update(&self, update: TaskUpdate) -> Result<()>;

    /// Start a workflow instance, returning its ID.
    async fn start_workflow(&self, name: &str, version: i32, input: JsonValue) -> Result<String>;
}
