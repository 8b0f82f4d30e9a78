//! Submission, trigger and status boundaries.
//!
//! An HTTP layer stores the uploaded file, then calls these in order:
//! [`DocumentService::submit`] to record the document, [`DocumentService::trigger`]
//! to start its workflow, and [`DocumentService::status`] on every client poll.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use chaincv_core::{
    AnalysisRepository, AnalysisStatus, CreateDocumentRequest, DocumentRepository,
    DocumentStatus, Error, Result, TaskQueue,
};
use chaincv_jobs::GENERIC_FAILURE_MESSAGE;

use crate::config::ServerConfig;

/// Service fronting the document store and the workflow queue.
#[derive(Clone)]
pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    queue: Arc<dyn TaskQueue>,
    config: Arc<ServerConfig>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        queue: Arc<dyn TaskQueue>,
        config: ServerConfig,
    ) -> Self {
        Self {
            documents,
            analyses,
            queue,
            config: Arc::new(config),
        }
    }

    /// Record a stored upload as a PENDING document.
    ///
    /// A missing or blank owner falls back to the configured default owner.
    #[instrument(skip(self), fields(subsystem = "server", component = "documents"))]
    pub async fn submit(
        &self,
        storage_path: &str,
        original_name: &str,
        owner: Option<&str>,
    ) -> Result<Uuid> {
        if storage_path.trim().is_empty() {
            return Err(Error::InvalidInput("storage path is required".to_string()));
        }
        if original_name.trim().is_empty() {
            return Err(Error::InvalidInput("original name is required".to_string()));
        }
        let owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(self.config.default_owner.as_str());

        let id = self
            .documents
            .insert(CreateDocumentRequest {
                original_name: original_name.to_string(),
                storage_path: storage_path.to_string(),
                owner: owner.to_string(),
            })
            .await?;
        info!(document_id = %id, owner, "Document submitted");
        Ok(id)
    }

    /// Start the analysis workflow for a document and mark it PROCESSING.
    ///
    /// Triggering a COMPLETED or FAILED document is rejected. The workflow is
    /// started before the status flip, so a store error after a successful
    /// start leaves the document PENDING with its workflow running; the
    /// executors complete it either way.
    #[instrument(skip(self), fields(subsystem = "server", component = "documents"))]
    pub async fn trigger(&self, document_id: Uuid) -> Result<String> {
        let doc = self
            .documents
            .get(document_id)
            .await?
            .ok_or(Error::DocumentNotFound(document_id))?;
        if doc.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "Document {} is already {}",
                document_id, doc.status
            )));
        }

        let workflow_id = self
            .queue
            .start_workflow(
                &self.config.workflow_name,
                self.config.workflow_version,
                json!({"documentId": document_id.to_string(), "owner": doc.owner}),
            )
            .await?;

        if !self.documents.mark_processing(document_id).await? {
            debug!(document_id = %document_id, status = %doc.status, "Document was not PENDING, status left unchanged");
        }
        info!(document_id = %document_id, workflow_id = %workflow_id, "Analysis triggered");
        Ok(workflow_id)
    }

    /// Current analysis state as seen by a polling client.
    ///
    /// An existing analysis record wins over the document status. Unknown
    /// documents read as PENDING.
    pub async fn status(&self, document_id: Uuid) -> Result<AnalysisStatus> {
        if let Some(record) = self.analyses.get_for_document(document_id).await? {
            return Ok(AnalysisStatus::Completed {
                data: record.analysis,
            });
        }
        match self.documents.get(document_id).await? {
            Some(doc) if doc.status == DocumentStatus::Failed => {
                Ok(AnalysisStatus::Failed {
                    message: doc
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
                })
            }
            _ => Ok(AnalysisStatus::Pending),
        }
    }

    /// Promote non-terminal documents that already have an analysis record.
    #[instrument(skip(self), fields(subsystem = "server", component = "documents"))]
    pub async fn reconcile(&self) -> Result<u64> {
        let updated = self.documents.reconcile_completed().await?;
        if updated > 0 {
            info!(updated, "Reconciled documents with recorded analyses");
        }
        Ok(updated)
    }
}
