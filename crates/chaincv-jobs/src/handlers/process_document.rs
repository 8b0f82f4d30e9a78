//! `process_document`: extract, analyze and record one document.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chaincv_core::{parse_id, DocumentStatus, Error, Result, TaskType};

use crate::handler::{TaskContext, TaskHandler, TaskOutcome, WorkerContext};

/// Message recorded for a document whose failure carried no text.
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed during processing.";

/// What the existing state says about a (re)delivered task.
#[derive(Debug, PartialEq)]
enum Preflight {
    Proceed,
    AlreadyCompleted,
    AlreadyFailed(String),
    UnknownDocument,
}

/// Runs the extraction and analysis pipeline for one document and drives
/// its terminal transition.
///
/// Safe on redelivery: an existing analysis record or a `FAILED` document
/// short-circuits without calling the model again.
pub struct ProcessDocumentHandler {
    ctx: Arc<WorkerContext>,
}

fn output(status: &str, message: &str, document_id: Option<&str>) -> Map<String, JsonValue> {
    let mut output = Map::new();
    output.insert("status".to_string(), json!(status));
    output.insert("message".to_string(), json!(message));
    output.insert(
        "documentId".to_string(),
        document_id.map_or(JsonValue::Null, |id| json!(id)),
    );
    output
}

fn success(message: &str, document_id: &str) -> TaskOutcome {
    TaskOutcome::Success(output("Success", message, Some(document_id)))
}

fn failure(reason: String, document_id: Option<&str>) -> TaskOutcome {
    let output = output("Failure", &reason, document_id);
    TaskOutcome::Failure { reason, output }
}

impl ProcessDocumentHandler {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    async fn preflight(&self, id: Uuid) -> Result<Preflight> {
        if self.ctx.analyses.exists(id).await? {
            if self.ctx.documents.mark_completed(id).await? {
                info!(document_id = %id, "Promoted document with existing analysis to COMPLETED");
            }
            return Ok(Preflight::AlreadyCompleted);
        }
        match self.ctx.documents.get(id).await? {
            None => Ok(Preflight::UnknownDocument),
            Some(doc) if doc.status == DocumentStatus::Failed => Ok(Preflight::AlreadyFailed(
                doc.error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            )),
            Some(_) => Ok(Preflight::Proceed),
        }
    }

    async fn run(&self, id: Uuid, storage_path: Option<&str>) -> Result<()> {
        let Some(path) = storage_path else {
            return Err(Error::InvalidInput(
                "File not found at path: (none)".to_string(),
            ));
        };
        let resolved = self.ctx.resolve_storage_path(path);
        if !tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
            return Err(Error::InvalidInput(format!(
                "File not found at path: {}",
                path
            )));
        }

        let data = tokio::fs::read(&resolved)
            .await
            .map_err(|e| Error::Extraction(format!("Failed to read file at path {}: {}", path, e)))?;

        let text = self.ctx.extractor.extract_text(&data).await?;
        info!(document_id = %id, text_len = text.len(), "Text extraction successful");

        let analysis = self.ctx.analyzer.analyze(&text).await?;

        if !self.ctx.analyses.insert_if_absent(id, &analysis).await? {
            debug!(document_id = %id, "Analysis already recorded by a concurrent delivery");
        }
        if !self.ctx.documents.mark_completed(id).await? {
            debug!(document_id = %id, "Document already terminal, status left unchanged");
        }
        Ok(())
    }

    /// Best effort: a failure to record the failure is logged and swallowed.
    async fn record_failure(&self, id: Uuid, message: &str) {
        match self.ctx.documents.mark_failed(id, message).await {
            Ok(true) => {}
            Ok(false) => debug!(document_id = %id, "Document already terminal, failure not recorded"),
            Err(e) => warn!(document_id = %id, error = %e, "Failed to record document failure"),
        }
    }
}

#[async_trait]
impl TaskHandler for ProcessDocumentHandler {
    fn task_type(&self) -> TaskType {
        TaskType::ProcessDocument
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "process_document", task_id = %ctx.task_id(), document_id = tracing::field::Empty))]
    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        let start = Instant::now();
        let raw_id = ctx.input_str("documentId");
        let storage_path = ctx.input_str("storagePath");

        let Some(id) = raw_id.and_then(parse_id) else {
            let reason = match raw_id {
                Some(raw) => format!("Invalid document id: {}", raw),
                None => "documentId is required".to_string(),
            };
            warn!(error = %reason, "Rejecting task input");
            return failure(reason, raw_id);
        };
        tracing::Span::current().record("document_id", tracing::field::display(id));
        let id_str = id.to_string();

        match self.preflight(id).await {
            Ok(Preflight::Proceed) => {}
            Ok(Preflight::AlreadyCompleted) => {
                info!("Analysis already recorded, skipping");
                return success("Analysis already recorded", &id_str);
            }
            Ok(Preflight::AlreadyFailed(message)) => {
                info!(error = %message, "Document already failed, skipping");
                return failure(message, Some(&id_str));
            }
            Ok(Preflight::UnknownDocument) => {
                warn!("Document not found");
                return failure(format!("Document not found: {}", id), Some(&id_str));
            }
            Err(e) => {
                warn!(error = %e, "Could not read document state, processing anyway");
            }
        }

        match self.run(id, storage_path).await {
            Ok(()) => {
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document processed"
                );
                success("Document processed", &id_str)
            }
            Err(e) => {
                let message = e.failure_message();
                warn!(
                    error = %message,
                    business = e.is_business(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Document processing failed"
                );
                self.record_failure(id, &message).await;
                failure(message, Some(&id_str))
            }
        }
    }
}
