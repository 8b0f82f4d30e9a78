//! `fetch_file_path`: resolve a document to its storage path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, instrument, warn};

use chaincv_core::{parse_id, Document, Error, Result, TaskType};

use crate::handler::{TaskContext, TaskHandler, TaskOutcome, WorkerContext};

/// Looks a document up by `documentId`, or else by `owner`.
///
/// The owner lookup returns the owner's most recent document. With several
/// documents in flight for one owner this may pick a different one than the
/// caller meant; callers should always pass `documentId`.
pub struct FetchFilePathHandler {
    ctx: Arc<WorkerContext>,
}

impl FetchFilePathHandler {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    async fn lookup(&self, document_id: Option<&str>, owner: Option<&str>) -> Result<Document> {
        let found = match (document_id, owner) {
            (Some(raw), _) => {
                let id = parse_id(raw)
                    .ok_or_else(|| Error::InvalidInput(format!("Invalid document id: {}", raw)))?;
                self.ctx.documents.get(id).await?
            }
            (None, Some(owner)) => self.ctx.documents.find_latest_by_owner(owner).await?,
            (None, None) => {
                return Err(Error::InvalidInput(
                    "documentId or owner is required".to_string(),
                ))
            }
        };

        match found {
            Some(doc) if !doc.storage_path.trim().is_empty() => Ok(doc),
            _ => Err(Error::NotFound(
                "Document not found or storage path missing".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TaskHandler for FetchFilePathHandler {
    fn task_type(&self) -> TaskType {
        TaskType::FetchFilePath
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "fetch_file_path", task_id = %ctx.task_id()))]
    async fn execute(&self, ctx: TaskContext) -> TaskOutcome {
        let document_id = ctx.input_str("documentId");
        let owner = ctx.input_str("owner");

        match self.lookup(document_id, owner).await {
            Ok(doc) => {
                info!(document_id = %doc.id, storage_path = %doc.storage_path, "Resolved storage path");
                let mut output = Map::new();
                output.insert("storagePath".to_string(), json!(doc.storage_path));
                output.insert("documentId".to_string(), json!(doc.id.to_string()));
                TaskOutcome::Success(output)
            }
            Err(e) => {
                let reason = e.failure_message();
                warn!(document_id, owner, error = %reason, "Storage path lookup failed");
                let mut output = Map::new();
                output.insert("storagePath".to_string(), JsonValue::Null);
                output.insert(
                    "documentId".to_string(),
                    document_id.map_or(JsonValue::Null, |id| json!(id)),
                );
                output.insert("error".to_string(), json!(reason));
                TaskOutcome::Failure { reason, output }
            }
        }
    }
}
