//! In-memory document state store.
//!
//! Implements both [`DocumentRepository`] and [`AnalysisRepository`] over a
//! single lock, with the same conditional-transition semantics as the
//! PostgreSQL repositories. Used by tests and by local runs without a
//! database (`DATABASE_URL=memory`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use chaincv_core::{
    new_v7, AnalysisPayload, AnalysisRecord, AnalysisRepository, CreateDocumentRequest, Document,
    DocumentRepository, DocumentStatus, Error, Result,
};

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    analyses: HashMap<Uuid, AnalysisRecord>,
}

/// Shared in-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating an unreachable database.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of analysis records stored.
    pub async fn analysis_count(&self) -> usize {
        self.state.read().await.analyses.len()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("store is not accepting writes".to_string()));
        }
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        next: DocumentStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let Some(doc) = state.documents.get_mut(&id) else {
            return Ok(false);
        };
        if !doc.status.can_transition_to(next) {
            return Ok(false);
        }
        let now = Utc::now();
        doc.status = next;
        match next {
            DocumentStatus::Completed => doc.completed_at = Some(now),
            DocumentStatus::Failed => {
                doc.failed_at = Some(now);
                doc.error = Some(error.unwrap_or_default().to_string());
            }
            _ => {}
        }
        Ok(true)
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid> {
        self.check_writable()?;
        let id = new_v7();
        let doc = Document {
            id,
            original_name: req.original_name,
            storage_path: req.storage_path,
            owner: req.owner,
            status: DocumentStatus::Pending,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        };
        self.state.write().await.documents.insert(id, doc);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn find_latest_by_owner(&self, owner: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.owner == owner)
            .max_by_key(|d| (d.created_at, d.id))
            .cloned())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        match state.documents.get_mut(&id) {
            Some(doc) if doc.status == DocumentStatus::Pending => {
                doc.status = DocumentStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_completed(&self, id: Uuid) -> Result<bool> {
        self.transition(id, DocumentStatus::Completed, None).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        self.transition(id, DocumentStatus::Failed, Some(error)).await
    }

    async fn reconcile_completed(&self) -> Result<u64> {
        self.check_writable()?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut updated = 0;
        for (document_id, record) in &state.analyses {
            if let Some(doc) = state.documents.get_mut(document_id) {
                if !doc.status.is_terminal() {
                    doc.status = DocumentStatus::Completed;
                    doc.completed_at = Some(record.created_at);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl AnalysisRepository for MemoryStore {
    async fn insert_if_absent(
        &self,
        document_id: Uuid,
        payload: &AnalysisPayload,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        if state.analyses.contains_key(&document_id) {
            return Ok(false);
        }
        state.analyses.insert(
            document_id,
            AnalysisRecord {
                id: new_v7(),
                document_id,
                analysis: payload.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn get_for_document(&self, document_id: Uuid) -> Result<Option<AnalysisRecord>> {
        Ok(self.state.read().await.analyses.get(&document_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Number;

    fn request(owner: &str) -> CreateDocumentRequest {
        CreateDocumentRequest {
            original_name: "resume.pdf".to_string(),
            storage_path: "/tmp/resume.pdf".to_string(),
            owner: owner.to_string(),
        }
    }

    fn payload() -> AnalysisPayload {
        AnalysisPayload {
            summary: "Seasoned engineer.".to_string(),
            strengths: vec!["Rust".to_string()],
            suggestion: "Quantify impact.".to_string(),
            overall_score: Number::from(80),
        }
    }

    #[tokio::test]
    async fn test_insert_starts_pending() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(doc.error.is_none());
        assert!(doc.completed_at.is_none());
        assert!(doc.failed_at.is_none());
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        assert!(store.mark_processing(id).await.unwrap());
        assert!(store.mark_completed(id).await.unwrap());

        assert!(!store.mark_failed(id, "late failure").await.unwrap());
        assert!(!store.mark_processing(id).await.unwrap());
        assert!(!store.mark_completed(id).await.unwrap());

        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert!(doc.completed_at.is_some());
        assert!(doc.failed_at.is_none());
        assert!(doc.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_is_terminal_and_records_error() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        assert!(store.mark_failed(id, "boom").await.unwrap());
        let first = store.get(id).await.unwrap().unwrap();

        assert!(!store.mark_failed(id, "again").await.unwrap());
        assert!(!store.mark_completed(id).await.unwrap());

        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("boom"));
        assert_eq!(doc.failed_at, first.failed_at);
    }

    #[tokio::test]
    async fn test_mark_processing_only_from_pending() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        assert!(store.mark_processing(id).await.unwrap());
        assert!(!store.mark_processing(id).await.unwrap());
        assert!(!store.mark_processing(Uuid::nil()).await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_by_owner() {
        let store = MemoryStore::new();
        store.insert(request("a@example.com")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newest = store.insert(request("a@example.com")).await.unwrap();
        store.insert(request("b@example.com")).await.unwrap();

        let found = store
            .find_latest_by_owner("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newest);
        assert!(store
            .find_latest_by_owner("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_analysis_inserted_once() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        assert!(store.insert_if_absent(id, &payload()).await.unwrap());
        assert!(!store.insert_if_absent(id, &payload()).await.unwrap());
        assert_eq!(store.analysis_count().await, 1);
        assert!(store.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_create_one_record() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_if_absent(id, &payload()).await.unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.analysis_count().await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_promotes_documents_with_analysis() {
        let store = MemoryStore::new();
        let processing = store.insert(request("a@example.com")).await.unwrap();
        store.mark_processing(processing).await.unwrap();
        store.insert_if_absent(processing, &payload()).await.unwrap();

        let failed = store.insert(request("a@example.com")).await.unwrap();
        store.mark_failed(failed, "boom").await.unwrap();
        store.insert_if_absent(failed, &payload()).await.unwrap();

        assert_eq!(store.reconcile_completed().await.unwrap(), 1);
        let doc = store.get(processing).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        let doc = store.get(failed).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(store.reconcile_completed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        let id = store.insert(request("a@example.com")).await.unwrap();
        store.set_fail_writes(true);
        assert!(store.mark_failed(id, "boom").await.is_err());
        assert!(store.insert(request("a@example.com")).await.is_err());
        // Reads keep working.
        assert!(store.get(id).await.unwrap().is_some());
        store.set_fail_writes(false);
        assert!(store.mark_failed(id, "boom").await.unwrap());
    }
}
