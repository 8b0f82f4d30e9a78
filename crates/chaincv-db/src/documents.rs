//! Document repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use chaincv_core::{
    new_v7, CreateDocumentRequest, Document, DocumentRepository, DocumentStatus, Error, Result,
};

const DOCUMENT_COLUMNS: &str = "id, original_name, storage_path, owner, status, error, \
                                created_at, completed_at, failed_at";

/// PostgreSQL implementation of DocumentRepository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert DocumentStatus to string for database.
    pub(crate) fn status_to_str(status: DocumentStatus) -> &'static str {
        match status {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Convert string from database to DocumentStatus.
    pub(crate) fn str_to_status(s: &str) -> DocumentStatus {
        match s {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            id: row.get("id"),
            original_name: row.get("original_name"),
            storage_path: row.get("storage_path"),
            owner: row.get("owner"),
            status: Self::str_to_status(row.get("status")),
            error: row.get("error"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
            failed_at: row.get("failed_at"),
        }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO document (id, original_name, storage_path, owner, status, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5)",
        )
        .bind(id)
        .bind(&req.original_name)
        .bind(&req.storage_path)
        .bind(&req.owner)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(document_id = %id, owner = %req.owner, "Inserted document");
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn find_latest_by_owner(&self, owner: &str) -> Result<Option<Document>> {
        // Several documents per owner are normal; the newest one wins.
        let row = sqlx::query(&format!(
            "SELECT {} FROM document WHERE owner = $1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            DOCUMENT_COLUMNS
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document SET status = 'processing'
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document SET status = 'completed', completed_at = $2
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document SET status = 'failed', error = $2, failed_at = $3
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reconcile_completed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE document d SET status = 'completed', completed_at = a.created_at
             FROM analysis a
             WHERE a.document_id = d.id AND d.status IN ('pending', 'processing')",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            let s = PgDocumentRepository::status_to_str(status);
            assert_eq!(PgDocumentRepository::str_to_status(s), status);
        }
    }

    #[test]
    fn test_unknown_status_falls_back_to_pending() {
        assert_eq!(
            PgDocumentRepository::str_to_status("archived"),
            DocumentStatus::Pending
        );
    }
}
