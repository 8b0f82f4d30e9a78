//! Analysis record repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use chaincv_core::{new_v7, AnalysisPayload, AnalysisRecord, AnalysisRepository, Error, Result};

/// PostgreSQL implementation of AnalysisRepository.
///
/// The `UNIQUE (document_id)` constraint makes concurrent redeliveries of the
/// same document race safely: exactly one insert wins.
#[derive(Clone)]
pub struct PgAnalysisRepository {
    pool: Pool<Postgres>,
}

impl PgAnalysisRepository {
    /// Create a new PgAnalysisRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisRepository for PgAnalysisRepository {
    async fn insert_if_absent(
        &self,
        document_id: Uuid,
        payload: &AnalysisPayload,
    ) -> Result<bool> {
        let data = serde_json::to_value(payload)?;
        let result = sqlx::query(
            "INSERT INTO analysis (id, document_id, analysis_data, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (document_id) DO NOTHING",
        )
        .bind(new_v7())
        .bind(document_id)
        .bind(&data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let created = result.rows_affected() > 0;
        debug!(document_id = %document_id, created, "Stored analysis record");
        Ok(created)
    }

    async fn get_for_document(&self, document_id: Uuid) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query(
            "SELECT id, document_id, analysis_data, created_at
             FROM analysis WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|row| -> Result<AnalysisRecord> {
            let data: JsonValue = row.get("analysis_data");
            Ok(AnalysisRecord {
                id: row.get("id"),
                document_id: row.get("document_id"),
                analysis: serde_json::from_value(data)?,
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }

    async fn exists(&self, document_id: Uuid) -> Result<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM analysis WHERE document_id = $1)")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(found)
    }
}
