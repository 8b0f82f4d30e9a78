//! # chaincv-db
//!
//! Document state store for chaincv.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for documents and analysis records
//! - An in-memory store with identical transition semantics
//!
//! ## Example
//!
//! ```rust,ignore
//! use chaincv_db::{CreateDocumentRequest, Database, DocumentRepository};
//!
//! let db = Database::connect("postgres://localhost/chaincv").await?;
//! let id = db.documents.insert(CreateDocumentRequest {
//!     original_name: "resume.pdf".to_string(),
//!     storage_path: "uploads/1700000000-resume.pdf".to_string(),
//!     owner: "user@example.com".to_string(),
//! }).await?;
//! ```

pub mod analyses;
pub mod documents;
pub mod memory;
pub mod pool;

// Re-export core types
pub use chaincv_core::*;

pub use analyses::PgAnalysisRepository;
pub use documents::PgDocumentRepository;
pub use memory::MemoryStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document repository.
    pub documents: PgDocumentRepository,
    /// Analysis record repository.
    pub analyses: PgAnalysisRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            analyses: PgAnalysisRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
