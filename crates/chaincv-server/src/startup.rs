//! Wiring of stores, queue and worker from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use chaincv_core::{AnalysisRepository, DocumentRepository, Result, TaskQueue, TextExtractor};
use chaincv_db::{Database, MemoryStore, PoolConfig};
use chaincv_inference::{backend_from_env, AnalysisClient};
use chaincv_jobs::{
    ConductorClient, DocumentExtractor, MemoryQueue, WorkerBuilder, WorkerConfig, WorkerContext,
    WorkerHandle,
};

use crate::config::{QueueBackend, ServerConfig};
use crate::services::DocumentService;

/// Document and analysis repositories behind their traits.
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn DocumentRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = MemoryStore::new();
        Self {
            documents: Arc::new(store.clone()),
            analyses: Arc::new(store),
        }
    }
}

/// Connect to PostgreSQL and apply migrations, or fall back to memory.
pub async fn open_stores(config: &ServerConfig) -> Result<Stores> {
    let Some(url) = config.database_url.as_deref() else {
        warn!(subsystem = "server", "DATABASE_URL not set, using in-memory store");
        return Ok(Stores::memory());
    };
    let db = Database::connect_with_config(url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!(subsystem = "server", "Database connected and migrated");
    Ok(Stores {
        documents: Arc::new(db.documents.clone()),
        analyses: Arc::new(db.analyses.clone()),
    })
}

/// Build the configured task queue client.
pub fn open_queue(config: &ServerConfig) -> Result<Arc<dyn TaskQueue>> {
    match config.queue {
        QueueBackend::Conductor => Ok(Arc::new(ConductorClient::from_env()?)),
        QueueBackend::Memory => {
            warn!(subsystem = "server", "Using in-process task queue");
            Ok(Arc::new(MemoryQueue::new()))
        }
    }
}

/// Executor collaborators, with relative storage paths read from the upload directory.
pub fn worker_context(
    config: &ServerConfig,
    stores: &Stores,
    analyzer: AnalysisClient,
    extractor: Arc<dyn TextExtractor>,
) -> WorkerContext {
    WorkerContext::new(
        stores.documents.clone(),
        stores.analyses.clone(),
        analyzer,
        extractor,
    )
    .with_upload_dir(&config.upload_dir)
}

/// Everything the process runs, built once at startup.
pub struct App {
    pub config: ServerConfig,
    pub stores: Stores,
    pub queue: Arc<dyn TaskQueue>,
    pub worker_context: Arc<WorkerContext>,
}

impl App {
    /// Build the application from the environment.
    pub async fn from_env() -> Result<Self> {
        let config = ServerConfig::from_env();
        let stores = open_stores(&config).await?;
        let queue = open_queue(&config)?;
        let analyzer = AnalysisClient::new(backend_from_env()?);

        let extractor = DocumentExtractor::new();
        if !extractor.health_check().await {
            warn!(subsystem = "server", "pdftotext unavailable, PDF documents will fail extraction");
        }
        info!(subsystem = "server", model = analyzer.model_name(), "Analysis client ready");

        let worker_context = Arc::new(worker_context(
            &config,
            &stores,
            analyzer,
            Arc::new(extractor),
        ));
        Ok(Self {
            config,
            stores,
            queue,
            worker_context,
        })
    }

    /// Boundary service sharing this app's stores and queue.
    pub fn document_service(&self) -> DocumentService {
        DocumentService::new(
            self.stores.documents.clone(),
            self.stores.analyses.clone(),
            self.queue.clone(),
            self.config.clone(),
        )
    }

    /// Start a worker running both pipeline executors.
    pub fn start_worker(&self, config: WorkerConfig) -> WorkerHandle {
        WorkerBuilder::new(self.queue.clone())
            .with_config(config)
            .with_pipeline(self.worker_context.clone())
            .build()
            .start()
    }
}
