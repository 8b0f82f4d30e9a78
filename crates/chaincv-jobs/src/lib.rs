//! # chaincv-jobs
//!
//! Document analysis pipeline workers for chaincv.
//!
//! This crate provides:
//! - The `fetch_file_path` and `process_document` task executors
//! - Text extraction for PDF and plain-text uploads
//! - Conductor and in-memory task queue clients
//! - A lease-based worker pool with bounded concurrency and graceful drain
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chaincv_jobs::{ConductorClient, DocumentExtractor, WorkerBuilder, WorkerConfig, WorkerContext};
//!
//! let ctx = Arc::new(WorkerContext::new(documents, analyses, analyzer, Arc::new(DocumentExtractor::new())));
//! let worker = WorkerBuilder::new(Arc::new(ConductorClient::from_env()?))
//!     .with_config(WorkerConfig::from_env())
//!     .with_pipeline(ctx)
//!     .build();
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod handler;
pub mod handlers;
pub mod queue;
pub mod worker;

// Re-export core types
pub use chaincv_core::*;

pub use adapters::{PdfTextExtractor, PlainTextExtractor};
pub use extraction::{detect_format, DocumentExtractor, DocumentFormat};
pub use handler::{failed_update, TaskContext, TaskHandler, TaskOutcome, WorkerContext};
pub use handlers::{FetchFilePathHandler, ProcessDocumentHandler, GENERIC_FAILURE_MESSAGE};
pub use queue::{ConductorClient, ConductorConfig, MemoryQueue, WorkflowRun, WorkflowStatus};
pub use worker::{TaskWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
