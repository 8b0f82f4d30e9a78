//! # chaincv-server
//!
//! Process entrypoint and document boundaries for chaincv.
//!
//! This crate provides:
//! - [`DocumentService`]: the submission, trigger, status and reconcile
//!   boundaries an HTTP layer calls
//! - [`App`]: startup wiring of stores, queue client and worker context
//! - The `chaincv-worker` binary, which runs the analysis worker until
//!   interrupted

pub mod config;
pub mod services;
pub mod startup;

pub use config::{QueueBackend, ServerConfig};
pub use services::DocumentService;
pub use startup::{open_queue, open_stores, App, Stores};
