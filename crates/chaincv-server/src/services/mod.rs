//! Service layer for the document boundaries.

pub mod document_service;

pub use document_service::DocumentService;
