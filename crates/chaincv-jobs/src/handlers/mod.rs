//! Executors for the two workflow task types.

pub mod fetch_file_path;
pub mod process_document;

pub use fetch_file_path::FetchFilePathHandler;
pub use process_document::{ProcessDocumentHandler, GENERIC_FAILURE_MESSAGE};
