//! # chaincv-core
//!
//! Core types, traits, and abstractions for chaincv.
//!
//! This crate provides the data model (documents, analysis records, queue
//! tasks), the shared error type, and the trait seams that the store,
//! inference, extraction and queue crates implement.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{new_v7, parse_id};
