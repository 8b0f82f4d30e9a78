//! # chaincv-inference
//!
//! Generation backends and the structured analysis client for chaincv.
//!
//! This crate provides:
//! - The Gemini `generateContent` backend (feature `gemini`, default)
//! - An Ollama chat backend for local runs (feature `ollama`, default)
//! - A deterministic mock backend (feature `mock`)
//! - [`AnalysisClient`], which prompts a backend for a four-key JSON
//!   analysis and validates whatever comes back
//!
//! ## Example
//!
//! ```rust,ignore
//! use chaincv_inference::{backend_from_env, AnalysisClient};
//!
//! let client = AnalysisClient::new(backend_from_env()?);
//! let analysis = client.analyze(&resume_text).await?;
//! println!("score: {}", analysis.overall_score);
//! ```

pub mod analyzer;
pub mod json_extract;
pub mod provider;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use chaincv_core::*;

pub use analyzer::{build_prompt, parse_analysis_response, truncate_chars, AnalysisClient};
pub use json_extract::isolate_json_object;
pub use provider::{backend_from_env, build_backend, BackendKind};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiBackend, GeminiConfig};

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockGenerationBackend;
