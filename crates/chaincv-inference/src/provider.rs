//! Backend selection from configuration.
//!
//! `ANALYSIS_BACKEND` picks the generation backend:
//!
//! ```text
//! ANALYSIS_BACKEND=gemini   (default) Google Gemini, needs GEMINI_API_KEY
//! ANALYSIS_BACKEND=ollama   local Ollama at OLLAMA_BASE
//! ANALYSIS_BACKEND=mock     canned replies, only with the `mock` feature
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use chaincv_core::{Error, GenerationBackend, Result};

/// Generation backends known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Ollama,
    Mock,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Ollama => "ollama",
            BackendKind::Mock => "mock",
        }
    }

    /// Read `ANALYSIS_BACKEND`, defaulting to Gemini.
    pub fn from_env() -> Result<Self> {
        match std::env::var("ANALYSIS_BACKEND") {
            Ok(v) if !v.trim().is_empty() => v.parse(),
            _ => Ok(BackendKind::Gemini),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "ollama" => Ok(BackendKind::Ollama),
            "mock" => Ok(BackendKind::Mock),
            other => Err(Error::Config(format!(
                "unknown ANALYSIS_BACKEND '{}' (expected gemini, ollama or mock)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the backend of the given kind from environment configuration.
pub fn build_backend(kind: BackendKind) -> Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match kind {
        #[cfg(feature = "gemini")]
        BackendKind::Gemini => Arc::new(crate::gemini::GeminiBackend::from_env()?),
        #[cfg(feature = "ollama")]
        BackendKind::Ollama => Arc::new(crate::ollama::OllamaBackend::from_env()?),
        #[cfg(any(test, feature = "mock"))]
        BackendKind::Mock => Arc::new(crate::mock::MockGenerationBackend::new()),
        #[allow(unreachable_patterns)]
        other => {
            return Err(Error::Config(format!(
                "backend '{}' is not compiled into this build",
                other
            )))
        }
    };
    info!(
        subsystem = "inference",
        backend = %kind,
        model = backend.model_name(),
        "Generation backend selected"
    );
    Ok(backend)
}

/// Build the backend named by `ANALYSIS_BACKEND`.
pub fn backend_from_env() -> Result<Arc<dyn GenerationBackend>> {
    build_backend(BackendKind::from_env()?)
}
