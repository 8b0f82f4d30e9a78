//! PDF text extraction using `pdftotext` (poppler-utils).

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use chaincv_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use chaincv_core::{Error, Result, TextExtractor};

/// Extracts the text layer of a PDF.
///
/// The bytes are written to a temporary file because `pdftotext` reads from a
/// path; the text is read back from stdout. Each invocation is guarded by a
/// timeout.
pub struct PdfTextExtractor {
    timeout_secs: u64,
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self {
            timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Whether `pdftotext` is installed.
    pub async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            // `-v` exits with 0 or 99 depending on the poppler version.
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the bytes start with the `%PDF` magic.
pub fn has_pdf_header(data: &[u8]) -> bool {
    data.starts_with(b"%PDF")
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!(
                "pdftotext timed out after {}s",
                timeout_secs
            ))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute pdftotext: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "pdftotext failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Extraction(
                "Cannot extract text from empty document".to_string(),
            ));
        }
        if !has_pdf_header(data) {
            return Err(Error::Extraction(
                "Document is not a valid PDF (missing %PDF header)".to_string(),
            ));
        }

        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;

        let text = run_cmd_with_timeout(
            Command::new("pdftotext")
                .arg("-enc")
                .arg("UTF-8")
                .arg(tmpfile.path())
                .arg("-"),
            self.timeout_secs,
        )
        .await?;

        let text = text.trim();
        debug!(bytes = data.len(), text_len = text.len(), "pdftotext finished");
        if text.is_empty() {
            return Err(Error::Extraction(
                "PDF text extraction returned empty content".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
