//! Extractor registry dispatching on the detected document format.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chaincv_core::{Error, Result, TextExtractor};

use crate::adapters::{PdfTextExtractor, PlainTextExtractor};

/// Document formats the pipeline can turn into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::PlainText => f.write_str("text"),
        }
    }
}

/// Detect the format from magic bytes.
///
/// Binary formats are recognized by `infer`. Bytes it does not recognize, or
/// recognizes as a text type such as HTML or a shell script, are treated as
/// plain text when they decode as UTF-8.
pub fn detect_format(data: &[u8]) -> std::result::Result<DocumentFormat, String> {
    match infer::get(data) {
        Some(kind) if kind.mime_type() == "application/pdf" => Ok(DocumentFormat::Pdf),
        Some(kind)
            if kind.matcher_type() == infer::MatcherType::Text
                && std::str::from_utf8(data).is_ok() =>
        {
            Ok(DocumentFormat::PlainText)
        }
        Some(kind) => Err(kind.mime_type().to_string()),
        None if std::str::from_utf8(data).is_ok() => Ok(DocumentFormat::PlainText),
        None => Err("application/octet-stream".to_string()),
    }
}

/// Registry mapping document formats to their extractors.
pub struct DocumentExtractor {
    extractors: HashMap<DocumentFormat, Arc<dyn TextExtractor>>,
    pdf: Option<Arc<PdfTextExtractor>>,
}

impl DocumentExtractor {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
            pdf: None,
        }
    }

    /// Registry with the PDF and plain text extractors.
    pub fn new() -> Self {
        let pdf = Arc::new(PdfTextExtractor::new());
        let mut registry = Self::empty();
        registry.register(DocumentFormat::Pdf, pdf.clone());
        registry.register(DocumentFormat::PlainText, Arc::new(PlainTextExtractor));
        registry.pdf = Some(pdf);
        registry
    }

    /// Register an extractor. Replaces any existing one for the same format.
    pub fn register(&mut self, format: DocumentFormat, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(format, extractor);
    }

    /// Check if an extractor is registered for the given format.
    pub fn has_extractor(&self, format: DocumentFormat) -> bool {
        self.extractors.contains_key(&format)
    }

    /// Whether the external PDF tool is available.
    pub async fn health_check(&self) -> bool {
        match &self.pdf {
            Some(pdf) => pdf.health_check().await.unwrap_or(false),
            None => true,
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract_text(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Extraction(
                "Cannot extract text from empty document".to_string(),
            ));
        }
        let format = detect_format(data).map_err(|mime| {
            Error::Extraction(format!("unsupported document format: {}", mime))
        })?;
        let extractor = self.extractors.get(&format).ok_or_else(|| {
            Error::Extraction(format!("unsupported document format: {}", format))
        })?;
        debug!(%format, bytes = data.len(), "Extracting document text");
        extractor.extract_text(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"%PDF-1.5\n%..."), Ok(DocumentFormat::Pdf));
        assert_eq!(detect_format(b"Jane Doe"), Ok(DocumentFormat::PlainText));
        assert_eq!(
            detect_format(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Err("image/png".to_string())
        );
        assert!(detect_format(&[0xff, 0x00, 0xfe, 0x01]).is_err());
    }

    #[tokio::test]
    async fn test_text_matched_by_infer_is_plain_text() {
        let samples: [&[u8]; 3] = [
            b"#!/resume\nJane Doe\nStaff engineer",
            b"<?xml version=\"1.0\"?><resume><name>Jane Doe</name></resume>",
            b"<html><body>Jane Doe, staff engineer</body></html>",
        ];
        let extractor = DocumentExtractor::new();
        for sample in samples {
            assert!(infer::get(sample).is_some());
            assert_eq!(detect_format(sample), Ok(DocumentFormat::PlainText));
            let text = extractor.extract_text(sample).await.unwrap();
            assert!(text.contains("Jane Doe"));
        }
    }

    #[tokio::test]
    async fn test_plain_text_dispatch() {
        let extractor = DocumentExtractor::new();
        let text = extractor.extract_text(b"  Rust engineer  ").await.unwrap();
        assert_eq!(text, "Rust engineer");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let err = DocumentExtractor::new().extract_text(b"").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let err = DocumentExtractor::new()
            .extract_text(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported document format"));
    }

    #[tokio::test]
    async fn test_missing_extractor() {
        let err = DocumentExtractor::empty()
            .extract_text(b"text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported document format: text"));
        assert!(!DocumentExtractor::empty().has_extractor(DocumentFormat::Pdf));
    }
}
