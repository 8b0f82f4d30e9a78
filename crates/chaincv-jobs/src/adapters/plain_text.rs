//! Plain text pass-through extraction.

use async_trait::async_trait;

use chaincv_core::{Error, Result, TextExtractor};

/// Accepts UTF-8 text documents as-is.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Extraction(
                "Cannot extract text from empty document".to_string(),
            ));
        }
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Extraction(format!("Document is not valid UTF-8 text: {}", e)))?;
        let text = text.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            return Err(Error::Extraction(
                "Text extraction returned empty content".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
