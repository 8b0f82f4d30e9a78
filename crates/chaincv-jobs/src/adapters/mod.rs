//! Text extractors for the document formats the pipeline accepts.

pub mod pdf_text;
pub mod plain_text;

pub use pdf_text::PdfTextExtractor;
pub use plain_text::PlainTextExtractor;
