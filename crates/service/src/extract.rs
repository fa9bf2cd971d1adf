//! Text extraction from uploaded documents.

use crate::error::{Result, ServiceError};
use pdf_oxide::converters::ConversionOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Classify by extension, case-insensitively
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "text" => Ok(Self::Text),
            _ => Err(ServiceError::UnsupportedFileType {
                extension: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{extension}")
                },
            }),
        }
    }
}

/// Extract the text of a document. PDF parsing runs on the blocking pool.
pub async fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(ServiceError::EmptyUpload);
    }
    match kind {
        DocumentKind::Text => extract_plain_text(bytes),
        DocumentKind::Pdf => {
            let owned = bytes.to_vec();
            tokio::task::spawn_blocking(move || extract_pdf_text(&owned)).await?
        }
    }
}

pub fn extract_plain_text(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|_| ServiceError::InvalidUtf8)?;
    if text.trim().is_empty() {
        return Err(ServiceError::NoExtractableText(
            "Text file is empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Text of every page that has any, each prefixed with `--- Page N ---`
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ServiceError::InvalidDocument(
            "file does not start with a PDF header".to_string(),
        ));
    }

    // pdf_oxide opens documents by path
    let mut file = tempfile::Builder::new()
        .prefix("docqa-upload-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ServiceError::InvalidDocument(format!("failed to stage upload: {e}")))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| ServiceError::InvalidDocument(format!("failed to stage upload: {e}")))?;

    let mut doc = pdf_oxide::PdfDocument::open(file.path())
        .map_err(|e| ServiceError::InvalidDocument(e.to_string()))?;
    let page_count = doc
        .page_count()
        .map_err(|e| ServiceError::InvalidDocument(e.to_string()))?;
    if page_count == 0 {
        return Err(ServiceError::NoExtractableText(
            "PDF file is empty - no pages found".to_string(),
        ));
    }

    let options = ConversionOptions {
        include_images: false,
        ..ConversionOptions::default()
    };
    let mut text = String::new();
    for page_index in 0..page_count {
        let page_text = doc
            .to_markdown(page_index, &options)
            .map_err(|e| ServiceError::InvalidDocument(format!("page {}: {e}", page_index + 1)))?;
        if page_text.trim().is_empty() {
            continue;
        }
        text.push_str(&format!("\n--- Page {} ---\n", page_index + 1));
        text.push_str(&page_text);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::NoExtractableText(
            "PDF file contains no extractable text".to_string(),
        ));
    }
    log::debug!("Extracted {} characters from {page_count} PDF pages", text.chars().count());
    Ok(text.to_string())
}
