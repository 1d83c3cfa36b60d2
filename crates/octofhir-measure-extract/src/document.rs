//! Document text extraction interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An uploaded source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub name: String,
    pub media_type: Option<String>,
    pub content: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            content: content.into(),
        }
    }

    pub fn text(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, text.as_bytes().to_vec()).with_media_type("text/plain")
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Text pulled out of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    pub name: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentExtraction {
    pub combined_text: String,
    pub documents: Vec<DocumentText>,
    pub errors: Vec<String>,
}

/// Converts uploaded files (PDF, Word, HTML...) to plain text
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, files: &[DocumentFile]) -> Result<DocumentExtraction, DocumentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// Extractor for files that already hold UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn extract_one(file: &DocumentFile) -> DocumentText {
        let is_text = file
            .media_type
            .as_deref()
            .is_none_or(|mt| mt.starts_with("text/") || mt == "application/json");
        if !is_text {
            return DocumentText {
                name: file.name.clone(),
                text: String::new(),
                error: Some(format!("unsupported media type {}", file.media_type.as_deref().unwrap_or_default())),
            };
        }
        match String::from_utf8(file.content.clone()) {
            Ok(text) => DocumentText {
                name: file.name.clone(),
                text,
                error: None,
            },
            Err(e) => DocumentText {
                name: file.name.clone(),
                text: String::new(),
                error: Some(format!("not valid UTF-8: {e}")),
            },
        }
    }
}

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(&self, files: &[DocumentFile]) -> Result<DocumentExtraction, DocumentError> {
        let documents: Vec<DocumentText> = files.iter().map(Self::extract_one).collect();
        let errors = documents
            .iter()
            .filter_map(|d| d.error.as_ref().map(|e| format!("{}: {e}", d.name)))
            .collect();
        let combined_text = combine(&documents);
        Ok(DocumentExtraction {
            combined_text,
            documents,
            errors,
        })
    }
}

/// Join document texts, labelling each when there is more than one
pub fn combine(documents: &[DocumentText]) -> String {
    let texts: Vec<&DocumentText> = documents.iter().filter(|d| !d.text.trim().is_empty()).collect();
    match texts.as_slice() {
        [] => String::new(),
        [single] => single.text.clone(),
        many => many
            .iter()
            .map(|d| format!("=== {} ===\n\n{}", d.name, d.text.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}
