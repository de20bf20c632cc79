//! Resume PDF connector.
//!
//! Extracts the text layer of a local PDF into `{"resume_text": "..."}`.
//! A missing file is not an error: the snapshot simply carries empty text.
//! A file that exists but cannot be parsed reports [`SourceUnavailable`] so
//! the previous snapshot survives.
//!
//! # Configuration
//!
//! ```toml
//! [sources.resume]
//! pdf_path = "./assets/resume.pdf"
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::error::SourceUnavailable;
use crate::models::Source;
use crate::sources::SourceReader;

pub struct ResumeReader {
    pdf_path: PathBuf,
}

impl ResumeReader {
    pub fn new(pdf_path: PathBuf) -> Self {
        Self { pdf_path }
    }
}

#[async_trait]
impl SourceReader for ResumeReader {
    fn source(&self) -> Source {
        Source::Resume
    }

    async fn read(&self) -> Result<Value, SourceUnavailable> {
        let unavailable = |reason: String| SourceUnavailable {
            origin: Source::Resume,
            reason,
        };

        let bytes = match tokio::fs::read(&self.pdf_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.pdf_path.display(), "resume PDF not found; using empty text");
                return Ok(json!({ "resume_text": "" }));
            }
            Err(e) => {
                return Err(unavailable(format!(
                    "{}: {}",
                    self.pdf_path.display(),
                    e
                )))
            }
        };

        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .map_err(unavailable)?;
        Ok(json!({ "resume_text": text.trim() }))
    }
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("PDF extraction failed: {}", e))
}
