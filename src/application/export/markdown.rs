use crate::domain::types::ExportFormat;

use super::types::{ExportArtifact, ExportError};

/// Package raw markdown source as a downloadable `.md` file.
pub fn export_markdown(source: &str, filename: &str) -> Result<ExportArtifact, ExportError> {
    if filename.trim().is_empty() {
        return Err(ExportError::validation("filename must not be empty"));
    }

    Ok(ExportArtifact {
        filename: ExportFormat::Markdown.ensure_extension(filename),
        content_type: ExportFormat::Markdown.content_type(),
        bytes: source.as_bytes().to_vec(),
        pages: None,
    })
}
