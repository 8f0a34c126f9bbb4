use std::fmt;

use async_trait::async_trait;
use image::{RgbImage, RgbaImage};
use serde::Serialize;
use thiserror::Error;

use super::{progress::ExportStage, surface::ContentSurface};

/// Coarse classification callers branch on when presenting a failed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportErrorKind {
    Validation,
    AlreadyInProgress,
    RenderFailure,
    Cancelled,
}

impl fmt::Display for ExportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExportErrorKind::Validation => "validation_error",
            ExportErrorKind::AlreadyInProgress => "already_in_progress",
            ExportErrorKind::RenderFailure => "render_failure",
            ExportErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("invalid export options: {message}")]
    Validation { message: String },
    #[error("an export is already in progress")]
    AlreadyInProgress,
    #[error("export failed while {stage}: {cause}")]
    RenderFailure { stage: ExportStage, cause: String },
    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn render_failure(stage: ExportStage, cause: impl fmt::Display) -> Self {
        Self::RenderFailure {
            stage,
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ExportErrorKind {
        match self {
            ExportError::Validation { .. } => ExportErrorKind::Validation,
            ExportError::AlreadyInProgress => ExportErrorKind::AlreadyInProgress,
            ExportError::RenderFailure { .. } => ExportErrorKind::RenderFailure,
            ExportError::Cancelled => ExportErrorKind::Cancelled,
        }
    }

    /// Cancellation is deliberate and should not be surfaced as an error notification.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ExportError::Cancelled)
    }
}

/// Downloadable export result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Filename guaranteed to end in the format's extension.
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Number of pages for paginated formats.
    pub pages: Option<u32>,
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("rasterizer unavailable: {0}")]
    Unavailable(String),
    #[error("rasterizer failed: {0}")]
    Failed(String),
    #[error("rasterizer produced unreadable output: {0}")]
    Decode(String),
}

/// Parameters for one rasterization call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Layout width of the surface in CSS pixels.
    pub width_px: u32,
    /// Device scale; the bitmap is roughly `width_px * scale` pixels wide.
    pub scale: f32,
}

/// Converts a content surface into a single bitmap covering its full height.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(
        &self,
        surface: &dyn ContentSurface,
        options: RasterOptions,
    ) -> Result<RgbaImage, RasterError>;
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("page image rejected: {0}")]
    Page(String),
    #[error("document serialisation failed: {0}")]
    Serialize(String),
}

/// Fixed page frame for a document being assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSetup {
    pub title: String,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
}

/// One slice ready for placement, in page coordinates measured from the top-left corner.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: RgbImage,
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
}

/// Accumulates pages for one document. The first page added fills the
/// document's initial page; each later call opens a new page.
pub trait DocumentBuilder: Send {
    fn add_page(&mut self, page: PageImage) -> Result<(), AssembleError>;

    fn page_count(&self) -> u32;

    fn finish(self: Box<Self>, metadata: DocumentMetadata) -> Result<Vec<u8>, AssembleError>;
}

pub trait DocumentAssembler: Send + Sync {
    fn begin(&self, setup: DocumentSetup) -> Box<dyn DocumentBuilder>;
}
