//! Export pipeline: markdown passthrough and paginated PDF generation.

pub mod geometry;
mod markdown;
pub mod options;
mod pipeline;
pub mod progress;
pub mod surface;
pub mod types;

pub use markdown::export_markdown;
pub use options::ExportOptions;
pub use pipeline::{CancelHandle, ExportPipeline, PipelineSettings, RunState};
pub use progress::{ExportStage, NoopProgress, ProgressEvent, ProgressSink};
pub use surface::{ContentSurface, HtmlSurface, Presentation, PresentationGuard};
pub use types::{
    AssembleError, DocumentAssembler, DocumentBuilder, DocumentMetadata, DocumentSetup,
    ExportArtifact, ExportError, ExportErrorKind, PageImage, RasterError, RasterOptions,
    Rasterizer,
};
