use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Selects how the HTML is annotated for its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderProfile {
    /// Live preview: block elements carry `data-sourcepos` so the editor can sync scrolling.
    #[default]
    Preview,
    /// Export surface: no editor annotations.
    Export,
}

impl RenderProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderProfile::Preview => "preview",
            RenderProfile::Export => "export",
        }
    }
}

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Source markdown captured from the editor.
    pub markdown: String,
    #[serde(default)]
    pub profile: RenderProfile,
}

impl RenderRequest {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            profile: RenderProfile::Preview,
        }
    }

    pub fn with_profile(mut self, profile: RenderProfile) -> Self {
        self.profile = profile;
        self
    }
}

/// Editor status-bar figures computed from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentStats {
    pub words: u32,
    pub characters: u32,
    pub lines: u32,
    pub reading_time_minutes: u32,
    pub code_blocks: u32,
}

/// Deterministic rendering result returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOutput {
    /// Sanitised HTML safe for direct insertion into a preview or export surface.
    pub html: String,
    #[serde(default)]
    pub stats: DocumentStats,
}

/// Structured errors surfaced by the rendering pipeline.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
}

/// Implementations must be pure and deterministic: given the same input, they
/// return identical outputs or errors.
pub trait RenderService: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}
