//! Sanitized render step.
//!
//! The rendering pipeline is kept pure: it accepts markdown input, produces
//! deterministic sanitised HTML, and surfaces structured errors. Preview panes
//! and the export pipeline both consume its output.

mod service;
mod types;

pub use service::{ComrakRenderService, render_service};
pub use types::{
    DocumentStats, RenderError, RenderOutput, RenderProfile, RenderRequest, RenderService,
};
