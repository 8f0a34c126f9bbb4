use serde::{Deserialize, Serialize};

use crate::domain::types::{ExportFormat, Margins, Orientation, PageSize};

use super::types::ExportError;

pub const MIN_QUALITY: f32 = 0.1;
pub const MAX_QUALITY: f32 = 1.0;
pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 5.0;

/// Caller-supplied settings for a single PDF export run. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub filename: String,
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margins: Margins,
    /// JPEG quality applied to each page image, in `[0.1, 1.0]`.
    pub quality: f32,
    /// Rasterization scale factor, in `[0.5, 5.0]`.
    pub scale: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filename: "document".to_string(),
            title: String::new(),
            author: String::new(),
            subject: String::new(),
            keywords: Vec::new(),
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
            margins: Margins::default(),
            quality: 0.95,
            scale: 2.0,
        }
    }
}

impl ExportOptions {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Check every constraint before any rendering work begins.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.filename.trim().is_empty() {
            return Err(ExportError::validation("filename must not be empty"));
        }
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(ExportError::validation(format!(
                "quality must be within [{MIN_QUALITY}, {MAX_QUALITY}], got {}",
                self.quality
            )));
        }
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.scale) {
            return Err(ExportError::validation(format!(
                "scale must be within [{MIN_SCALE}, {MAX_SCALE}], got {}",
                self.scale
            )));
        }
        self.margins
            .validate()
            .map_err(|err| ExportError::validation(err.to_string()))?;

        let (width, height) = self.page_dimensions_mm();
        let printable_width = width - self.margins.left - self.margins.right;
        let printable_height = height - self.margins.top - self.margins.bottom;
        if printable_width <= 0.0 || printable_height <= 0.0 {
            return Err(ExportError::validation(format!(
                "margins leave no printable area on a {} {} page",
                self.page_size, self.orientation
            )));
        }

        Ok(())
    }

    /// Page `(width, height)` in millimetres after applying orientation.
    pub fn page_dimensions_mm(&self) -> (f64, f64) {
        let (width, height) = self.page_size.dimensions_mm();
        match self.orientation {
            Orientation::Portrait => (width, height),
            Orientation::Landscape => (height, width),
        }
    }

    pub fn output_filename(&self) -> String {
        ExportFormat::Pdf.ensure_extension(&self.filename)
    }

    /// Document title, falling back to the filename stem.
    pub fn effective_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
        let filename = self.filename.trim();
        let suffix = format!(".{}", ExportFormat::Pdf.extension());
        let split = filename.len().saturating_sub(suffix.len());
        match (filename.get(..split), filename.get(split..)) {
            (Some(stem), Some(extension))
                if !stem.is_empty() && extension.eq_ignore_ascii_case(&suffix) =>
            {
                stem.to_string()
            }
            _ => filename.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::export::types::ExportErrorKind;

    #[test]
    fn defaults_are_valid() {
        ExportOptions::default().validate().expect("defaults valid");
    }

    #[test]
    fn quality_outside_range_is_rejected() {
        let options = ExportOptions {
            quality: 1.5,
            ..ExportOptions::default()
        };
        let err = options.validate().expect_err("quality rejected");
        assert_eq!(err.kind(), ExportErrorKind::Validation);
    }

    #[test]
    fn nan_quality_is_rejected() {
        let options = ExportOptions {
            quality: f32::NAN,
            ..ExportOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn scale_bounds_are_inclusive() {
        for scale in [0.5, 5.0] {
            let options = ExportOptions {
                scale,
                ..ExportOptions::default()
            };
            options.validate().expect("boundary scale valid");
        }
        let options = ExportOptions {
            scale: 5.01,
            ..ExportOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn blank_filename_is_rejected() {
        let options = ExportOptions::new("   ");
        assert!(options.validate().is_err());
    }

    #[test]
    fn margins_consuming_the_page_are_rejected() {
        let options = ExportOptions {
            margins: Margins::uniform(105.0),
            ..ExportOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let options = ExportOptions {
            orientation: Orientation::Landscape,
            ..ExportOptions::default()
        };
        assert_eq!(options.page_dimensions_mm(), (297.0, 210.0));
    }

    #[test]
    fn title_falls_back_to_filename_stem() {
        let options = ExportOptions::new("report.pdf");
        assert_eq!(options.effective_title(), "report");
        assert_eq!(options.output_filename(), "report.pdf");
    }

    #[test]
    fn title_fallback_ignores_extension_case() {
        assert_eq!(ExportOptions::new("report.Pdf").effective_title(), "report");
        assert_eq!(ExportOptions::new("Q3 plan.PDF").effective_title(), "Q3 plan");
        assert_eq!(ExportOptions::new("notes.md").effective_title(), "notes.md");
        assert_eq!(ExportOptions::new(".pdf").effective_title(), ".pdf");
    }
}
