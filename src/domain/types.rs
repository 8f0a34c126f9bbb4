//! Value types shared by export options, settings, and persisted preferences.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Physical paper sizes supported by the PDF exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
}

impl PageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A4 => "a4",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
        }
    }

    /// Portrait `(width, height)` in millimetres.
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::Letter => (216.0, 279.0),
            PageSize::Legal => (216.0, 356.0),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSize {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(DomainError::unsupported(
                "page size",
                other,
                "a4, letter or legal",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(DomainError::unsupported(
                "orientation",
                other,
                "portrait or landscape",
            )),
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub const fn uniform(mm: f64) -> Self {
        Self {
            top: mm,
            right: mm,
            bottom: mm,
            left: mm,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let sides = [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ];
        for (side, value) in sides {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::InvalidMargin { side, value });
            }
        }
        Ok(())
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(10.0)
    }
}

/// Output formats offered by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    /// Return `filename` with this format's extension appended unless it already ends with it.
    pub fn ensure_extension(self, filename: &str) -> String {
        let trimmed = filename.trim();
        let suffix = format!(".{}", self.extension());
        if trimmed.to_ascii_lowercase().ends_with(&suffix) {
            trimmed.to_string()
        } else {
            format!("{trimmed}{suffix}")
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(DomainError::unsupported(
                "export format",
                other,
                "markdown or pdf",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes_parse_case_insensitively() {
        assert_eq!("A4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!(" letter ".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert!("tabloid".parse::<PageSize>().is_err());
    }

    #[test]
    fn page_size_table_matches_paper_dimensions() {
        assert_eq!(PageSize::A4.dimensions_mm(), (210.0, 297.0));
        assert_eq!(PageSize::Letter.dimensions_mm(), (216.0, 279.0));
        assert_eq!(PageSize::Legal.dimensions_mm(), (216.0, 356.0));
    }

    #[test]
    fn ensure_extension_appends_only_when_missing() {
        assert_eq!(ExportFormat::Pdf.ensure_extension("notes"), "notes.pdf");
        assert_eq!(ExportFormat::Pdf.ensure_extension("notes.PDF"), "notes.PDF");
        assert_eq!(
            ExportFormat::Markdown.ensure_extension("draft.txt"),
            "draft.txt.md"
        );
    }

    #[test]
    fn negative_margins_are_rejected() {
        let margins = Margins {
            left: -1.0,
            ..Margins::default()
        };
        assert_eq!(
            margins.validate(),
            Err(DomainError::InvalidMargin {
                side: "left",
                value: -1.0
            })
        );
        assert!(Margins::uniform(0.0).validate().is_ok());
    }

    #[test]
    fn unknown_names_report_accepted_values() {
        let err = "tabloid".parse::<PageSize>().expect_err("unknown size");
        assert_eq!(
            err.to_string(),
            "unsupported page size `tabloid` (expected a4, letter or legal)"
        );
        assert!(matches!(
            "docx".parse::<ExportFormat>(),
            Err(DomainError::Unsupported {
                kind: "export format",
                ..
            })
        ));
    }
}
