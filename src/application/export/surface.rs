//! Content surfaces and the reversible print-safe presentation override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const PRINT_FONT_STACK: &str = "-apple-system, BlinkMacSystemFont, \"Segoe UI\", Roboto, \"Helvetica Neue\", Arial, sans-serif";

/// Presentational style properties of a surface, keyed by CSS property name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation(BTreeMap<String, String>);

impl Presentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(property, value);
        self
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<String>) {
        self.0.insert(property.into(), value.into());
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.0.get(property).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply every property of `overrides` on top of `self`.
    pub fn merged(&self, overrides: &Presentation) -> Presentation {
        let mut merged = self.clone();
        for (property, value) in overrides.iter() {
            merged.set(property, value);
        }
        merged
    }

    /// Render as an inline `style` attribute value.
    pub fn to_css(&self) -> String {
        self.iter()
            .map(|(property, value)| format!("{property}: {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Override applied while rasterizing: fixed printable width, visible
    /// overflow, white background, and a standard font stack.
    pub fn print_safe(width_px: u32) -> Presentation {
        Presentation::new()
            .with("width", format!("{width_px}px"))
            .with("max-width", "none")
            .with("overflow", "visible")
            .with("background-color", "#ffffff")
            .with("color", "#000000")
            .with("font-family", PRINT_FONT_STACK)
            .with("padding", "0")
    }
}

/// A rendered content region whose presentation can be read and replaced.
pub trait ContentSurface: Send + Sync {
    /// Sanitised HTML body of the surface.
    fn markup(&self) -> &str;

    fn presentation(&self) -> &Presentation;

    fn set_presentation(&mut self, presentation: Presentation);

    /// Standalone HTML document reflecting the current presentation.
    fn to_document(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"></head><body style=\"margin: 0; background-color: #ffffff\"><div class=\"markdown-body\" style=\"{}\">{}</div></body></html>\n",
            escape_attribute(&self.presentation().to_css()),
            self.markup()
        )
    }
}

/// In-memory surface over sanitised HTML, typically a render step's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlSurface {
    markup: String,
    presentation: Presentation,
}

impl HtmlSurface {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            presentation: Presentation::default(),
        }
    }

    pub fn with_presentation(mut self, presentation: Presentation) -> Self {
        self.presentation = presentation;
        self
    }
}

impl ContentSurface for HtmlSurface {
    fn markup(&self) -> &str {
        &self.markup
    }

    fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    fn set_presentation(&mut self, presentation: Presentation) {
        self.presentation = presentation;
    }
}

/// Holds a surface in its overridden presentation and puts the snapshot back
/// when restored or dropped, whichever happens first.
pub struct PresentationGuard<'a, S: ContentSurface + ?Sized> {
    surface: &'a mut S,
    snapshot: Option<Presentation>,
}

impl<'a, S: ContentSurface + ?Sized> PresentationGuard<'a, S> {
    pub fn apply(surface: &'a mut S, overrides: &Presentation) -> Self {
        let snapshot = surface.presentation().clone();
        surface.set_presentation(snapshot.merged(overrides));
        Self {
            surface,
            snapshot: Some(snapshot),
        }
    }

    pub fn surface(&self) -> &S {
        &*self.surface
    }

    pub fn restore(mut self) {
        self.restore_snapshot();
    }

    fn restore_snapshot(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.surface.set_presentation(snapshot);
        }
    }
}

impl<S: ContentSurface + ?Sized> Drop for PresentationGuard<'_, S> {
    fn drop(&mut self) {
        self.restore_snapshot();
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styled_surface() -> HtmlSurface {
        HtmlSurface::new("<p>hi</p>").with_presentation(
            Presentation::new()
                .with("width", "320px")
                .with("overflow", "hidden")
                .with("line-height", "1.6"),
        )
    }

    #[test]
    fn guard_overrides_then_restores_on_drop() {
        let mut surface = styled_surface();
        let original = surface.presentation().clone();
        {
            let guard = PresentationGuard::apply(&mut surface, &Presentation::print_safe(718));
            let current = guard.surface().presentation();
            assert_eq!(current.get("width"), Some("718px"));
            assert_eq!(current.get("overflow"), Some("visible"));
            assert_eq!(current.get("line-height"), Some("1.6"));
        }
        assert_eq!(surface.presentation(), &original);
    }

    #[test]
    fn explicit_restore_is_idempotent_with_drop() {
        let mut surface = styled_surface();
        let original = surface.presentation().clone();
        let guard = PresentationGuard::apply(&mut surface, &Presentation::print_safe(100));
        guard.restore();
        assert_eq!(surface.presentation(), &original);
    }

    #[test]
    fn restores_across_unwinding() {
        let mut surface = styled_surface();
        let original = surface.presentation().clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = PresentationGuard::apply(&mut surface, &Presentation::print_safe(100));
            panic!("rasterizer exploded");
        }));
        assert!(result.is_err());
        assert_eq!(surface.presentation(), &original);
    }

    #[test]
    fn document_embeds_presentation_as_inline_style() {
        let surface = HtmlSurface::new("<p>x</p>")
            .with_presentation(Presentation::new().with("font-family", "\"Inter\""));
        let document = surface.to_document();
        assert!(document.contains("style=\"font-family: &quot;Inter&quot;\""));
        assert!(document.contains("<p>x</p>"));
    }
}
