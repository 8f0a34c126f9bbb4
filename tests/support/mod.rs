#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use marksmith::application::export::{
    AssembleError, ContentSurface, DocumentAssembler, DocumentBuilder, DocumentMetadata,
    DocumentSetup, ExportOptions, PageImage, ProgressEvent, ProgressSink, RasterError,
    RasterOptions, Rasterizer,
    geometry::{PageGeometry, Placement},
};

/// Bitmap width the pipeline will request for `options`, and the height that
/// spans exactly `pages` pages of printable content.
pub fn bitmap_for_pages(options: &ExportOptions, pages: f64) -> (u32, u32) {
    let geometry = PageGeometry::from_options(options);
    let width = device_width(geometry.content_width_px(), options.scale);
    let placement = Placement::compute(&geometry, width, options.scale);
    let height = (f64::from(placement.page_content_height_px) * pages).round() as u32;
    (width, height)
}

fn device_width(width_px: u32, scale: f32) -> u32 {
    (f64::from(width_px) * f64::from(scale)).round() as u32
}

#[derive(Debug, Clone)]
pub struct RasterCall {
    pub options: RasterOptions,
    pub surface_width: Option<String>,
    pub surface_background: Option<String>,
}

/// Returns a white bitmap of a fixed height, or a configured failure.
pub struct FakeRasterizer {
    height: u32,
    fail_with: Option<String>,
    calls: Mutex<Vec<RasterCall>>,
}

impl FakeRasterizer {
    pub fn with_height(height: u32) -> Self {
        Self {
            height,
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            height: 1,
            fail_with: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RasterCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        surface: &dyn ContentSurface,
        options: RasterOptions,
    ) -> Result<RgbaImage, RasterError> {
        let presentation = surface.presentation();
        self.calls.lock().unwrap().push(RasterCall {
            options,
            surface_width: presentation.get("width").map(str::to_string),
            surface_background: presentation.get("background-color").map(str::to_string),
        });
        if let Some(message) = &self.fail_with {
            return Err(RasterError::Failed(message.clone()));
        }

        let width = device_width(options.width_px, options.scale);
        Ok(RgbaImage::from_pixel(
            width,
            self.height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPage {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Debug, Default)]
pub struct Recording {
    pub setup: Option<DocumentSetup>,
    pub pages: Vec<RecordedPage>,
    pub metadata: Option<DocumentMetadata>,
}

/// Where a [`RecordingAssembler`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailure {
    /// Reject the nth page added, counting from 1.
    AddPage(usize),
    Finish,
}

/// Records what the pipeline hands to the assembler instead of writing a PDF.
#[derive(Clone, Default)]
pub struct RecordingAssembler {
    pub recording: Arc<Mutex<Recording>>,
    failure: Option<BuildFailure>,
}

impl RecordingAssembler {
    pub fn failing(failure: BuildFailure) -> Self {
        Self {
            recording: Arc::default(),
            failure: Some(failure),
        }
    }

    pub fn pages(&self) -> Vec<RecordedPage> {
        self.recording.lock().unwrap().pages.clone()
    }

    pub fn metadata(&self) -> Option<DocumentMetadata> {
        self.recording.lock().unwrap().metadata.clone()
    }
}

impl DocumentAssembler for RecordingAssembler {
    fn begin(&self, setup: DocumentSetup) -> Box<dyn DocumentBuilder> {
        let mut recording = self.recording.lock().unwrap();
        recording.setup = Some(setup);
        recording.pages.clear();
        recording.metadata = None;
        Box::new(RecordingBuilder {
            recording: Arc::clone(&self.recording),
            failure: self.failure,
        })
    }
}

struct RecordingBuilder {
    recording: Arc<Mutex<Recording>>,
    failure: Option<BuildFailure>,
}

impl DocumentBuilder for RecordingBuilder {
    fn add_page(&mut self, page: PageImage) -> Result<(), AssembleError> {
        let mut recording = self.recording.lock().unwrap();
        if self.failure == Some(BuildFailure::AddPage(recording.pages.len() + 1)) {
            return Err(AssembleError::Page("could not draw page image".to_string()));
        }
        recording.pages.push(RecordedPage {
            pixel_width: page.image.width(),
            pixel_height: page.image.height(),
            x_mm: page.x_mm,
            y_mm: page.y_mm,
            width_mm: page.width_mm,
            height_mm: page.height_mm,
        });
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.recording.lock().unwrap().pages.len() as u32
    }

    fn finish(self: Box<Self>, metadata: DocumentMetadata) -> Result<Vec<u8>, AssembleError> {
        if self.failure == Some(BuildFailure::Finish) {
            return Err(AssembleError::Serialize("disk full".to_string()));
        }
        self.recording.lock().unwrap().metadata = Some(metadata);
        Ok(b"%PDF-recorded".to_vec())
    }
}

/// Collects every progress event in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ProgressSink for EventLog {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
