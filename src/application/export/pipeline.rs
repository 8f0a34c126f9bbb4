//! Cancellable, progress-reporting PDF export.
//!
//! A run walks `Preparing → Rasterizing → Paginating → Assembling →
//! Finalizing → Complete`, yielding to the runtime between stages and between
//! page slices. Each yield is a checkpoint where a pending cancellation ends
//! the run. Only one run may be active per pipeline; a concurrent request is
//! rejected rather than queued.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use image::{
    ImageFormat, Rgb, RgbImage, Rgba, RgbaImage, codecs::jpeg::JpegEncoder, imageops,
};
use metrics::{counter, histogram};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::domain::types::ExportFormat;

use super::{
    geometry::{PageGeometry, PageSlice, Placement, plan_slices},
    options::ExportOptions,
    progress::{ExportStage, ProgressSink, ProgressTracker},
    surface::{ContentSurface, Presentation, PresentationGuard},
    types::{
        DocumentAssembler, DocumentMetadata, DocumentSetup, ExportArtifact, ExportError,
        PageImage, RasterOptions, Rasterizer,
    },
};

const METRIC_EXPORT_RUNS: &str = "marksmith_export_runs_total";
const METRIC_EXPORT_DURATION_MS: &str = "marksmith_export_duration_ms";

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    /// Pause taken at every checkpoint; zero yields without sleeping.
    pub yield_interval: Duration,
}

/// Observable state of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Active {
        run_id: Uuid,
        stage: ExportStage,
        cancel_requested: bool,
    },
}

#[derive(Debug, Default)]
struct RunSlot {
    active: Option<ActiveRun>,
}

#[derive(Debug, Clone)]
struct ActiveRun {
    run_id: Uuid,
    stage: ExportStage,
    cancel_requested: bool,
}

type SharedSlot = Arc<Mutex<RunSlot>>;

fn lock_slot(slot: &Mutex<RunSlot>) -> MutexGuard<'_, RunSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Requests cancellation of whichever run is active on the owning pipeline.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: SharedSlot,
}

impl CancelHandle {
    /// Returns `true` when a run was active to receive the request.
    pub fn cancel(&self) -> bool {
        let mut slot = lock_slot(&self.slot);
        match slot.active.as_mut() {
            Some(run) => {
                run.cancel_requested = true;
                true
            }
            None => false,
        }
    }
}

/// Ownership of the single run slot; releases it on drop.
struct RunGuard {
    slot: SharedSlot,
    run_id: Uuid,
}

impl RunGuard {
    fn acquire(slot: &SharedSlot) -> Result<Self, ExportError> {
        let mut state = lock_slot(slot);
        if state.active.is_some() {
            return Err(ExportError::AlreadyInProgress);
        }
        let run_id = Uuid::new_v4();
        state.active = Some(ActiveRun {
            run_id,
            stage: ExportStage::Preparing,
            cancel_requested: false,
        });
        Ok(Self {
            slot: Arc::clone(slot),
            run_id,
        })
    }

    fn set_stage(&self, stage: ExportStage) {
        let mut state = lock_slot(&self.slot);
        if let Some(run) = state.active.as_mut().filter(|run| run.run_id == self.run_id) {
            run.stage = stage;
        }
    }

    fn cancel_requested(&self) -> bool {
        let state = lock_slot(&self.slot);
        state
            .active
            .as_ref()
            .is_some_and(|run| run.run_id == self.run_id && run.cancel_requested)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = lock_slot(&self.slot);
        if state
            .active
            .as_ref()
            .is_some_and(|run| run.run_id == self.run_id)
        {
            state.active = None;
        }
    }
}

/// Converts a content surface into a paginated PDF.
pub struct ExportPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    assembler: Arc<dyn DocumentAssembler>,
    progress: Arc<dyn ProgressSink>,
    settings: PipelineSettings,
    slot: SharedSlot,
}

impl ExportPipeline {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        assembler: Arc<dyn DocumentAssembler>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            rasterizer,
            assembler,
            progress,
            settings: PipelineSettings::default(),
            slot: Arc::new(Mutex::new(RunSlot::default())),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> RunState {
        match lock_slot(&self.slot).active.as_ref() {
            Some(run) => RunState::Active {
                run_id: run.run_id,
                stage: run.stage,
                cancel_requested: run.cancel_requested,
            },
            None => RunState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), RunState::Active { .. })
    }

    /// Ask the active run to stop at its next checkpoint. No-op when idle.
    pub fn cancel(&self) {
        if self.cancel_handle().cancel() {
            debug!(target = "application::export", "Cancellation requested");
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Export `surface` as a PDF. Settles exactly once; the surface's
    /// presentation is restored before this returns on every path.
    pub async fn start_export(
        &self,
        surface: &mut dyn ContentSurface,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        options.validate()?;
        if surface.markup().trim().is_empty() {
            return Err(ExportError::validation("content must not be empty"));
        }
        let run = RunGuard::acquire(&self.slot)?;

        let span = info_span!(
            target: "application::export",
            "export_run",
            run_id = %run.run_id,
            page_size = %options.page_size,
            orientation = %options.orientation,
            scale = options.scale,
        );
        self.execute(run, surface, options).instrument(span).await
    }

    async fn execute(
        &self,
        run: RunGuard,
        surface: &mut dyn ContentSurface,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        let started_at = Instant::now();
        let mut tracker = ProgressTracker::new(Arc::clone(&self.progress));
        tracker.enter(ExportStage::Preparing, "Preparing document");

        let geometry = PageGeometry::from_options(options);
        let guard = PresentationGuard::apply(
            surface,
            &Presentation::print_safe(geometry.content_width_px()),
        );
        let outcome = self
            .run_stages(&run, &mut tracker, guard.surface(), &geometry, options)
            .await;
        guard.restore();

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        let outcome_label = match &outcome {
            Ok(artifact) => {
                run.set_stage(ExportStage::Complete);
                tracker.enter(ExportStage::Complete, "Export complete");
                info!(
                    target = "application::export",
                    result = "complete",
                    pages = artifact.pages.unwrap_or_default(),
                    bytes = artifact.bytes.len(),
                    elapsed_ms = elapsed_ms as u64,
                    "Export finished"
                );
                "complete"
            }
            Err(ExportError::Cancelled) => {
                run.set_stage(ExportStage::Cancelled);
                tracker.enter(ExportStage::Cancelled, "Export cancelled");
                info!(
                    target = "application::export",
                    result = "cancelled",
                    percent = tracker.percent(),
                    elapsed_ms = elapsed_ms as u64,
                    "Export cancelled"
                );
                "cancelled"
            }
            Err(err) => {
                run.set_stage(ExportStage::Failed);
                tracker.enter(ExportStage::Failed, err.to_string());
                warn!(
                    target = "application::export",
                    result = "failed",
                    error = %err,
                    elapsed_ms = elapsed_ms as u64,
                    "Export failed"
                );
                "failed"
            }
        };

        counter!(METRIC_EXPORT_RUNS, "outcome" => outcome_label).increment(1);
        histogram!(METRIC_EXPORT_DURATION_MS, "outcome" => outcome_label).record(elapsed_ms);

        outcome
    }

    async fn run_stages(
        &self,
        run: &RunGuard,
        tracker: &mut ProgressTracker,
        surface: &dyn ContentSurface,
        geometry: &PageGeometry,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        self.checkpoint(run).await?;
        Self::transition(run, tracker, ExportStage::Rasterizing, "Capturing content");
        let raster_options = RasterOptions {
            width_px: geometry.content_width_px(),
            scale: options.scale,
        };
        let bitmap = self
            .rasterizer
            .rasterize(surface, raster_options)
            .await
            .map_err(|err| ExportError::render_failure(ExportStage::Rasterizing, err))?;
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(ExportError::render_failure(
                ExportStage::Rasterizing,
                "rasterizer produced an empty bitmap",
            ));
        }

        self.checkpoint(run).await?;
        Self::transition(run, tracker, ExportStage::Paginating, "Calculating page breaks");
        let placement = Placement::compute(geometry, bitmap.width(), options.scale);
        let slices = plan_slices(bitmap.height(), placement.page_content_height_px);
        let total_pages = u32::try_from(slices.len()).unwrap_or(u32::MAX);
        debug!(
            target = "application::export",
            bitmap_width = bitmap.width(),
            bitmap_height = bitmap.height(),
            page_content_height_px = placement.page_content_height_px,
            total_pages,
            "Pagination planned"
        );

        self.checkpoint(run).await?;
        Self::transition(
            run,
            tracker,
            ExportStage::Assembling,
            format!("Assembling {total_pages} pages"),
        );
        let mut builder = self.assembler.begin(DocumentSetup {
            title: options.effective_title(),
            page_width_mm: geometry.page_width_mm,
            page_height_mm: geometry.page_height_mm,
        });
        for slice in &slices {
            self.checkpoint(run).await?;
            let image = crop_slice(&bitmap, slice, options.quality)
                .map_err(|err| ExportError::render_failure(ExportStage::Assembling, err))?;
            builder
                .add_page(PageImage {
                    image,
                    x_mm: placement.offset_x_mm,
                    y_mm: placement.offset_y_mm,
                    width_mm: placement.image_width_mm,
                    height_mm: placement.slice_height_mm(slice),
                })
                .map_err(|err| ExportError::render_failure(ExportStage::Assembling, err))?;
            tracker.page_done(slice.page, total_pages);
        }

        self.checkpoint(run).await?;
        Self::transition(run, tracker, ExportStage::Finalizing, "Writing document");
        let bytes = builder
            .finish(DocumentMetadata {
                title: options.effective_title(),
                author: options.author.clone(),
                subject: options.subject.clone(),
                keywords: options.keywords.clone(),
            })
            .map_err(|err| ExportError::render_failure(ExportStage::Finalizing, err))?;

        Ok(ExportArtifact {
            filename: options.output_filename(),
            content_type: ExportFormat::Pdf.content_type(),
            bytes,
            pages: Some(total_pages),
        })
    }

    fn transition(
        run: &RunGuard,
        tracker: &mut ProgressTracker,
        stage: ExportStage,
        message: impl Into<String>,
    ) {
        run.set_stage(stage);
        debug!(target = "application::export", stage = %stage, "Stage entered");
        tracker.enter(stage, message);
    }

    async fn checkpoint(&self, run: &RunGuard) -> Result<(), ExportError> {
        if self.settings.yield_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.settings.yield_interval).await;
        }
        if run.cancel_requested() {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}

/// Copy one slice out of the bitmap, flatten it onto white, and pass it
/// through JPEG at the requested quality.
fn crop_slice(
    bitmap: &RgbaImage,
    slice: &PageSlice,
    quality: f32,
) -> Result<RgbImage, image::ImageError> {
    let region = imageops::crop_imm(bitmap, 0, slice.source_y, bitmap.width(), slice.height)
        .to_image();
    let flattened = flatten_onto_white(&region);

    let jpeg_quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, jpeg_quality).encode_image(&flattened)?;
    Ok(image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?.to_rgb8())
}

fn flatten_onto_white(region: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(region.width(), region.height(), |x, y| {
        let Rgba([r, g, b, a]) = *region.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |channel: u8| ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
