mod support;

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use marksmith::application::export::{
    CancelHandle, ContentSurface, ExportError, ExportErrorKind, ExportOptions, ExportPipeline,
    ExportStage, HtmlSurface, NoopProgress, PipelineSettings, Presentation, ProgressEvent,
    ProgressSink, RunState,
};
use marksmith::domain::types::{Orientation, PageSize};

use support::{BuildFailure, EventLog, FakeRasterizer, RecordingAssembler, bitmap_for_pages};

fn options() -> ExportOptions {
    ExportOptions {
        scale: 0.5,
        title: "Quarterly notes".to_string(),
        author: "Sam".to_string(),
        ..ExportOptions::new("notes")
    }
}

fn editor_presentation() -> Presentation {
    Presentation::new()
        .with("width", "640px")
        .with("max-width", "48rem")
        .with("background-color", "#1e1e1e")
        .with("color", "#d4d4d4")
}

fn surface() -> HtmlSurface {
    HtmlSurface::new("<h1>Notes</h1><p>Body</p>").with_presentation(editor_presentation())
}

fn stages(events: &[ProgressEvent]) -> Vec<ExportStage> {
    let mut stages: Vec<ExportStage> = events.iter().map(|event| event.stage).collect();
    stages.dedup();
    stages
}

fn assert_monotonic(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].percent <= pair[1].percent,
            "percent decreased: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn two_and_a_half_pages_become_three_slices() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 2.5);
    let rasterizer = Arc::new(FakeRasterizer::with_height(height));
    let assembler = RecordingAssembler::default();
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(assembler.clone()),
        Arc::new(log.clone()),
    );

    let mut surface = surface();
    let artifact = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect("export succeeds");

    assert_eq!(artifact.filename, "notes.pdf");
    assert_eq!(artifact.content_type, "application/pdf");
    assert_eq!(artifact.pages, Some(3));
    assert_eq!(artifact.bytes, b"%PDF-recorded");

    let pages = assembler.pages();
    assert_eq!(pages.len(), 3);
    let full = pages[0].pixel_height;
    assert_eq!(pages[1].pixel_height, full);
    assert!(pages[2].pixel_height < full);
    assert_eq!(
        pages.iter().map(|page| page.pixel_height).sum::<u32>(),
        height
    );
    assert!(pages[2].height_mm < pages[0].height_mm);
    for page in &pages {
        assert!((page.width_mm - pages[0].width_mm).abs() < 1e-9);
        assert!((page.y_mm - 10.0).abs() < 1e-9);
        assert!(page.height_mm <= 277.0 + 1e-6);
    }

    let metadata = assembler.metadata().expect("document finished");
    assert_eq!(metadata.title, "Quarterly notes");
    assert_eq!(metadata.author, "Sam");

    let events = log.events();
    assert_eq!(
        stages(&events),
        vec![
            ExportStage::Preparing,
            ExportStage::Rasterizing,
            ExportStage::Paginating,
            ExportStage::Assembling,
            ExportStage::Finalizing,
            ExportStage::Complete,
        ]
    );
    assert_monotonic(&events);
    let assembling: Vec<u8> = events
        .iter()
        .filter(|event| event.stage == ExportStage::Assembling)
        .map(|event| event.percent)
        .collect();
    assert_eq!(assembling, vec![50, 63, 76, 90]);
    assert_eq!(
        events.last().map(|event| (event.stage, event.percent)),
        Some((ExportStage::Complete, 100))
    );
    assert_eq!(pipeline.state(), RunState::Idle);
}

#[tokio::test]
async fn default_scale_a4_portrait_splits_two_and_a_half_pages_into_three() {
    let options = ExportOptions {
        scale: 2.0,
        ..ExportOptions::new("notes")
    };
    assert_eq!(options.page_size, PageSize::A4);
    assert_eq!(options.orientation, Orientation::Portrait);
    let (width, height) = bitmap_for_pages(&options, 2.5);
    let rasterizer = Arc::new(FakeRasterizer::with_height(height));
    let assembler = RecordingAssembler::default();
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(assembler.clone()),
        Arc::new(NoopProgress),
    );

    let artifact = pipeline
        .start_export(&mut surface(), &options)
        .await
        .expect("export succeeds");

    assert_eq!(artifact.pages, Some(3));
    assert_eq!(rasterizer.calls()[0].options.scale, 2.0);
    let pages = assembler.pages();
    assert!(pages.iter().all(|page| page.pixel_width == width));
    assert_eq!(pages[0].pixel_height, pages[1].pixel_height);
    assert!(pages[2].pixel_height < pages[0].pixel_height);
    assert_eq!(
        pages.iter().map(|page| page.pixel_height).sum::<u32>(),
        height
    );
}

#[tokio::test]
async fn short_content_fits_on_one_page() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 0.2);
    let assembler = RecordingAssembler::default();
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(assembler.clone()),
        Arc::new(NoopProgress),
    );

    let artifact = pipeline
        .start_export(&mut surface(), &options)
        .await
        .expect("export succeeds");

    assert_eq!(artifact.pages, Some(1));
    assert_eq!(assembler.pages()[0].pixel_height, height);
}

#[tokio::test]
async fn invalid_options_fail_before_any_progress() {
    let rasterizer = Arc::new(FakeRasterizer::with_height(100));
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(RecordingAssembler::default()),
        Arc::new(log.clone()),
    );

    let options = ExportOptions {
        quality: 1.5,
        ..options()
    };
    let mut surface = surface();
    let err = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect_err("quality rejected");

    assert_eq!(err.kind(), ExportErrorKind::Validation);
    assert!(log.events().is_empty());
    assert!(rasterizer.calls().is_empty());
    assert_eq!(surface.presentation(), &editor_presentation());
    assert_eq!(pipeline.state(), RunState::Idle);
}

#[tokio::test]
async fn empty_content_fails_before_any_progress() {
    let rasterizer = Arc::new(FakeRasterizer::with_height(500));
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(RecordingAssembler::default()),
        Arc::new(log.clone()),
    );

    for markup in ["", "  \n\t "] {
        let mut blank = HtmlSurface::new(markup).with_presentation(editor_presentation());
        let err = pipeline
            .start_export(&mut blank, &ExportOptions::new("empty"))
            .await
            .expect_err("blank content rejected");

        assert_eq!(err.kind(), ExportErrorKind::Validation);
        assert_eq!(blank.presentation(), &editor_presentation());
    }
    assert!(log.events().is_empty());
    assert!(rasterizer.calls().is_empty());
    assert_eq!(pipeline.state(), RunState::Idle);
}

#[tokio::test]
async fn concurrent_request_is_rejected_without_disturbing_active_run() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 1.5);
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(RecordingAssembler::default()),
        Arc::new(log.clone()),
    )
    .with_settings(PipelineSettings {
        yield_interval: Duration::from_millis(5),
    });

    let mut first_surface = surface();
    let mut second_surface = surface();
    let (first, second) = tokio::join!(
        pipeline.start_export(&mut first_surface, &options),
        pipeline.start_export(&mut second_surface, &options),
    );

    let artifact = first.expect("first run completes");
    assert_eq!(artifact.pages, Some(2));
    assert!(matches!(second, Err(ExportError::AlreadyInProgress)));
    assert_eq!(second_surface.presentation(), &editor_presentation());

    let events = log.events();
    assert_eq!(
        events
            .iter()
            .filter(|event| event.stage == ExportStage::Preparing)
            .count(),
        1
    );
    assert_eq!(events.last().map(|event| event.percent), Some(100));

    pipeline
        .start_export(&mut second_surface, &options)
        .await
        .expect("slot released after completion");
}

/// Cancels through a handle the first time the armed stage is reported.
struct CancelOnStage {
    stage: ExportStage,
    armed: AtomicBool,
    handle: OnceLock<CancelHandle>,
    log: EventLog,
}

impl ProgressSink for CancelOnStage {
    fn on_progress(&self, event: &ProgressEvent) {
        self.log.on_progress(event);
        if event.stage == self.stage && self.armed.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.handle.get() {
                handle.cancel();
            }
        }
    }
}

#[tokio::test]
async fn cancellation_stops_at_next_checkpoint_and_restores_surface() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 3.0);
    let assembler = RecordingAssembler::default();
    let log = EventLog::default();
    let sink = Arc::new(CancelOnStage {
        stage: ExportStage::Paginating,
        armed: AtomicBool::new(true),
        handle: OnceLock::new(),
        log: log.clone(),
    });
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(assembler.clone()),
        sink.clone(),
    );
    sink.handle
        .set(pipeline.cancel_handle())
        .expect("handle set once");

    let mut surface = surface();
    let err = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect_err("run cancelled");

    assert!(matches!(err, ExportError::Cancelled));
    assert!(!err.is_user_visible());
    assert_eq!(surface.presentation(), &editor_presentation());
    assert!(assembler.pages().is_empty());
    assert_eq!(pipeline.state(), RunState::Idle);

    let events = log.events();
    assert_monotonic(&events);
    let last = events.last().expect("terminal event");
    assert_eq!(last.stage, ExportStage::Cancelled);
    assert_eq!(last.percent, 40);
    assert!(
        events
            .iter()
            .all(|event| event.stage != ExportStage::Assembling)
    );

    log.clear();
    let artifact = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect("fresh run is not affected by the earlier cancellation");
    assert_eq!(artifact.pages, Some(3));
    assert_eq!(
        log.events().last().map(|event| event.stage),
        Some(ExportStage::Complete)
    );
}

#[tokio::test]
async fn cancellation_between_slices_discards_partial_document() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 4.0);
    let assembler = RecordingAssembler::default();
    let log = EventLog::default();
    let sink = Arc::new(CancelOnStage {
        stage: ExportStage::Assembling,
        armed: AtomicBool::new(true),
        handle: OnceLock::new(),
        log: log.clone(),
    });
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(assembler.clone()),
        sink.clone(),
    );
    sink.handle
        .set(pipeline.cancel_handle())
        .expect("handle set once");

    let err = pipeline
        .start_export(&mut surface(), &options)
        .await
        .expect_err("run cancelled");

    assert!(matches!(err, ExportError::Cancelled));
    assert!(assembler.metadata().is_none(), "document must not be finished");
    assert_eq!(
        log.events().last().map(|event| (event.stage, event.percent)),
        Some((ExportStage::Cancelled, 50))
    );
}

#[tokio::test]
async fn cancel_from_another_task_lands_on_first_checkpoint() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 1.0);
    let rasterizer = Arc::new(FakeRasterizer::with_height(height));
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(RecordingAssembler::default()),
        Arc::new(log.clone()),
    )
    .with_settings(PipelineSettings {
        yield_interval: Duration::from_millis(50),
    });

    let handle = pipeline.cancel_handle();
    let mut surface = surface();
    let (result, delivered) = tokio::join!(pipeline.start_export(&mut surface, &options), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.cancel()
    });

    assert!(delivered, "a run was active when cancel was requested");
    assert!(matches!(result, Err(ExportError::Cancelled)));
    assert!(rasterizer.calls().is_empty());
    let events = log.events();
    assert_eq!(
        events
            .iter()
            .map(|event| (event.stage, event.percent))
            .collect::<Vec<_>>(),
        vec![(ExportStage::Preparing, 0), (ExportStage::Cancelled, 0)]
    );
}

#[tokio::test]
async fn cancel_without_active_run_is_a_no_op() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 1.0);
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(RecordingAssembler::default()),
        Arc::new(NoopProgress),
    );

    pipeline.cancel();
    assert!(!pipeline.cancel_handle().cancel());

    pipeline
        .start_export(&mut surface(), &options)
        .await
        .expect("earlier cancel does not leak into the next run");
}

#[tokio::test]
async fn rasterizer_failure_is_reported_and_surface_restored() {
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::failing("renderer crashed")),
        Arc::new(RecordingAssembler::default()),
        Arc::new(log.clone()),
    );

    let mut surface = surface();
    let err = pipeline
        .start_export(&mut surface, &options())
        .await
        .expect_err("rasterizer failure");

    match &err {
        ExportError::RenderFailure { stage, cause } => {
            assert_eq!(*stage, ExportStage::Rasterizing);
            assert!(cause.contains("renderer crashed"), "cause: {cause}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_user_visible());
    assert_eq!(surface.presentation(), &editor_presentation());
    assert_eq!(
        log.events().last().map(|event| (event.stage, event.percent)),
        Some((ExportStage::Failed, 10))
    );
    assert_eq!(pipeline.state(), RunState::Idle);
}

#[tokio::test]
async fn empty_bitmap_is_a_render_failure() {
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(0)),
        Arc::new(RecordingAssembler::default()),
        Arc::new(NoopProgress),
    );

    let err = pipeline
        .start_export(&mut surface(), &options())
        .await
        .expect_err("empty bitmap rejected");
    assert_eq!(err.kind(), ExportErrorKind::RenderFailure);
}

#[tokio::test]
async fn surface_is_print_safe_while_rasterizing() {
    let options = ExportOptions {
        orientation: Orientation::Landscape,
        ..options()
    };
    let (_, height) = bitmap_for_pages(&options, 1.0);
    let rasterizer = Arc::new(FakeRasterizer::with_height(height));
    let pipeline = ExportPipeline::new(
        rasterizer.clone(),
        Arc::new(RecordingAssembler::default()),
        Arc::new(NoopProgress),
    );

    let mut surface = surface();
    pipeline
        .start_export(&mut surface, &options)
        .await
        .expect("export succeeds");

    let calls = rasterizer.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    // 277 mm of landscape A4 content width at 96 DPI.
    assert_eq!(call.options.width_px, 1047);
    assert_eq!(call.options.scale, 0.5);
    assert_eq!(call.surface_width.as_deref(), Some("1047px"));
    assert_eq!(call.surface_background.as_deref(), Some("#ffffff"));
    assert_eq!(surface.presentation(), &editor_presentation());
}

#[tokio::test]
async fn page_draw_failure_stops_assembly_and_restores_surface() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 2.5);
    let assembler = RecordingAssembler::failing(BuildFailure::AddPage(2));
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(assembler.clone()),
        Arc::new(log.clone()),
    );

    let mut surface = surface();
    let err = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect_err("second page fails");

    match &err {
        ExportError::RenderFailure { stage, cause } => {
            assert_eq!(*stage, ExportStage::Assembling);
            assert!(cause.contains("could not draw page image"), "cause: {cause}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(surface.presentation(), &editor_presentation());
    assert_eq!(assembler.pages().len(), 1);
    assert!(assembler.metadata().is_none());
    assert_eq!(pipeline.state(), RunState::Idle);

    let events = log.events();
    assert_monotonic(&events);
    let (before, last) = (&events[events.len() - 2], &events[events.len() - 1]);
    assert_eq!((before.stage, before.percent), (ExportStage::Assembling, 63));
    assert_eq!((last.stage, last.percent), (ExportStage::Failed, 63));
}

#[tokio::test]
async fn serialisation_failure_is_reported_from_finalizing() {
    let options = options();
    let (_, height) = bitmap_for_pages(&options, 1.0);
    let log = EventLog::default();
    let pipeline = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(RecordingAssembler::failing(BuildFailure::Finish)),
        Arc::new(log.clone()),
    );

    let mut surface = surface();
    let err = pipeline
        .start_export(&mut surface, &options)
        .await
        .expect_err("finish fails");

    assert!(matches!(
        err,
        ExportError::RenderFailure {
            stage: ExportStage::Finalizing,
            ..
        }
    ));
    assert!(err.is_user_visible());
    assert_eq!(surface.presentation(), &editor_presentation());
    assert_eq!(
        log.events().last().map(|event| (event.stage, event.percent)),
        Some((ExportStage::Failed, 95))
    );

    let recovered = ExportPipeline::new(
        Arc::new(FakeRasterizer::with_height(height)),
        Arc::new(RecordingAssembler::default()),
        Arc::new(NoopProgress),
    );
    recovered
        .start_export(&mut surface, &options)
        .await
        .expect("the same surface exports once the assembler recovers");
}
