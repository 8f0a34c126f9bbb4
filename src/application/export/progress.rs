//! Progress reporting for export runs.

use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio::sync::mpsc;

/// Linear export stages. `Complete`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Rasterizing,
    Paginating,
    Assembling,
    Finalizing,
    Complete,
    Cancelled,
    Failed,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Preparing => "preparing",
            ExportStage::Rasterizing => "rasterizing",
            ExportStage::Paginating => "paginating",
            ExportStage::Assembling => "assembling",
            ExportStage::Finalizing => "finalizing",
            ExportStage::Complete => "complete",
            ExportStage::Cancelled => "cancelled",
            ExportStage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStage::Complete | ExportStage::Cancelled | ExportStage::Failed
        )
    }

    /// Percent reported when the stage is entered.
    pub(crate) fn baseline(self) -> u8 {
        match self {
            ExportStage::Preparing => 0,
            ExportStage::Rasterizing => 10,
            ExportStage::Paginating => 40,
            ExportStage::Assembling => ASSEMBLING_BASELINE,
            ExportStage::Finalizing => 95,
            ExportStage::Complete => 100,
            ExportStage::Cancelled | ExportStage::Failed => 0,
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) const ASSEMBLING_BASELINE: u8 = 50;
pub(crate) const ASSEMBLING_RANGE: u8 = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: ExportStage,
    /// 0–100, non-decreasing within a run.
    pub percent: u8,
    pub message: String,
}

/// Single consumer of progress events, registered when the pipeline is built.
/// Invoked synchronously; implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.send(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Per-run emitter enforcing monotonic percentages and silence after the terminal event.
pub(crate) struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    percent: u8,
    closed: bool,
}

impl ProgressTracker {
    pub(crate) fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            percent: 0,
            closed: false,
        }
    }

    pub(crate) fn percent(&self) -> u8 {
        self.percent
    }

    pub(crate) fn enter(&mut self, stage: ExportStage, message: impl Into<String>) {
        let percent = match stage {
            ExportStage::Cancelled | ExportStage::Failed => self.percent,
            other => other.baseline(),
        };
        self.emit(stage, percent, message.into());
    }

    /// Report `done` of `total` assembled pages.
    pub(crate) fn page_done(&mut self, done: u32, total: u32) {
        let total = total.max(1);
        let fraction = f64::from(done.min(total)) / f64::from(total);
        let percent = ASSEMBLING_BASELINE + (f64::from(ASSEMBLING_RANGE) * fraction).floor() as u8;
        self.emit(
            ExportStage::Assembling,
            percent,
            format!("Rendered page {done} of {total}"),
        );
    }

    fn emit(&mut self, stage: ExportStage, percent: u8, message: String) {
        if self.closed {
            return;
        }
        self.percent = self.percent.max(percent.min(100));
        if stage.is_terminal() {
            self.closed = true;
        }
        let event = ProgressEvent {
            stage,
            percent: self.percent,
            message,
        };
        self.sink.on_progress(&event);
    }
}
