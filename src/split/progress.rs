//! Progress samples and the events a split run publishes.
//!
//! Workers never touch presentation state. They push immutable
//! [`SplitEvent`]s into an [`EventSink`]; a single consumer applies them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;

use super::plan::AnalysisSummary;

/// Guards the ETA division when no progress has been made yet.
pub const ETA_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    pub elapsed_seconds: f64,
    pub eta_seconds: f64,
    pub percent_complete: f64,
}

impl ProgressSample {
    /// Sample for a percentage-driven phase (a tool reporting output time).
    pub fn from_percent(elapsed_seconds: f64, percent: f64) -> Self {
        let percent = clamp_percent(percent);
        Self {
            elapsed_seconds: elapsed_seconds.max(0.0),
            eta_seconds: eta_seconds(elapsed_seconds, percent),
            percent_complete: percent,
        }
    }

    /// Sample for the per-segment fallback: the ETA is the average time per
    /// finished segment times the segments still to go.
    pub fn from_segments(elapsed_seconds: f64, completed: usize, total: usize) -> Self {
        let elapsed_seconds = elapsed_seconds.max(0.0);
        if total == 0 {
            return Self::finished(elapsed_seconds);
        }
        let completed = completed.min(total);
        let eta_seconds = if completed == 0 {
            0.0
        } else {
            let average = elapsed_seconds / completed as f64;
            (average * (total - completed) as f64).max(0.0)
        };
        Self {
            elapsed_seconds,
            eta_seconds,
            percent_complete: completed as f64 / total as f64 * 100.0,
        }
    }

    pub fn finished(elapsed_seconds: f64) -> Self {
        Self {
            elapsed_seconds: elapsed_seconds.max(0.0),
            eta_seconds: 0.0,
            percent_complete: 100.0,
        }
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// `elapsed * (100 - percent) / max(percent, ε)`; always finite and >= 0.
pub fn eta_seconds(elapsed_seconds: f64, percent: f64) -> f64 {
    let percent = clamp_percent(percent);
    let eta = elapsed_seconds.max(0.0) * (100.0 - percent) / percent.max(ETA_EPSILON);
    if eta.is_finite() {
        eta
    } else {
        0.0
    }
}

/// Percentage of `total_seconds` covered by `out_us` microseconds of output.
pub fn percent_of(out_us: u64, total_seconds: f64) -> f64 {
    if !(total_seconds.is_finite() && total_seconds > 0.0) {
        return 0.0;
    }
    (out_us as f64 / (total_seconds * 1_000_000.0) * 100.0).min(100.0)
}

/// Tracks one phase of a run: its start time and the best percentage seen,
/// so published percentages never go backwards.
#[derive(Debug)]
pub struct PhaseProgress {
    started: Instant,
    best_percent: f64,
}

impl PhaseProgress {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            best_percent: 0.0,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn percent(&mut self, percent: f64) -> ProgressSample {
        let elapsed = self.elapsed_seconds();
        self.percent_at(elapsed, percent)
    }

    fn percent_at(&mut self, elapsed_seconds: f64, percent: f64) -> ProgressSample {
        self.best_percent = self.best_percent.max(clamp_percent(percent));
        ProgressSample::from_percent(elapsed_seconds, self.best_percent)
    }

    pub fn segments(&mut self, completed: usize, total: usize) -> ProgressSample {
        let sample = ProgressSample::from_segments(self.elapsed_seconds(), completed, total);
        self.best_percent = self.best_percent.max(sample.percent_complete);
        sample
    }
}

/// States of one split run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    CopyingToTemp,
    Normalizing,
    Probing,
    SegmentingFast,
    SegmentingFallback,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::CopyingToTemp => "copying to temp",
            RunState::Normalizing => "normalizing",
            RunState::Probing => "probing",
            RunState::SegmentingFast => "segmenting (fast)",
            RunState::SegmentingFallback => "segmenting (fallback)",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SplitEvent {
    State { state: RunState },
    Status { message: String },
    Analysis(AnalysisSummary),
    Progress(ProgressSample),
    SegmentFailed { part: usize, reason: String },
    Warning { message: String },
}

/// Where a worker publishes its events. Emitting never blocks.
#[derive(Clone)]
pub struct EventSink {
    emit: Arc<dyn Fn(SplitEvent) + Send + Sync>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

impl EventSink {
    pub fn new(emit: impl Fn(SplitEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Sink that drops every event.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Sink backed by an unbounded channel with a single consumer. Events
    /// sent after the receiver is gone are dropped.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SplitEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    pub fn emit(&self, event: SplitEvent) {
        (self.emit)(event);
    }

    pub fn state(&self, state: RunState) {
        self.emit(SplitEvent::State { state });
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(SplitEvent::Status {
            message: message.into(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(SplitEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, sample: ProgressSample) {
        self.emit(SplitEvent::Progress(sample));
    }
}
