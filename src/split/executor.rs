//! Producing the part files: one-pass stream segmentation, and the slower
//! per-segment loop used when that fails.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::naming::{collect_parts, part_path, segment_pattern};
use super::plan::{PlannedSegment, SegmentPlan};
use super::progress::{percent_of, PhaseProgress, SplitEvent};
use super::temp::remove_quietly;
use super::RunContext;
use crate::error::{SplitError, ToolError};
use crate::settings::Settings;
use crate::video::probe::probe_duration;
use crate::video::MediaBackend;

/// Where the parts of one run go: `<dir>/<base>_part_NNN.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartLayout {
    pub dir: PathBuf,
    pub base: String,
    pub ext: String,
}

impl PartLayout {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
            ext: ext.into(),
        }
    }

    pub fn part(&self, number: usize) -> PathBuf {
        part_path(&self.dir, &self.base, number, &self.ext)
    }

    pub fn pattern(&self) -> PathBuf {
        segment_pattern(&self.dir, &self.base, &self.ext)
    }

}

/// How the fallback produces each part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Stream-copy the range, re-encoding only when the copy fails.
    CopyThenEncode,
    /// Re-encode every range. Used when the source could not be normalized.
    EncodeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentFailure {
    pub part: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FallbackReport {
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<SegmentFailure>,
}

pub struct SegmentExecutor<'a> {
    backend: &'a dyn MediaBackend,
    settings: &'a Settings,
}

impl<'a> SegmentExecutor<'a> {
    pub fn new(backend: &'a dyn MediaBackend, settings: &'a Settings) -> Self {
        Self { backend, settings }
    }

    /// One segmenting invocation over the whole input.
    ///
    /// The muxer writes into a staging folder inside the output folder, and
    /// only parts from that folder are moved into place. Files already in the
    /// output folder are never listed or removed. On failure the staging
    /// folder is dropped with whatever the attempt wrote.
    pub fn run_fast(
        &self,
        input: &Path,
        plan: &SegmentPlan,
        layout: &PartLayout,
        ctx: &RunContext,
    ) -> Result<Vec<PathBuf>, SplitError> {
        ctx.cancel.check()?;
        ctx.events.status("Splitting video (fast copy)...");

        let staging = tempfile::Builder::new()
            .prefix(".cf_seg")
            .tempdir_in(&layout.dir)
            .map_err(|e| SplitError::io(format!("creating staging folder in {}", layout.dir.display()), e))?;
        let staged = PartLayout::new(staging.path(), layout.base.as_str(), layout.ext.as_str());

        let total = plan.total_seconds();
        let mut phase = PhaseProgress::start();
        let events = &ctx.events;
        let mut on_tick = |us: u64| events.progress(phase.percent(percent_of(us, total)));

        let result = self.backend.segment(
            input,
            &staged.pattern(),
            plan.segment_seconds(),
            &ctx.cancel,
            &mut on_tick,
        );

        if let Err(e) = result {
            if e.is_cancelled() {
                return Err(SplitError::Cancelled);
            }
            tracing::warn!("fast segmentation failed: {}", e);
            return Err(SplitError::FastSegmentationFailed(e));
        }

        let produced = collect_parts(staging.path(), &layout.base, &layout.ext);
        if produced.is_empty() {
            return Err(SplitError::FastSegmentationFailed(ToolError::MissingOutput {
                tool: "ffmpeg".to_string(),
                path: staged.pattern(),
            }));
        }

        let mut parts = Vec::with_capacity(produced.len());
        for (i, from) in produced.iter().enumerate() {
            let dest = layout.part(i + 1);
            if let Err(e) = std::fs::rename(from, &dest) {
                remove_all(&parts);
                return Err(SplitError::io(format!("moving part into {}", dest.display()), e));
            }
            parts.push(dest);
        }

        if parts.len() != plan.count() {
            tracing::warn!(expected = plan.count(), produced = parts.len(), "part count differs from plan");
            ctx.events.warning(format!(
                "Expected {} part(s) but the splitter produced {}. Copy splits start at keyframes.",
                plan.count(),
                parts.len()
            ));
        }

        tracing::info!(parts = parts.len(), "fast segmentation finished");
        Ok(parts)
    }

    /// Produce the planned parts one at a time.
    ///
    /// A failing part is reported and skipped. Only cancellation aborts, and
    /// it removes the parts this run already saved.
    pub fn run_fallback(
        &self,
        input: &Path,
        plan: &SegmentPlan,
        layout: &PartLayout,
        mode: FallbackMode,
        ctx: &RunContext,
    ) -> Result<FallbackReport, SplitError> {
        ctx.events.status(match mode {
            FallbackMode::CopyThenEncode => "Using fallback method (per segment)...",
            FallbackMode::EncodeOnly => "Re-encoding each part...",
        });

        let mut run = FallbackRun {
            input,
            mode,
            ctx,
            short_dir: None,
            source_seconds: None,
        };
        let mut report = FallbackReport::default();
        let mut phase = PhaseProgress::start();
        let total = plan.count();
        ctx.events.progress(phase.segments(0, total));

        for (completed, segment) in plan.segments().enumerate() {
            if ctx.cancel.is_cancelled() {
                remove_all(&report.outputs);
                return Err(SplitError::Cancelled);
            }
            ctx.events.status(format!("Saving part {}/{}...", segment.number, total));

            let dest = layout.part(segment.number);
            match self.produce(&mut run, &segment, &dest) {
                Ok(()) => report.outputs.push(dest),
                Err(SplitError::SegmentFailed { part, reason }) => {
                    remove_quietly(&dest);
                    tracing::warn!(part, "skipping part: {}", reason);
                    ctx.events.emit(SplitEvent::SegmentFailed {
                        part,
                        reason: reason.clone(),
                    });
                    report.failures.push(SegmentFailure { part, reason });
                }
                Err(e) => {
                    remove_quietly(&dest);
                    remove_all(&report.outputs);
                    return Err(e);
                }
            }

            ctx.events.progress(phase.segments(completed + 1, total));
        }

        tracing::info!(
            saved = report.outputs.len(),
            failed = report.failures.len(),
            "fallback segmentation finished"
        );
        Ok(report)
    }

    fn produce(
        &self,
        run: &mut FallbackRun<'_>,
        segment: &PlannedSegment,
        dest: &Path,
    ) -> Result<(), SplitError> {
        let part = segment.number;
        let fail = |reason: String| SplitError::SegmentFailed { part, reason };

        let long = dest.to_string_lossy().chars().count() > self.settings.long_path_threshold;
        let write_to = if long {
            let ext = dest
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            run.short_dir(&self.settings.temp_dir)
                .map_err(|e| fail(format!("cannot create short temp folder: {}", e)))?
                .join(format!("p{:03}.{}", part, ext))
        } else {
            dest.to_path_buf()
        };

        let written = self.write_range(run, segment, &write_to);
        if written.is_err() {
            remove_quietly(&write_to);
        }
        written?;

        if long {
            let copied = std::fs::copy(&write_to, dest);
            remove_quietly(&write_to);
            copied.map_err(|e| fail(format!("cannot copy to {}: {}", dest.display(), e)))?;
        }
        Ok(())
    }

    fn write_range(
        &self,
        run: &mut FallbackRun<'_>,
        segment: &PlannedSegment,
        output: &Path,
    ) -> Result<(), SplitError> {
        let part = segment.number;
        let ctx = run.ctx;
        let cancel = &ctx.cancel;

        let copy_err = match run.mode {
            FallbackMode::CopyThenEncode => {
                match self.backend.extract_copy(
                    run.input,
                    output,
                    segment.start,
                    segment.length(),
                    self.settings.copy_timeout(),
                    cancel,
                ) {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_cancelled() => return Err(SplitError::Cancelled),
                    Err(e) => {
                        tracing::debug!(part, "copy extraction failed, re-encoding: {}", e);
                        remove_quietly(output);
                        Some(e)
                    }
                }
            }
            FallbackMode::EncodeOnly => None,
        };

        cancel.check()?;
        let end = match run.source_seconds(self.backend) {
            Some(limit) => segment.end.min(limit),
            None => segment.end,
        };
        if end <= segment.start {
            return Err(SplitError::SegmentFailed {
                part,
                reason: format!("starts at {:.3}s, past the end of the source", segment.start),
            });
        }

        match self
            .backend
            .encode_range(run.input, output, segment.start, end - segment.start, cancel)
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(SplitError::Cancelled),
            Err(e) => Err(SplitError::SegmentFailed {
                part,
                reason: match copy_err {
                    Some(copy) => format!("copy: {}; encode: {}", copy, e),
                    None => e.to_string(),
                },
            }),
        }
    }
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        remove_quietly(path);
    }
}

/// State shared by every segment of one fallback run.
struct FallbackRun<'r> {
    input: &'r Path,
    mode: FallbackMode,
    ctx: &'r RunContext,
    /// Created on first use, removed when the run ends.
    short_dir: Option<tempfile::TempDir>,
    /// Source duration, opened once for all segments.
    source_seconds: Option<Option<f64>>,
}

impl FallbackRun<'_> {
    fn short_dir(&mut self, temp_root: &Path) -> std::io::Result<&Path> {
        if self.short_dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("cf_seg_")
                .tempdir_in(temp_root)?;
            tracing::debug!(dir = %dir.path().display(), "using short temp folder for long paths");
            self.short_dir = Some(dir);
        }
        match &self.short_dir {
            Some(dir) => Ok(dir.path()),
            None => Err(std::io::Error::other("short temp folder unavailable")),
        }
    }

    fn source_seconds(&mut self, backend: &dyn MediaBackend) -> Option<f64> {
        let input = self.input;
        *self
            .source_seconds
            .get_or_insert_with(|| probe_duration(backend, input))
    }
}
