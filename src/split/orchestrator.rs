//! The split operation: validate, copy to temp, normalize, probe, plan,
//! segment, finalize. Temp artifacts are removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::executor::{FallbackMode, PartLayout, SegmentExecutor, SegmentFailure};
use super::naming::{base_name_for, extension_of, output_dir};
use super::plan::{AnalysisSummary, SegmentPlan};
use super::progress::{ProgressSample, RunState, SplitEvent};
use super::temp::{remove_quietly, unique_temp_path, TempArtifacts};
use super::RunContext;
use crate::error::SplitError;
use crate::settings::Settings;
use crate::video::normalize::{FormatNormalizer, NormalizeOutcome};
use crate::video::probe::resolve_duration;
use crate::video::validator::{validate_segment_seconds, validate_source};
use crate::video::MediaBackend;

#[derive(Debug, Clone, PartialEq)]
pub struct SplitRequest {
    pub source: PathBuf,
    /// Overrides the configured output root.
    pub output_root: Option<PathBuf>,
    /// Base name for the parts; the source stem when absent.
    pub base_name: Option<String>,
    pub segment_seconds: f64,
}

impl SplitRequest {
    pub fn new(source: impl Into<PathBuf>, segment_seconds: f64) -> Self {
        Self {
            source: source.into(),
            output_root: None,
            base_name: None,
            segment_seconds,
        }
    }
}

/// Which path produced the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    Fast,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResult {
    /// Produced part files, in part order.
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<SegmentFailure>,
    pub strategy: Strategy,
    pub normalization: NormalizeOutcome,
    pub plan: SegmentPlan,
    pub output_dir: PathBuf,
}

pub struct Splitter {
    backend: Arc<dyn MediaBackend>,
    settings: Settings,
}

impl Splitter {
    pub fn new(backend: Arc<dyn MediaBackend>, settings: Settings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Split `request.source` into parts. The source itself is only read.
    pub fn split(&self, request: &SplitRequest, ctx: &RunContext) -> Result<SplitResult, SplitError> {
        ctx.events.state(RunState::Idle);
        let mut temps = TempArtifacts::new();
        let result = self.run(request, ctx, &mut temps);

        let removed = temps.cleanup();
        tracing::debug!(removed, "split cleanup finished");

        match &result {
            Ok(done) => {
                tracing::info!(
                    parts = done.outputs.len(),
                    failed = done.failures.len(),
                    strategy = ?done.strategy,
                    "split finished"
                );
                ctx.events.state(RunState::Done);
            }
            Err(e) => {
                tracing::error!("split failed: {}", e);
                ctx.events.state(RunState::Failed);
            }
        }
        result
    }

    fn run(
        &self,
        request: &SplitRequest,
        ctx: &RunContext,
        temps: &mut TempArtifacts,
    ) -> Result<SplitResult, SplitError> {
        let started = Instant::now();
        validate_source(&request.source)?;
        validate_segment_seconds(request.segment_seconds)?;

        let target_ext = self.settings.target_ext();
        let base = base_name_for(
            &request.source,
            request.base_name.as_deref(),
            self.settings.max_base_name_len,
        );
        let root = request
            .output_root
            .clone()
            .unwrap_or_else(|| self.settings.output_root.clone());
        let out_dir = output_dir(&root, &base);
        std::fs::create_dir_all(&out_dir).map_err(|source| SplitError::OutputDirError {
            path: out_dir.clone(),
            source,
        })?;

        ctx.enter(RunState::CopyingToTemp)?;
        ctx.events.status("Preparing a working copy...");
        let source_ext = extension_of(&request.source);
        let temp_copy = unique_temp_path(&self.settings.temp_dir, "cf", source_ext.as_deref());
        temps.track(&temp_copy);
        std::fs::copy(&request.source, &temp_copy).map_err(|e| {
            SplitError::io(
                format!("copying {} to {}", request.source.display(), temp_copy.display()),
                e,
            )
        })?;

        ctx.enter(RunState::Normalizing)?;
        let normalized = FormatNormalizer::new(self.backend.as_ref(), &self.settings.temp_dir)
            .ensure_container(&temp_copy, &target_ext, temps, ctx)?;
        if normalized.path != temp_copy {
            temps.remove(&temp_copy);
        }

        ctx.enter(RunState::Probing)?;
        ctx.events.status("Analyzing video length...");
        let total = resolve_duration(self.backend.as_ref(), &normalized.path, &ctx.cancel);
        ctx.cancel.check()?;
        let total = total.ok_or_else(|| SplitError::UnknownDuration(request.source.clone()))?;
        let plan = SegmentPlan::new(total, request.segment_seconds)?;
        let summary = plan.summary();
        tracing::info!(total, parts = plan.count(), "planned split");
        ctx.events.emit(SplitEvent::Analysis(summary));

        let layout = PartLayout::new(&out_dir, &base, &target_ext);
        let executor = SegmentExecutor::new(self.backend.as_ref(), &self.settings);

        let (outputs, failures, strategy) = if normalized.outcome == NormalizeOutcome::Skipped {
            ctx.enter(RunState::SegmentingFallback)?;
            let report =
                executor.run_fallback(&normalized.path, &plan, &layout, FallbackMode::EncodeOnly, ctx)?;
            (report.outputs, report.failures, Strategy::Fallback)
        } else {
            ctx.enter(RunState::SegmentingFast)?;
            match executor.run_fast(&normalized.path, &plan, &layout, ctx) {
                Ok(parts) => (parts, Vec::new(), Strategy::Fast),
                Err(SplitError::FastSegmentationFailed(e)) => {
                    ctx.events.warning(format!(
                        "Fast split failed ({}). Falling back to per-segment processing.",
                        e
                    ));
                    ctx.enter(RunState::SegmentingFallback)?;
                    let report = executor.run_fallback(
                        &normalized.path,
                        &plan,
                        &layout,
                        FallbackMode::CopyThenEncode,
                        ctx,
                    )?;
                    (report.outputs, report.failures, Strategy::Fallback)
                }
                Err(e) => return Err(e),
            }
        };

        if let Err(e) = ctx.enter(RunState::Finalizing) {
            for part in &outputs {
                remove_quietly(part);
            }
            return Err(e);
        }
        ctx.events
            .progress(ProgressSample::finished(started.elapsed().as_secs_f64()));
        if failures.is_empty() {
            ctx.events.status("All parts saved.");
        } else {
            ctx.events.status(format!(
                "Saved {} of {} part(s); {} failed.",
                outputs.len(),
                plan.count(),
                failures.len()
            ));
        }

        Ok(SplitResult {
            outputs,
            failures,
            strategy,
            normalization: normalized.outcome,
            plan,
            output_dir: out_dir,
        })
    }

    /// Report length and part count without producing any file.
    pub fn analyze(
        &self,
        source: &Path,
        segment_seconds: f64,
        ctx: &RunContext,
    ) -> Result<AnalysisSummary, SplitError> {
        validate_source(source)?;
        validate_segment_seconds(segment_seconds)?;
        ctx.cancel.check()?;

        ctx.events.status("Analyzing video length...");
        let total = resolve_duration(self.backend.as_ref(), source, &ctx.cancel);
        ctx.cancel.check()?;
        let total = total.ok_or_else(|| SplitError::UnknownDuration(source.to_path_buf()))?;

        let summary = SegmentPlan::new(total, segment_seconds)?.summary();
        ctx.events.emit(SplitEvent::Analysis(summary));
        ctx.events.status("Analysis complete.");
        Ok(summary)
    }
}
