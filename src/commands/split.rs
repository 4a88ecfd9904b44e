use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clipforge::video::validator;
use clipforge::{FfmpegBackend, Settings, SplitRequest, SplitResult, Splitter, Strategy};

use super::run_with_events;
use crate::ui::{ProgressMode, ResolvedProgressMode};

pub struct SplitArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub name: Option<String>,
    pub length: Option<f64>,
    pub progress: ProgressMode,
}

pub async fn split(settings: Settings, args: SplitArgs) -> Result<()> {
    let segment_seconds = args.length.unwrap_or(settings.segment_seconds);
    validator::validate_source(&args.input)?;
    validator::validate_segment_seconds(segment_seconds)?;

    let backend = FfmpegBackend::from_settings(&settings).context("cannot split without ffmpeg")?;
    let request = SplitRequest {
        source: args.input,
        output_root: args.output,
        base_name: args.name,
        segment_seconds,
    };
    let splitter = Splitter::new(Arc::new(backend), settings);
    let mode = args.progress.resolve_for_stderr();

    let (result, warnings) =
        run_with_events(mode, move |ctx| splitter.split(&request, &ctx)).await?;
    let result = result.context("split failed")?;

    match mode {
        ResolvedProgressMode::Json => {
            let line = serde_json::json!({ "type": "result", "result": &result });
            println!("{}", line);
        }
        _ => print_split_summary(&result, warnings.len()),
    }

    if result.outputs.is_empty() {
        bail!("no part was produced ({} failed)", result.failures.len());
    }
    Ok(())
}

fn print_split_summary(result: &SplitResult, warning_count: usize) {
    let strategy = match result.strategy {
        Strategy::Fast => "fast copy",
        Strategy::Fallback => "per-segment fallback",
    };
    println!(
        "Saved {} of {} part(s) to {} ({}, warnings={})",
        result.outputs.len(),
        result.plan.count(),
        result.output_dir.display(),
        strategy,
        warning_count,
    );
    for path in &result.outputs {
        println!("  {}", path.display());
    }
    for failure in &result.failures {
        println!("  part {:03} FAILED: {}", failure.part, failure.reason);
    }
}
