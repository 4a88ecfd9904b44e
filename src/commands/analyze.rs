use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clipforge::video::validator;
use clipforge::{FfmpegBackend, Settings, Splitter};

use super::run_with_events;
use crate::ui::{ProgressMode, ResolvedProgressMode};

/// Print length and part count for `input` without writing anything.
pub async fn analyze(
    settings: Settings,
    input: PathBuf,
    length: Option<f64>,
    progress: ProgressMode,
) -> Result<()> {
    let segment_seconds = length.unwrap_or(settings.segment_seconds);
    validator::validate_source(&input)?;
    validator::validate_segment_seconds(segment_seconds)?;

    let backend =
        FfmpegBackend::from_settings(&settings).context("cannot analyze without ffprobe")?;
    let splitter = Splitter::new(Arc::new(backend), settings);
    let mode = progress.resolve_for_stderr();

    let (summary, _warnings) =
        run_with_events(mode, move |ctx| splitter.analyze(&input, segment_seconds, &ctx)).await?;
    let summary = summary.context("analysis failed")?;

    match mode {
        ResolvedProgressMode::Json => {
            println!("{}", serde_json::json!({ "type": "result", "result": summary }));
        }
        _ => println!("{}", summary),
    }
    Ok(())
}
