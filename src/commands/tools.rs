use anyhow::{Context, Result};
use clipforge::video::ffmpeg;
use clipforge::{FfmpegBackend, Settings};

/// Report which ffmpeg and ffprobe a run would use.
pub async fn check_tools(settings: Settings) -> Result<()> {
    let backend = FfmpegBackend::from_settings(&settings).context("media tools not available")?;

    let report = tokio::task::spawn_blocking(move || {
        [backend.ffmpeg_path(), backend.ffprobe_path()]
            .into_iter()
            .map(|path| {
                let version = ffmpeg::tool_version(path)
                    .unwrap_or_else(|e| format!("unusable: {}", e));
                format!("{}\n  {}", path.display(), version)
            })
            .collect::<Vec<_>>()
    })
    .await
    .context("worker task failed")?;

    for line in report {
        println!("{}", line);
    }
    Ok(())
}
