use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of a single external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found. Please install FFmpeg and ensure it is in your PATH.")]
    NotFound { tool: &'static str },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed (exit {code}): {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    TimedOut { tool: String, after: Duration },

    #[error("{tool} reported success but {} was not written", .path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    #[error("{tool} process I/O failed: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled { .. })
    }
}

/// Error kinds surfaced by the split pipeline.
///
/// Only `InvalidInput`, `UnknownDuration`, `InvalidDuration`, `OutputDirError`,
/// `Cancelled` and `Io` abort a run. The remaining kinds are recoverable and are
/// absorbed by the pipeline, which reports them as events.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("video has unknown duration: {}", .0.display())]
    UnknownDuration(PathBuf),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("normalization to .{target} failed: {reason}")]
    NormalizationFailed { target: String, reason: String },

    #[error("fast segmentation failed: {0}")]
    FastSegmentationFailed(#[source] ToolError),

    #[error("part {part} failed: {reason}")]
    SegmentFailed { part: usize, reason: String },

    #[error("cannot create output folder {}: {source}", .path.display())]
    OutputDirError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SplitError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SplitError::Io {
            context: context.into(),
            source,
        }
    }
}
